use serde::Serialize;

use crate::error::{BSPError, Result};

/// Widest page the 16 bit skyline can describe.
pub const MAX_PAGE_WIDTH: u32 = u16::MAX as u32;

/// One atlas page packed with a skyline running along the rows.
///
/// `skyline[y]` is how far row `y` is filled from the left. A rectangle is
/// placed at the rows whose tallest fill is the smallest, so short rows get
/// reused before the page grows to the right.
#[derive(Clone, Debug)]
pub struct SkylinePage {
    max_width: u32,
    max_height: u32,
    skyline: Vec<u16>,
    width: u32,
    height: u32,
}

impl SkylinePage {
    pub fn new(max_width: u32, max_height: u32) -> Result<Self> {
        if max_width > MAX_PAGE_WIDTH {
            return Err(BSPError::Config(format!(
                "lightmap page width {} exceeds {}",
                max_width, MAX_PAGE_WIDTH
            )));
        }
        if max_width == 0 || max_height == 0 {
            return Err(BSPError::Config(format!(
                "lightmap page size {}x{} is empty",
                max_width, max_height
            )));
        }
        Ok(Self {
            max_width,
            max_height,
            skyline: vec![0; max_height as usize],
            width: 0,
            height: 0,
        })
    }

    /// Find room for a `w` x `h` rectangle, returning its top left corner.
    pub fn allocate(&mut self, w: u32, h: u32) -> Option<(u32, u32)> {
        if w == 0 || h == 0 || w > self.max_width || h > self.max_height {
            return None;
        }
        let h = h as usize;

        let mut best: Option<(u16, usize)> = None;
        for y in 0..=(self.skyline.len() - h) {
            let tallest = self.skyline[y..y + h].iter().copied().max().unwrap_or(0);
            if tallest as u32 + w > self.max_width {
                continue;
            }
            if best.map_or(true, |(b, _)| tallest < b) {
                best = Some((tallest, y));
                if tallest == 0 {
                    break;
                }
            }
        }

        let (x, y) = best?;
        let right = x as u32 + w;
        // right <= max_width <= u16::MAX
        self.skyline[y..y + h].fill(right as u16);

        self.width = self.width.max(right);
        self.height = self.height.max((y + h) as u32);
        Some((x as u32, y as u32))
    }

    /// Bounds actually covered by allocations so far.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }
}

/// Where an allocation landed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub page: usize,
    pub x: u32,
    pub y: u32,
}

/// Size of a finished page.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub width: u32,
    pub height: u32,
}

/// A growing list of skyline pages of one fixed size.
#[derive(Clone, Debug)]
pub struct LightmapPacker {
    page_width: u32,
    page_height: u32,
    pages: Vec<SkylinePage>,
}

impl LightmapPacker {
    pub fn new(page_width: u32, page_height: u32) -> Result<Self> {
        // validate the size once up front
        SkylinePage::new(page_width, page_height)?;
        Ok(Self {
            page_width,
            page_height,
            pages: Vec::new(),
        })
    }

    /// Try every open page in order, then a fresh one.
    pub fn allocate(&mut self, w: u32, h: u32) -> Result<Placement> {
        for (page, skyline) in self.pages.iter_mut().enumerate() {
            if let Some((x, y)) = skyline.allocate(w, h) {
                return Ok(Placement { page, x, y });
            }
        }

        let mut fresh = SkylinePage::new(self.page_width, self.page_height)?;
        let (x, y) = fresh.allocate(w, h).ok_or(BSPError::PackingFailure {
            width: w,
            height: h,
            page_width: self.page_width,
            page_height: self.page_height,
        })?;
        self.pages.push(fresh);
        log::debug!("Opened lightmap page {}", self.pages.len() - 1);
        Ok(Placement {
            page: self.pages.len() - 1,
            x,
            y,
        })
    }

    pub fn pages(&self) -> &[SkylinePage] {
        &self.pages
    }

    pub fn page_infos(&self) -> Vec<PageInfo> {
        self.pages
            .iter()
            .map(|p| PageInfo {
                width: p.width(),
                height: p.height(),
            })
            .collect()
    }
}
