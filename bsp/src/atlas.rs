use serde::Serialize;

use crate::{meshes::Surface, packer::PageInfo};

/// Read-only view of the packed lightmap pages of one map.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct LightmapAtlas<'a> {
    pages: &'a [PageInfo],
    #[serde(skip)]
    surfaces: &'a [Surface],
}

impl<'a> LightmapAtlas<'a> {
    pub fn new(pages: &'a [PageInfo], surfaces: &'a [Surface]) -> Self {
        Self { pages, surfaces }
    }

    pub fn pages(&self) -> &'a [PageInfo] {
        self.pages
    }

    /// Style 0 of every allocation on `page`, as tightly packed RGBA8.
    ///
    /// Allocations whose samples are short are left black.
    pub fn compose_page(&self, page: usize) -> Option<Vec<u8>> {
        let info = self.pages.get(page)?;
        let (pw, ph) = (info.width as usize, info.height as usize);
        let mut rgba = vec![0u8; pw * ph * 4];

        let allocations = self
            .surfaces
            .iter()
            .flat_map(|s| &s.lightmap_allocations)
            .filter(|a| a.page == page);

        for alloc in allocations {
            let (w, h) = (alloc.width as usize, alloc.height as usize);
            let Some(style0) = alloc.samples.get(..w * h * 3) else {
                log::warn!(
                    "Face {} has {} lightmap bytes, expected {}",
                    alloc.face_index,
                    alloc.samples.len(),
                    w * h * 3
                );
                continue;
            };
            for (row, texels) in style0.chunks_exact(w * 3).enumerate() {
                let y = alloc.y as usize + row;
                for (col, rgb) in texels.chunks_exact(3).enumerate() {
                    let x = alloc.x as usize + col;
                    if x >= pw || y >= ph {
                        continue;
                    }
                    let at = (y * pw + x) * 4;
                    rgba[at..at + 3].copy_from_slice(rgb);
                    rgba[at + 3] = 255;
                }
            }
        }
        Some(rgba)
    }
}

#[cfg(test)]
mod atlas_tests {
    use super::*;
    use crate::meshes::{meshes_tests::face, SurfaceBuilder};

    #[test]
    fn allocations_land_at_their_position() {
        let mut builder = SurfaceBuilder::new(64, 64).unwrap();
        let mut first = face(0, "a");
        if let Some(lm) = first.lightmap.as_mut() {
            lm.samples = vec![10; 12];
        }
        let mut second = face(1, "b");
        if let Some(lm) = second.lightmap.as_mut() {
            lm.samples = vec![200; 12];
        }
        builder.push_face(first).unwrap();
        builder.push_face(second).unwrap();
        let built = builder.finish();

        let atlas = LightmapAtlas::new(&built.pages, &built.surfaces);
        let page = atlas.compose_page(0).unwrap();
        // 2x4 page, first face in rows 0..2, second in rows 2..4
        assert_eq!(page.len(), 2 * 4 * 4);
        assert_eq!(&page[0..4], &[10, 10, 10, 255]);
        assert_eq!(&page[(2 * 2) * 4..(2 * 2) * 4 + 4], &[200, 200, 200, 255]);
        assert!(atlas.compose_page(1).is_none());
    }

    #[test]
    fn short_samples_stay_black() {
        let mut builder = SurfaceBuilder::new(64, 64).unwrap();
        let mut f = face(0, "a");
        if let Some(lm) = f.lightmap.as_mut() {
            lm.samples.truncate(5);
        }
        builder.push_face(f).unwrap();
        let built = builder.finish();
        let page = LightmapAtlas::new(&built.pages, &built.surfaces)
            .compose_page(0)
            .unwrap();
        assert!(page.iter().all(|&b| b == 0));
    }
}
