use glam::Vec3;
use serde::Serialize;

/// Axis aligned box, grown one point at a time.
///
/// An empty box has `mins > maxs` so that the first `add_point` snaps both
/// corners onto the point.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    pub const EMPTY: Self = Self {
        mins: Vec3::splat(f32::INFINITY),
        maxs: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(mins: Vec3, maxs: Vec3) -> Self {
        Self { mins, maxs }
    }

    pub fn is_empty(&self) -> bool {
        self.mins.x > self.maxs.x || self.mins.y > self.maxs.y || self.mins.z > self.maxs.z
    }

    pub fn add_point(&mut self, point: Vec3) {
        self.mins = self.mins.min(point);
        self.maxs = self.maxs.max(point);
    }

    pub fn union(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        self.add_point(other.mins);
        self.add_point(other.maxs);
    }

    pub fn center(&self) -> Vec3 {
        (self.mins + self.maxs) * 0.5
    }

    /// The eight corners, bit `i` of the index choosing maxs over mins on axis `i`.
    pub fn corners(&self) -> [Vec3; 8] {
        let mut corners = [Vec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            *corner = Vec3::new(
                if i & 1 == 0 { self.mins.x } else { self.maxs.x },
                if i & 2 == 0 { self.mins.y } else { self.maxs.y },
                if i & 4 == 0 { self.mins.z } else { self.maxs.z },
            );
        }
        corners
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.mins).all() && point.cmple(self.maxs).all()
    }
}
