use glam::Vec3;

use super::{consts::MAX_MAP_PLANES, Lump};

/// Plane
///
/// The basis of the BSP geometry is defined by planes, which are used as splitting surfaces across the BSP tree structure.
///
/// The plane is represented by the element normal, a unit vector perpendicular to the plane's surface,
/// and `dist`, the distance from the map origin to the nearest point on the plane:
///
/// `Ax + By + Cz = D`
///
/// The same 20 byte record is used by GoldSrc and Source maps.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPPlane {
    pub normal: Vec3, // normal vector
    pub dist: f32,    // distance from origin
    pub axis: i32,    // plane axis identifier
}

impl BSPPlane {
    pub fn new(normal: Vec3, dist: f32) -> Self {
        Self {
            normal,
            dist,
            axis: 0,
        }
    }

    /// Signed distance of `point` in front of the plane.
    pub fn distance(&self, point: Vec3) -> f32 {
        let (normal, dist) = (self.normal, self.dist);
        normal.dot(point) - dist
    }
}

impl Lump for BSPPlane {
    fn max() -> usize {
        MAX_MAP_PLANES
    }
}

#[cfg(test)]
mod plane_tests {
    use super::*;

    #[test]
    fn record_size() {
        assert_eq!(std::mem::size_of::<BSPPlane>(), 20);
    }

    #[test]
    fn signed_distance() {
        let plane = BSPPlane::new(Vec3::Z, 8.0);
        assert_eq!(plane.distance(Vec3::new(3.0, 4.0, 10.0)), 2.0);
        assert_eq!(plane.distance(Vec3::ZERO), -8.0);
    }
}
