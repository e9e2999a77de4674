use glam::Vec3;

use super::{consts::MAX_MAP_VERTS, Lump};

/// Vertex lump: a plain array of positions, shared by edges of many faces.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPVertex {
    pub position: Vec3,
}

impl BSPVertex {
    pub fn position(&self) -> Vec3 {
        self.position
    }
}

impl Lump for BSPVertex {
    fn max() -> usize {
        MAX_MAP_VERTS
    }
}
