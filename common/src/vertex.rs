use glam::{Vec2, Vec3, Vec4};
use serde::Serialize;

/// Anything that can be laid out in a vertex buffer.
pub trait Vertex: bytemuck::Pod + Default {
    fn position(&self) -> Vec3;
}

/// Vertex produced by the map decoder for world geometry.
///
/// `tangent.w` holds the bitangent sign, so a consumer can rebuild the
/// bitangent as `cross(normal, tangent.xyz) * tangent.w`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable, Serialize)]
pub struct MeshVertex {
    // first, as `Vec4` may be 16 byte aligned
    pub tangent: Vec4,
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub lightmap_uv: Vec2,
    pub alpha: f32,
    #[serde(skip)]
    _pad: f32,
}

impl MeshVertex {
    pub fn new(position: Vec3, normal: Vec3, tangent: Vec4, uv: Vec2, lightmap_uv: Vec2) -> Self {
        Self {
            position,
            normal,
            tangent,
            uv,
            lightmap_uv,
            alpha: 1.0,
            _pad: 0.0,
        }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }
}

impl Vertex for MeshVertex {
    fn position(&self) -> Vec3 {
        self.position
    }
}
