use std::ops::Range;

use common::vertex::MeshVertex;
use glam::{vec2, Vec2, Vec3};
use serde::Serialize;

use crate::{
    error::{BSPError, Result},
    meshes::{triangulate_fan, MeshBuffers},
};

use super::{
    consts::{MAX_MAP_OVERLAYS, OVERLAY_BSP_FACE_COUNT, OVERLAY_RENDER_ORDER_NUM_BITS},
    Lump,
};

/// `doverlay_t`, 352 bytes.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPOverlay {
    pub id: i32,
    pub tex_info: i16,
    /// Low bits are the face count, the top two the render order.
    pub face_count_and_render_order: u16,
    pub faces: [i32; OVERLAY_BSP_FACE_COUNT],
    pub u: [f32; 2],
    pub v: [f32; 2],
    /// Quad corners in the overlay plane. The z components hold the U basis vector.
    pub uv_points: [Vec3; 4],
    pub origin: Vec3,
    pub basis_normal: Vec3,
}

impl Default for BSPOverlay {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

impl Lump for BSPOverlay {
    fn max() -> usize {
        MAX_MAP_OVERLAYS
    }
}

const FACE_COUNT_BITS: u16 = 16 - OVERLAY_RENDER_ORDER_NUM_BITS;

impl BSPOverlay {
    pub fn face_count(&self) -> usize {
        (self.face_count_and_render_order & ((1 << FACE_COUNT_BITS) - 1)) as usize
    }

    pub fn render_order(&self) -> u16 {
        self.face_count_and_render_order >> FACE_COUNT_BITS
    }

    /// (U, V, normal) of the overlay plane.
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let points = self.uv_points;
        let normal = self.basis_normal.normalize_or_zero();
        let u = Vec3::new(points[0].z, points[1].z, points[2].z).normalize_or_zero();
        let v = normal.cross(u);
        (u, v, normal)
    }
}

/// An overlay clipped onto the faces it was placed on.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Overlay {
    pub id: i32,
    pub texture_name: String,
    pub render_order: u16,
    pub faces: Vec<usize>,
    pub origin: Vec3,
    pub normal: Vec3,
    pub mesh: MeshBuffers,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct ClipVertex {
    p: Vec2,
    uv: Vec2,
}

/// Keep the part of `poly` on the left of `a -> b` (or the right, for `side < 0`).
fn clip_edge(poly: &[ClipVertex], a: Vec2, b: Vec2, side: f32) -> Vec<ClipVertex> {
    let edge = b - a;
    let dist = |v: &ClipVertex| edge.perp_dot(v.p - a) * side;

    let mut out = Vec::with_capacity(poly.len() + 1);
    for (i, cur) in poly.iter().enumerate() {
        let next = &poly[(i + 1) % poly.len()];
        let (dc, dn) = (dist(cur), dist(next));
        if dc >= 0.0 {
            out.push(*cur);
        }
        if (dc >= 0.0) != (dn >= 0.0) {
            let t = dc / (dc - dn);
            out.push(ClipVertex {
                p: cur.p.lerp(next.p, t),
                uv: cur.uv.lerp(next.uv, t),
            });
        }
    }
    out
}

fn signed_area(points: impl Iterator<Item = Vec2> + Clone) -> f32 {
    let first = points.clone();
    let second = points.cycle().skip(1);
    first.zip(second).map(|(a, b)| a.perp_dot(b)).sum::<f32>() * 0.5
}

/// Projects overlays onto the triangles of the faces they target.
pub struct OverlayBuilder<'a> {
    mesh: &'a MeshBuffers,
    face_indices: &'a [Option<Range<u32>>],
}

impl<'a> OverlayBuilder<'a> {
    /// `face_indices` maps each face to its range of `mesh.indices`.
    pub fn new(mesh: &'a MeshBuffers, face_indices: &'a [Option<Range<u32>>]) -> Self {
        Self { mesh, face_indices }
    }

    pub fn build(&self, overlay: &BSPOverlay, texture_name: String) -> Result<Overlay> {
        let (u_axis, v_axis, normal) = overlay.basis();
        let origin = overlay.origin;
        let points = overlay.uv_points;
        let (u, v) = (overlay.u, overlay.v);
        let id = overlay.id;

        let quad = [
            ClipVertex {
                p: points[0].truncate(),
                uv: vec2(u[0], v[0]),
            },
            ClipVertex {
                p: points[1].truncate(),
                uv: vec2(u[0], v[1]),
            },
            ClipVertex {
                p: points[2].truncate(),
                uv: vec2(u[1], v[1]),
            },
            ClipVertex {
                p: points[3].truncate(),
                uv: vec2(u[1], v[0]),
            },
        ];

        let to_plane = |p: Vec3| {
            let d = p - origin;
            vec2(d.dot(u_axis), d.dot(v_axis))
        };

        let face_count = overlay.face_count().min(OVERLAY_BSP_FACE_COUNT);
        let raw_faces = overlay.faces;
        let mut faces = Vec::with_capacity(face_count);
        let mut mesh = MeshBuffers::default();

        for &raw in &raw_faces[..face_count] {
            let face = usize::try_from(raw)
                .ok()
                .filter(|&f| f < self.face_indices.len())
                .ok_or_else(|| {
                    BSPError::corrupt(
                        "Overlays",
                        id.max(0) as usize,
                        self.face_indices.len(),
                        raw.unsigned_abs() as usize,
                        "overlay references missing face",
                    )
                })?;
            faces.push(face);

            let Some(range) = &self.face_indices[face] else {
                continue;
            };
            let indices = self
                .mesh
                .indices
                .get(range.start as usize..range.end as usize)
                .unwrap_or_default();

            for tri in indices.chunks_exact(3) {
                let Some(verts) = tri
                    .iter()
                    .map(|&i| self.mesh.vertices.get(i as usize).copied())
                    .collect::<Option<Vec<MeshVertex>>>()
                else {
                    continue;
                };
                self.clip_triangle(&quad, &verts, &to_plane, normal, &mut mesh);
            }
        }

        Ok(Overlay {
            id,
            texture_name,
            render_order: overlay.render_order(),
            faces,
            origin,
            normal,
            mesh,
        })
    }

    fn clip_triangle(
        &self,
        quad: &[ClipVertex; 4],
        tri: &[MeshVertex],
        to_plane: &impl Fn(Vec3) -> Vec2,
        normal: Vec3,
        out: &mut MeshBuffers,
    ) {
        let flat = [0, 1, 2].map(|i| to_plane(tri[i].position));
        let area = (flat[1] - flat[0]).perp_dot(flat[2] - flat[0]);
        if area.abs() <= 1e-6 {
            return;
        }
        let side = area.signum();

        let mut poly = quad.to_vec();
        for i in 0..3 {
            poly = clip_edge(&poly, flat[i], flat[(i + 1) % 3], side);
            if poly.len() < 3 {
                return;
            }
        }

        let (v0, v1) = (flat[1] - flat[0], flat[2] - flat[0]);
        let base = out.vertices.len() as u32;
        for c in &poly {
            let v2 = c.p - flat[0];
            let s = v2.perp_dot(v1) / area;
            let t = v0.perp_dot(v2) / area;
            let along = |f: fn(&MeshVertex) -> Vec3| {
                f(&tri[0]) + (f(&tri[1]) - f(&tri[0])) * s + (f(&tri[2]) - f(&tri[0])) * t
            };
            let lightmap = tri[0].lightmap_uv
                + (tri[1].lightmap_uv - tri[0].lightmap_uv) * s
                + (tri[2].lightmap_uv - tri[0].lightmap_uv) * t;
            out.vertices.push(MeshVertex::new(
                along(|v| v.position),
                normal,
                tri[0].tangent,
                c.uv,
                lightmap,
            ));
        }

        // counter-clockwise seen from the overlay normal
        let mut indices = triangulate_fan(base, poly.len());
        if signed_area(poly.iter().map(|c| c.p)) > 0.0 {
            indices.reverse();
        }
        out.indices.extend(indices);
    }
}

#[cfg(test)]
mod overlay_tests {
    use super::*;
    use glam::Vec4;

    fn target(corners: &[Vec3]) -> (MeshBuffers, Vec<Option<Range<u32>>>) {
        let vertices = corners
            .iter()
            .map(|&p| MeshVertex::new(p, Vec3::Z, Vec4::X, Vec2::ZERO, p.truncate()))
            .collect::<Vec<_>>();
        let indices = triangulate_fan(0, corners.len());
        let range = 0..indices.len() as u32;
        (MeshBuffers { vertices, indices }, vec![Some(range)])
    }

    fn overlay(half: f32, faces: &[i32]) -> BSPOverlay {
        let mut o = BSPOverlay::default();
        o.id = 7;
        o.face_count_and_render_order = faces.len() as u16 | (2 << FACE_COUNT_BITS);
        let mut targets = o.faces;
        targets[..faces.len()].copy_from_slice(faces);
        o.faces = targets;
        o.u = [0.0, 1.0];
        o.v = [0.0, 1.0];
        // U basis is +X, stored in the z components
        o.uv_points = [
            Vec3::new(-half, -half, 1.0),
            Vec3::new(-half, half, 0.0),
            Vec3::new(half, half, 0.0),
            Vec3::new(half, -half, 0.0),
        ];
        o.basis_normal = Vec3::Z;
        o
    }

    fn mesh_area(mesh: &MeshBuffers) -> f32 {
        mesh.indices
            .chunks(3)
            .map(|t| {
                let [a, b, c] = [0, 1, 2].map(|i| mesh.vertices[t[i] as usize].position);
                (b - a).cross(c - a).z * 0.5
            })
            .sum()
    }

    #[test]
    fn record_layout() {
        assert_eq!(std::mem::size_of::<BSPOverlay>(), 352);
        let o = overlay(1.0, &[0]);
        assert_eq!(o.face_count(), 1);
        assert_eq!(o.render_order(), 2);
        let (u, v, n) = o.basis();
        assert_eq!((u, v, n), (Vec3::X, Vec3::Y, Vec3::Z));
    }

    #[test]
    fn overlay_inside_face_keeps_its_area() {
        let (mesh, ranges) = target(&[
            Vec3::new(-4.0, -4.0, 0.0),
            Vec3::new(-4.0, 4.0, 0.0),
            Vec3::new(4.0, 4.0, 0.0),
            Vec3::new(4.0, -4.0, 0.0),
        ]);
        let built = OverlayBuilder::new(&mesh, &ranges)
            .build(&overlay(1.0, &[0]), "decals/x".into())
            .unwrap();
        assert_eq!(built.faces, vec![0]);
        assert!((mesh_area(&built.mesh) - 4.0).abs() < 1e-4);
        // lightmap uv interpolates the face's, which is position.xy here
        for v in &built.mesh.vertices {
            assert!((v.lightmap_uv - v.position.truncate()).length() < 1e-5);
            assert!(v.uv.cmpge(Vec2::ZERO).all() && v.uv.cmple(Vec2::ONE).all());
        }
    }

    #[test]
    fn overlay_is_clipped_to_face() {
        // face covers only x >= 0
        let (mesh, ranges) = target(&[
            Vec3::new(0.0, -4.0, 0.0),
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::new(4.0, 4.0, 0.0),
            Vec3::new(4.0, -4.0, 0.0),
        ]);
        let built = OverlayBuilder::new(&mesh, &ranges)
            .build(&overlay(1.0, &[0]), "decals/x".into())
            .unwrap();
        assert!((mesh_area(&built.mesh) - 2.0).abs() < 1e-4);
        assert!(built.mesh.vertices.iter().all(|v| v.position.x >= -1e-5));
        // the clipped edge sits halfway across the texture
        let min_u = built
            .mesh
            .vertices
            .iter()
            .map(|v| v.uv.x)
            .fold(f32::MAX, f32::min);
        assert!((min_u - 0.5).abs() < 1e-5);
    }

    #[test]
    fn missing_face_is_corrupt() {
        let (mesh, ranges) = target(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
        let builder = OverlayBuilder::new(&mesh, &ranges);
        assert!(builder.build(&overlay(1.0, &[3]), String::new()).is_err());
        assert!(builder.build(&overlay(1.0, &[-1]), String::new()).is_err());
    }

    #[test]
    fn clip_edge_splits_square() {
        let square = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]
            .map(|(x, y)| ClipVertex {
                p: vec2(x, y),
                uv: vec2(x, y),
            });
        // keep x <= 1: left of the upward line x = 1
        let half = clip_edge(&square, vec2(1.0, 0.0), vec2(1.0, 1.0), 1.0);
        assert!((signed_area(half.iter().map(|c| c.p)) - 2.0).abs() < 1e-6);
        assert!(half.iter().all(|c| c.p.x <= 1.0 && c.uv == c.p));
    }
}
