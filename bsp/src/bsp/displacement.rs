use glam::Vec3;
use serde::Serialize;

use crate::{
    error::{BSPError, Result},
    meshes::FaceShape,
};

use super::{
    consts::{
        num_disp_power_verts, MAX_DISP_CORNER_NEIGHBORS, MAX_MAP_DISPINFO, MAX_MAP_DISP_POWER,
        MAX_MAP_DISP_VERTS, MIN_MAP_DISP_POWER,
    },
    Lump,
};

// NOTE: see the section titled "displacement neighbour rules" in the SDK.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CDispSubNeighbour {
    pub i_neighbour: u16,          // This indexes into ddispinfos. 0xFFFF if there is no neighbour here.
    pub neighbour_orientation: u8, // (CCW) rotation of the neighbour wrt this displacement.
    pub span: u8,                  // Where the neighbour fits onto this side of our displacement.
    pub neighbour_span: u8,        // Where we fit onto our neighbour.
    pub padding: u8,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CDispNeighbour {
    // if there is a neighbour that fills the whole side (CORNER_TO_CORNER),
    // then it will always be in sub_neighbours[0]
    pub sub_neighbours: [CDispSubNeighbour; 2],
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CDispCornerNeighbours {
    pub neighbours: [u16; MAX_DISP_CORNER_NEIGHBORS], // indices of neighbours.
    pub n_neighbours: u8,
    pub padding: u8,
}

/// `ddispinfo_t`, 176 bytes.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPDispInfo {
    pub start_position: Vec3,                // start position used for orientation
    pub disp_vert_start: i32,                // Index into LUMP_DISP_VERTS.
    pub disp_tri_start: i32,                 // Index into LUMP_DISP_TRIS.
    pub power: i32,                          // power - indicates size of surface (2^power 1)
    pub min_tess: i32,                       // minimum tesselation allowed
    pub smoothing_angle: f32,                // lighting smoothing angle
    pub contents: i32,                       // surface contents
    pub map_face: u16,                       // Which map face this displacement comes from.
    pub padding: u16,
    pub lightmap_alpha_start: i32,           // Index into ddisplightmapalpha.
    pub lightmap_sample_position_start: i32, // Index into LUMP_DISP_LIGHTMAP_SAMPLE_POSITIONS.
    pub edge_neighbours: [CDispNeighbour; 4],          // Indexed by NEIGHBOREDGE_ defines.
    pub corner_neighbours: [CDispCornerNeighbours; 4], // Indexed by CORNER_ defines.
    pub allowed_verts: [u32; 10],                      // active verticies
}

const _: () = assert!(std::mem::size_of::<BSPDispInfo>() == 176);

impl Lump for BSPDispInfo {
    fn max() -> usize {
        MAX_MAP_DISPINFO
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPDispVert {
    pub vec: Vec3,  // Vec3 field defining displacement volume.
    pub dist: f32,  // Displacement distances.
    pub alpha: f32, // "per vertex" alpha values.
}

impl Lump for BSPDispVert {
    fn max() -> usize {
        MAX_MAP_DISP_VERTS
    }
}

/// A displacement turned into a grid mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplacementMesh {
    pub power: u32,
    pub positions: Vec<Vec3>,
    pub base_positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub alphas: Vec<f32>,
    pub indices: Vec<u32>,
}

impl DisplacementMesh {
    pub fn side(&self) -> usize {
        (1 << self.power) + 1
    }

    pub fn into_shape(self) -> FaceShape {
        FaceShape::Mesh {
            positions: self.positions,
            base_positions: self.base_positions,
            normals: self.normals,
            alphas: self.alphas,
            indices: self.indices,
        }
    }
}

/// Where a displacement ended up, for consumers that need its leaves.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Displacement {
    pub face_index: usize,
    pub power: u32,
    pub surface: Option<usize>,
    pub mins: Vec3,
    pub maxs: Vec3,
    /// Leaves the displacement's box touches.
    pub leaves: Vec<usize>,
}

/// Tessellates displacement faces into `(2^power + 1)^2` grids.
pub struct DisplacementBuilder<'a> {
    verts: &'a [BSPDispVert],
}

impl<'a> DisplacementBuilder<'a> {
    pub fn new(verts: &'a [BSPDispVert]) -> Self {
        Self { verts }
    }

    /// Build the grid for `info` over the four `corners` of its base face.
    pub fn build(
        &self,
        info: &BSPDispInfo,
        corners: &[Vec3],
        normal: Vec3,
    ) -> Result<DisplacementMesh> {
        let power = info.power;
        if !(MIN_MAP_DISP_POWER as i32..=MAX_MAP_DISP_POWER as i32).contains(&power) {
            return Err(BSPError::corrupt(
                "DispInfo",
                info.map_face as usize,
                MAX_MAP_DISP_POWER as usize,
                power.unsigned_abs() as usize,
                "displacement power out of range",
            ));
        }
        let power = power as u32;
        if corners.len() != 4 {
            return Err(BSPError::corrupt(
                "DispInfo",
                info.map_face as usize,
                4,
                corners.len(),
                "displacement face is not a quad",
            ));
        }

        let side = (1usize << power) + 1;
        let count = num_disp_power_verts(power);
        let start = info.disp_vert_start;
        let verts = usize::try_from(start)
            .ok()
            .and_then(|s| self.verts.get(s..s + count))
            .ok_or_else(|| {
                BSPError::corrupt(
                    "DispVerts",
                    start.max(0) as usize,
                    count,
                    self.verts.len().saturating_sub(start.max(0) as usize),
                    "displacement vertices out of range",
                )
            })?;

        let corners = Self::rotate_to_start(corners, info.start_position);

        let mut positions = Vec::with_capacity(count);
        let mut base_positions = Vec::with_capacity(count);
        let mut alphas = Vec::with_capacity(count);
        let step = 1.0 / (side as f32 - 1.0);
        for y in 0..side {
            let dy = y as f32 * step;
            let v0 = corners[0].lerp(corners[3], dy);
            let v1 = corners[1].lerp(corners[2], dy);
            for x in 0..side {
                let dx = x as f32 * step;
                let vert = verts[x + side * y];
                let base = v0.lerp(v1, dx);
                let (vec, dist, alpha) = (vert.vec, vert.dist, vert.alpha);
                base_positions.push(base);
                positions.push(base + vec * dist);
                alphas.push((alpha / 255.0).clamp(0.0, 1.0));
            }
        }

        // wind every triangle counter-clockwise around the face normal
        let at = |x: usize, y: usize| (x + side * y) as u32;
        let first = [at(0, 0), at(0, 1), at(1, 1)];
        let winding = (base_positions[first[1] as usize] - base_positions[first[0] as usize])
            .cross(base_positions[first[2] as usize] - base_positions[first[0] as usize])
            .dot(normal);
        let flip = winding < 0.0;

        let mut indices = Vec::with_capacity(6 * (side - 1) * (side - 1));
        for y in 0..side - 1 {
            for x in 0..side - 1 {
                for [a, b, c] in [
                    [at(x, y), at(x, y + 1), at(x + 1, y + 1)],
                    [at(x, y), at(x + 1, y + 1), at(x + 1, y)],
                ] {
                    if flip {
                        indices.extend_from_slice(&[a, c, b]);
                    } else {
                        indices.extend_from_slice(&[a, b, c]);
                    }
                }
            }
        }

        let normals = Self::grid_normals(&positions, side, normal, flip);

        Ok(DisplacementMesh {
            power,
            positions,
            base_positions,
            normals,
            alphas,
            indices,
        })
    }

    /// The grid starts at the corner nearest `start_position`.
    fn rotate_to_start(corners: &[Vec3], start: Vec3) -> [Vec3; 4] {
        let first = corners
            .iter()
            .enumerate()
            .min_by(|a, b| {
                a.1.distance_squared(start)
                    .total_cmp(&b.1.distance_squared(start))
            })
            .map_or(0, |(i, _)| i);
        [0, 1, 2, 3].map(|i| corners[(first + i) % 4])
    }

    /// Average the normals of the (up to four) quads around each vertex.
    fn grid_normals(positions: &[Vec3], side: usize, fallback: Vec3, flip: bool) -> Vec<Vec3> {
        let quads = side - 1;
        let mut quad_normals = Vec::with_capacity(quads * quads);
        for y in 0..quads {
            for x in 0..quads {
                let p00 = positions[x + side * y];
                let p10 = positions[x + 1 + side * y];
                let p01 = positions[x + side * (y + 1)];
                let p11 = positions[x + 1 + side * (y + 1)];
                let n = (p01 - p00).cross(p11 - p00) + (p11 - p00).cross(p10 - p00);
                quad_normals.push(if flip { -n } else { n });
            }
        }

        let mut normals = Vec::with_capacity(positions.len());
        for y in 0..side {
            for x in 0..side {
                let mut sum = Vec3::ZERO;
                let (left, below) = (x.wrapping_sub(1), y.wrapping_sub(1));
                for (qx, qy) in [(left, below), (x, below), (left, y), (x, y)] {
                    if qx < quads && qy < quads {
                        sum += quad_normals[qx + quads * qy];
                    }
                }
                let n = sum.normalize_or_zero();
                normals.push(if n == Vec3::ZERO { fallback } else { n });
            }
        }
        normals
    }
}

#[cfg(test)]
mod displacement_tests {
    use super::*;

    fn unit_quad() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::new(4.0, 4.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
        ]
    }

    fn info(power: i32) -> BSPDispInfo {
        BSPDispInfo {
            power,
            ..Default::default()
        }
    }

    fn flat_verts(n: usize) -> Vec<BSPDispVert> {
        vec![
            BSPDispVert {
                vec: Vec3::Z,
                dist: 0.0,
                alpha: 255.0,
            };
            n
        ]
    }

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<BSPDispVert>(), 20);
        assert_eq!(std::mem::size_of::<CDispNeighbour>(), 12);
        assert_eq!(std::mem::size_of::<CDispCornerNeighbours>(), 10);
    }

    #[test]
    fn flat_grid() {
        let verts = flat_verts(25);
        let mesh = DisplacementBuilder::new(&verts)
            .build(&info(2), &unit_quad(), Vec3::Z)
            .unwrap();
        assert_eq!(mesh.side(), 5);
        assert_eq!(mesh.positions.len(), 25);
        assert_eq!(mesh.indices.len(), 4 * 4 * 6);
        assert_eq!(mesh.positions[0], Vec3::ZERO);
        assert_eq!(mesh.positions[24], Vec3::new(4.0, 4.0, 0.0));
        assert_eq!(mesh.positions[1], Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(mesh.positions[5], Vec3::new(1.0, 0.0, 0.0));
        for n in &mesh.normals {
            assert!((*n - Vec3::Z).length() < 1e-5);
        }
        assert!(mesh.alphas.iter().all(|&a| a == 1.0));
    }

    #[test]
    fn triangles_face_the_normal() {
        let verts = flat_verts(25);
        for normal in [Vec3::Z, -Vec3::Z] {
            let mesh = DisplacementBuilder::new(&verts)
                .build(&info(2), &unit_quad(), normal)
                .unwrap();
            for tri in mesh.indices.chunks(3) {
                let [a, b, c] = [0, 1, 2].map(|i| mesh.positions[tri[i] as usize]);
                assert!((b - a).cross(c - a).dot(normal) > 0.0);
            }
            assert!(mesh.normals.iter().all(|n| n.dot(normal) > 0.99));
        }
    }

    #[test]
    fn offsets_move_vertices() {
        let mut verts = flat_verts(25);
        verts[12] = BSPDispVert {
            vec: Vec3::Z,
            dist: 2.0,
            alpha: 0.0,
        };
        let mesh = DisplacementBuilder::new(&verts)
            .build(&info(2), &unit_quad(), Vec3::Z)
            .unwrap();
        assert_eq!(mesh.positions[12], Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(mesh.base_positions[12], Vec3::new(2.0, 2.0, 0.0));
        assert_eq!(mesh.alphas[12], 0.0);
        // neighbours lean away from the bump
        assert!(mesh.normals[11].y < 0.0);
        assert!(mesh.normals[13].y > 0.0);
    }

    #[test]
    fn start_position_picks_first_corner() {
        let verts = flat_verts(25);
        let mut disp = info(2);
        disp.start_position = Vec3::new(4.1, 3.9, 0.0);
        let mesh = DisplacementBuilder::new(&verts)
            .build(&disp, &unit_quad(), Vec3::Z)
            .unwrap();
        assert_eq!(mesh.positions[0], Vec3::new(4.0, 4.0, 0.0));
    }

    #[test]
    fn bad_inputs_are_corrupt() {
        let verts = flat_verts(24);
        let builder = DisplacementBuilder::new(&verts);
        assert!(builder.build(&info(2), &unit_quad(), Vec3::Z).is_err());
        assert!(builder.build(&info(1), &unit_quad(), Vec3::Z).is_err());
        assert!(builder.build(&info(5), &unit_quad(), Vec3::Z).is_err());
        assert!(builder.build(&info(2), &unit_quad()[..3], Vec3::Z).is_err());
    }
}
