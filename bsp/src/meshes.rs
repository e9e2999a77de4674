use std::ops::Range;

use common::{bounds::BoundingBox, vertex::MeshVertex};
use glam::{vec2, Vec2, Vec3, Vec4};
use serde::Serialize;

use crate::{
    error::Result,
    packer::{LightmapPacker, PageInfo, Placement},
};

/// Vertex and index arrays shared by every surface of one parse.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MeshBuffers {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

/// A face's lightmap rectangle and where it landed in the atlas.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LightmapAllocation {
    pub face_index: usize,
    pub width: u32,
    pub height: u32,
    pub styles: [u8; 4],
    /// RGB8 luxels, one `width * height` block per style (and per bump vector on Source).
    #[serde(skip)]
    pub samples: Vec<u8>,
    pub page: usize,
    pub x: u32,
    pub y: u32,
    /// Vertices whose lightmap UVs point into this rectangle.
    #[serde(skip)]
    pub vertex_range: Range<u32>,
}

/// A contiguous run of indices drawn with one texture and one lightmap page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Surface {
    pub texture_name: String,
    pub start_index: u32,
    pub index_count: u32,
    pub lightmap_allocations: Vec<LightmapAllocation>,
    pub lightmap_page: Option<usize>,
    pub bounds: BoundingBox,
    pub model: usize,
    pub faces: Vec<usize>,
    pub translucent: bool,
    pub displacement: bool,
}

/// Lightmap data of one face, in luxel units.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceLightmap {
    /// Projection into lightmap space (Source lightmap vecs, GoldSrc texture vecs).
    pub vecs: [[f32; 4]; 2],
    /// World units to luxels after projection: 1 on Source, 1/16 on GoldSrc.
    pub scale: f32,
    /// Luxel space minimum of the face.
    pub mins: Vec2,
    pub width: u32,
    pub height: u32,
    pub styles: [u8; 4],
    pub samples: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FaceShape {
    /// Convex polygon in file winding order.
    Polygon(Vec<Vec3>),
    /// Already tessellated patch. `base_positions` lie on the face plane and are
    /// what texture and lightmap coordinates are projected from.
    Mesh {
        positions: Vec<Vec3>,
        base_positions: Vec<Vec3>,
        normals: Vec<Vec3>,
        alphas: Vec<f32>,
        indices: Vec<u32>,
    },
}

/// Everything the builder needs to know about one face.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceInput {
    pub face_index: usize,
    pub model: usize,
    pub texture_name: String,
    /// Texture size in texels, zero when unknown.
    pub texture_size: Vec2,
    pub normal: Vec3,
    pub texture_vecs: [[f32; 4]; 2],
    pub lightmap: Option<FaceLightmap>,
    pub shape: FaceShape,
    /// Sky, nodraw and tool faces produce nothing.
    pub skip: bool,
    /// Translucent faces are drawn sorted and never merged.
    pub translucent: bool,
}

impl FaceInput {
    /// Placeholder for a face that could not be decoded, so indices stay aligned.
    pub fn skipped(face_index: usize, model: usize) -> Self {
        Self {
            face_index,
            model,
            texture_name: String::new(),
            texture_size: Vec2::ZERO,
            normal: Vec3::ZERO,
            texture_vecs: [[0.0; 4]; 2],
            lightmap: None,
            shape: FaceShape::Polygon(Vec::new()),
            skip: true,
            translucent: false,
        }
    }
}

/// `u = dot(position, s.xyz) + s.w`, same for `v` with `t`.
pub fn project_uv(position: Vec3, vecs: &[[f32; 4]; 2]) -> Vec2 {
    let [s, t] = vecs;
    vec2(
        position.dot(Vec3::new(s[0], s[1], s[2])) + s[3],
        position.dot(Vec3::new(t[0], t[1], t[2])) + t[3],
    )
}

/// Lightmap coordinate of `position` inside its face rectangle, in luxels,
/// centred on the luxel.
pub fn project_lightmap_uv(position: Vec3, lightmap: &FaceLightmap) -> Vec2 {
    project_uv(position, &lightmap.vecs) * lightmap.scale - lightmap.mins + Vec2::splat(0.5)
}

/// Fan around the first vertex, then the whole list reversed.
///
/// Faces are stored clockwise; reversing gives counter-clockwise front faces.
pub fn triangulate_fan(base: u32, count: usize) -> Vec<u32> {
    if count < 3 {
        return Vec::new();
    }
    let mut indices = Vec::with_capacity(3 * (count - 2));
    for i in 1..(count as u32 - 1) {
        indices.extend_from_slice(&[base, base + i, base + i + 1]);
    }
    indices.reverse();
    indices
}

/// Tangent along the texture s axis, with the bitangent sign in `w`.
pub fn texture_tangent(normal: Vec3, vecs: &[[f32; 4]; 2]) -> Vec4 {
    let [s, t] = vecs;
    let s = Vec3::new(s[0], s[1], s[2]);
    let t = Vec3::new(t[0], t[1], t[2]);
    let tangent = (s - normal * normal.dot(s)).normalize_or_zero();
    let sign = if normal.cross(tangent).dot(t) < 0.0 {
        -1.0
    } else {
        1.0
    };
    tangent.extend(sign)
}

fn polygon_area(points: &[Vec3]) -> f32 {
    let mut sum = Vec3::ZERO;
    for i in 1..points.len().saturating_sub(1) {
        sum += (points[i] - points[0]).cross(points[i + 1] - points[0]);
    }
    sum.length() * 0.5
}

/// Output of a finished build.
#[derive(Clone, Debug, Default)]
pub struct BuiltSurfaces {
    pub mesh: MeshBuffers,
    pub surfaces: Vec<Surface>,
    pub pages: Vec<PageInfo>,
    /// Surface of every face index pushed, `None` for skipped faces.
    pub face_to_surface: Vec<Option<usize>>,
    /// Range of `mesh.indices` each face emitted.
    pub face_indices: Vec<Option<Range<u32>>>,
    pub skipped_faces: usize,
}

/// Builds surfaces from faces in the order they are pushed.
///
/// A face is merged into the open surface when both are opaque polygons with
/// the same texture, lightmap page and model. Anything else closes the open
/// surface and starts a new one.
pub struct SurfaceBuilder {
    packer: LightmapPacker,
    mesh: MeshBuffers,
    closed: Vec<Surface>,
    open: Option<Surface>,
    face_to_surface: Vec<Option<usize>>,
    face_indices: Vec<Option<Range<u32>>>,
    skipped: usize,
}

impl SurfaceBuilder {
    pub fn new(page_width: u32, page_height: u32) -> Result<Self> {
        Ok(Self {
            packer: LightmapPacker::new(page_width, page_height)?,
            mesh: MeshBuffers::default(),
            closed: Vec::new(),
            open: None,
            face_to_surface: Vec::new(),
            face_indices: Vec::new(),
            skipped: 0,
        })
    }

    /// Add one face, returning the index of the surface it went into.
    pub fn push_face(&mut self, face: FaceInput) -> Result<Option<usize>> {
        if self.face_to_surface.len() <= face.face_index {
            self.face_to_surface.resize(face.face_index + 1, None);
            self.face_indices.resize(face.face_index + 1, None);
        }

        if face.skip || Self::is_degenerate(&face.shape) {
            self.skipped += 1;
            return Ok(None);
        }

        let placement = match &face.lightmap {
            Some(lm) if lm.width > 0 && lm.height > 0 => {
                Some(self.packer.allocate(lm.width, lm.height)?)
            }
            _ => None,
        };
        let page = placement.map(|p| p.page);

        let first_vertex = self.mesh.vertices.len() as u32;
        let start_index = self.mesh.indices.len() as u32;
        let mut bounds = BoundingBox::EMPTY;
        self.emit_geometry(&face, placement, &mut bounds);
        let last_vertex = self.mesh.vertices.len() as u32;
        let index_count = self.mesh.indices.len() as u32 - start_index;

        let allocation = match (face.lightmap, placement) {
            (Some(lm), Some(p)) => Some(LightmapAllocation {
                face_index: face.face_index,
                width: lm.width,
                height: lm.height,
                styles: lm.styles,
                samples: lm.samples,
                page: p.page,
                x: p.x,
                y: p.y,
                vertex_range: first_vertex..last_vertex,
            }),
            _ => None,
        };

        let displacement = matches!(face.shape, FaceShape::Mesh { .. });
        let mergeable = !face.translucent && !displacement;

        let merges = match &self.open {
            Some(open) => {
                mergeable
                    && !open.translucent
                    && !open.displacement
                    && open.texture_name == face.texture_name
                    && open.lightmap_page == page
                    && open.model == face.model
            }
            None => false,
        };

        if merges {
            if let Some(open) = self.open.as_mut() {
                open.index_count += index_count;
                open.lightmap_allocations.extend(allocation);
                open.bounds.union(&bounds);
                open.faces.push(face.face_index);
            }
        } else {
            if let Some(done) = self.open.take() {
                self.closed.push(done);
            }
            self.open = Some(Surface {
                texture_name: face.texture_name,
                start_index,
                index_count,
                lightmap_allocations: allocation.into_iter().collect(),
                lightmap_page: page,
                bounds,
                model: face.model,
                faces: vec![face.face_index],
                translucent: face.translucent,
                displacement,
            });
        }

        let surface = self.closed.len();
        self.face_to_surface[face.face_index] = Some(surface);
        self.face_indices[face.face_index] = Some(start_index..start_index + index_count);
        Ok(Some(surface))
    }

    fn is_degenerate(shape: &FaceShape) -> bool {
        match shape {
            FaceShape::Polygon(points) => points.len() < 3 || polygon_area(points) <= 1e-6,
            FaceShape::Mesh {
                positions, indices, ..
            } => positions.is_empty() || indices.len() < 3,
        }
    }

    fn emit_geometry(
        &mut self,
        face: &FaceInput,
        placement: Option<Placement>,
        bounds: &mut BoundingBox,
    ) {
        let base = self.mesh.vertices.len() as u32;
        let tangent = texture_tangent(face.normal, &face.texture_vecs);
        let atlas_offset = placement.map_or(Vec2::ZERO, |p| vec2(p.x as f32, p.y as f32));

        let vertex = |position: Vec3, projected_from: Vec3, normal: Vec3| {
            let mut uv = project_uv(projected_from, &face.texture_vecs);
            if face.texture_size.x > 0.0 {
                uv.x /= face.texture_size.x;
            }
            if face.texture_size.y > 0.0 {
                uv.y /= face.texture_size.y;
            }
            let lightmap_uv = match (&face.lightmap, placement) {
                (Some(lm), Some(_)) => project_lightmap_uv(projected_from, lm) + atlas_offset,
                _ => Vec2::ZERO,
            };
            MeshVertex::new(position, normal, tangent, uv, lightmap_uv)
        };

        match &face.shape {
            FaceShape::Polygon(points) => {
                for &p in points {
                    bounds.add_point(p);
                    self.mesh.vertices.push(vertex(p, p, face.normal));
                }
                self.mesh
                    .indices
                    .extend(triangulate_fan(base, points.len()));
            }
            FaceShape::Mesh {
                positions,
                base_positions,
                normals,
                alphas,
                indices,
            } => {
                for (i, &p) in positions.iter().enumerate() {
                    bounds.add_point(p);
                    let from = base_positions.get(i).copied().unwrap_or(p);
                    let normal = normals.get(i).copied().unwrap_or(face.normal);
                    let alpha = alphas.get(i).copied().unwrap_or(1.0);
                    self.mesh
                        .vertices
                        .push(vertex(p, from, normal).with_alpha(alpha));
                }
                self.mesh.indices.extend(indices.iter().map(|i| base + i));
            }
        }
    }

    /// Close the open surface and rescale lightmap UVs from luxels to page space.
    pub fn finish(mut self) -> BuiltSurfaces {
        if let Some(done) = self.open.take() {
            self.closed.push(done);
        }
        let pages = self.packer.page_infos();

        for surface in &self.closed {
            for alloc in &surface.lightmap_allocations {
                let Some(page) = pages.get(alloc.page) else {
                    continue;
                };
                let size = vec2(page.width.max(1) as f32, page.height.max(1) as f32);
                let range = alloc.vertex_range.start as usize..alloc.vertex_range.end as usize;
                for v in &mut self.mesh.vertices[range] {
                    v.lightmap_uv /= size;
                }
            }
        }

        log::debug!(
            "Built {} surfaces from {} faces ({} skipped) on {} lightmap pages",
            self.closed.len(),
            self.face_to_surface.len(),
            self.skipped,
            pages.len()
        );

        BuiltSurfaces {
            mesh: self.mesh,
            surfaces: self.closed,
            pages,
            face_to_surface: self.face_to_surface,
            face_indices: self.face_indices,
            skipped_faces: self.skipped,
        }
    }

    pub fn surface_count(&self) -> usize {
        self.closed.len() + self.open.is_some() as usize
    }
}
