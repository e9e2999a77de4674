//! Turns a map buffer into meshes, lightmaps and visibility.

pub mod goldsrc;
pub mod vbsp;

use std::{borrow::Cow, ops::Range};

use glam::Vec3;
use serde::Serialize;

use crate::{
    atlas::LightmapAtlas,
    bsp::{
        displacement::Displacement,
        entities::Entity,
        environment::{AmbientSample, Cubemap, LeafWater, WorldLight},
        gamelump::StaticProps,
        header::LumpContainer,
        model::Model,
        overlay::Overlay,
        textures::Texture,
        tree::Child,
        visibility::{VisibilitySummary, VisibilitySystem},
        MapFormat,
    },
    config::BuildConfig,
    error::{BSPError, Result},
    meshes::{BuiltSurfaces, MeshBuffers, Surface},
    packer::PageInfo,
    pacing::{NoPacing, Pacer},
};

/// Everything decoded from one map.
#[derive(Debug, Default)]
pub struct BSPMap {
    pub format: Option<MapFormat>,
    pub version: i32,
    pub map_revision: i32,
    pub mesh: MeshBuffers,
    pub surfaces: Vec<Surface>,
    pub pages: Vec<PageInfo>,
    /// Surface of each face, `None` for faces that produced no geometry.
    pub face_to_surface: Vec<Option<usize>>,
    pub face_indices: Vec<Option<Range<u32>>>,
    pub skipped_faces: usize,
    pub visibility: VisibilitySystem,
    /// Face indices referenced by `Leaf::first_leaf_face`.
    pub leaf_faces: Vec<u16>,
    pub models: Vec<Model>,
    pub entities: Vec<Entity>,
    pub textures: Vec<Texture>,
    pub displacements: Vec<Displacement>,
    pub overlays: Vec<Overlay>,
    pub static_props: Option<StaticProps>,
    pub world_lights: Vec<WorldLight>,
    pub cubemaps: Vec<Cubemap>,
    pub leaf_water: Vec<LeafWater>,
    pub leaf_ambient: Vec<Vec<AmbientSample>>,
    /// Whether the HDR face and lighting set was used.
    pub hdr: bool,
    /// Lumps that were broken but did not stop the parse.
    pub diagnostics: Vec<BSPError>,
}

/// Counts for logging and `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct MapSummary {
    pub format: Option<MapFormat>,
    pub version: i32,
    pub vertices: usize,
    pub indices: usize,
    pub surfaces: usize,
    pub skipped_faces: usize,
    pub lightmap_pages: Vec<PageInfo>,
    pub models: usize,
    pub entities: usize,
    pub textures: usize,
    pub displacements: usize,
    pub overlays: usize,
    pub static_props: usize,
    pub world_lights: usize,
    pub cubemaps: usize,
    pub hdr: bool,
    pub visibility: VisibilitySummary,
    pub diagnostics: Vec<String>,
}

impl BSPMap {
    fn apply(&mut self, built: BuiltSurfaces) {
        self.mesh = built.mesh;
        self.surfaces = built.surfaces;
        self.pages = built.pages;
        self.face_to_surface = built.face_to_surface;
        self.face_indices = built.face_indices;
        self.skipped_faces = built.skipped_faces;
    }

    pub fn atlas(&self) -> LightmapAtlas<'_> {
        LightmapAtlas::new(&self.pages, &self.surfaces)
    }

    /// Surfaces drawn by the faces of `leaf`, ascending.
    pub fn leaf_surfaces(&self, leaf: usize) -> Vec<usize> {
        let Some(leaf) = self.visibility.leaves().get(leaf) else {
            return Vec::new();
        };
        let end = (leaf.first_leaf_face + leaf.num_leaf_faces).min(self.leaf_faces.len());
        let start = leaf.first_leaf_face.min(end);
        let mut out: Vec<usize> = self.leaf_faces[start..end]
            .iter()
            .filter_map(|&f| self.face_to_surface.get(f as usize).copied().flatten())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Surfaces potentially visible from `point`: its leaf, then every leaf in
    /// its PVS, then their faces.
    pub fn visible_surfaces(&self, point: Vec3) -> Vec<usize> {
        let Some(leaf) = self.visibility.point_leaf(point) else {
            return (0..self.surfaces.len()).collect();
        };
        let mut out: Vec<usize> = self
            .visibility
            .visible_leaves(leaf)
            .into_iter()
            .flat_map(|l| self.leaf_surfaces(l))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Leaf containing `point`, descending from `model`'s own head node.
    pub fn model_leaf(&self, model: usize, point: Vec3) -> Option<usize> {
        let head = Child::decode(self.models.get(model)?.head_node);
        self.visibility.point_leaf_from(head, point)
    }

    /// The brush model owning a `"model" "*N"` entity.
    pub fn entity_model(&self, entity: &Entity) -> Option<&Model> {
        self.models.get(entity.brush_model()?)
    }

    pub fn summary(&self) -> MapSummary {
        MapSummary {
            format: self.format,
            version: self.version,
            vertices: self.mesh.vertices.len(),
            indices: self.mesh.indices.len(),
            surfaces: self.surfaces.len(),
            skipped_faces: self.skipped_faces,
            lightmap_pages: self.pages.clone(),
            models: self.models.len(),
            entities: self.entities.len(),
            textures: self.textures.len(),
            displacements: self.displacements.len(),
            overlays: self.overlays.len(),
            static_props: self.static_props.as_ref().map_or(0, |p| p.props.len()),
            world_lights: self.world_lights.len(),
            cubemaps: self.cubemaps.len(),
            hdr: self.hdr,
            visibility: self.visibility.summary(),
            diagnostics: self.diagnostics.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Collects the errors of lumps that could be skipped.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    errors: Vec<BSPError>,
}

impl Diagnostics {
    pub fn push(&mut self, error: BSPError) {
        debug_assert!(!error.is_fatal(), "fatal error recorded as diagnostic: {error}");
        log::warn!("{}", error);
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = BSPError>) {
        for e in errors {
            self.push(e);
        }
    }

    /// The value, or its default with the error recorded.
    pub fn recover<T: Default>(&mut self, result: Result<T>) -> T {
        result.unwrap_or_else(|e| {
            self.push(e);
            T::default()
        })
    }

    pub fn into_inner(self) -> Vec<BSPError> {
        self.errors
    }
}

/// Lump bytes, or nothing when the lump is broken.
pub(crate) fn lump_or_empty<'a>(diag: &mut Diagnostics, lump: Result<Cow<'a, [u8]>>) -> Cow<'a, [u8]> {
    diag.recover(lump)
}

/// Decode a map of either family with default pacing.
pub fn parse(bytes: &[u8], config: &BuildConfig) -> Result<BSPMap> {
    parse_with_pacer(bytes, config, &mut NoPacing)
}

/// Decode a map, calling `pacer` every `config.yield_interval` faces.
///
/// Only an unknown header, a bad config or an unplaceable lightmap fail the
/// parse. Broken lumps end up in `BSPMap::diagnostics`.
pub fn parse_with_pacer(
    bytes: &[u8],
    config: &BuildConfig,
    pacer: &mut dyn Pacer,
) -> Result<BSPMap> {
    config.validate()?;
    let container = LumpContainer::parse(bytes)?;
    log::info!(
        "Loading {:?} map version {} ({} bytes)",
        container.format(),
        container.version(),
        bytes.len()
    );

    let map = match container.format() {
        MapFormat::GoldSrc => goldsrc::load(&container, config, pacer)?,
        MapFormat::Source => vbsp::load(&container, config, pacer)?,
    };

    log::info!(
        "Built {} surfaces, {} vertices, {} lightmap pages, {} clusters ({} problems)",
        map.surfaces.len(),
        map.mesh.vertices.len(),
        map.pages.len(),
        map.visibility.num_clusters(),
        map.diagnostics.len()
    );
    Ok(map)
}

#[cfg(test)]
mod loader_tests {
    use super::*;

    #[test]
    fn garbage_is_unsupported() {
        let config = BuildConfig::default();
        assert!(matches!(
            parse(b"PK\x03\x04 definitely not a map", &config),
            Err(BSPError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            parse(b"", &config),
            Err(BSPError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn bad_config_fails_before_parsing() {
        let config = BuildConfig {
            lightmap_page_width: 0,
            ..Default::default()
        };
        assert!(matches!(
            parse(b"VBSP", &config),
            Err(BSPError::Config(_))
        ));
    }

    #[test]
    fn diagnostics_recover_defaults() {
        let mut diag = Diagnostics::default();
        let v: Vec<u8> = diag.recover(Err(BSPError::corrupt("Planes", 0, 1, 2, "x")));
        assert!(v.is_empty());
        assert_eq!(diag.recover(Ok(vec![1u8])), vec![1]);
        assert_eq!(diag.into_inner().len(), 1);
    }
}
