pub use crate::atlas::LightmapAtlas;
pub use crate::bsp::{
    consts::{LumpType, MapFormat, SurfFlags},
    displacement::Displacement,
    entities::Entity,
    environment::{AmbientSample, Cubemap, LeafWater, WorldLight},
    gamelump::{StaticProp, StaticProps},
    header::LumpContainer,
    model::Model,
    overlay::Overlay,
    textures::Texture,
    visibility::VisibilitySystem,
};
pub use crate::cache::{Cache, Session};
pub use crate::config::BuildConfig;
pub use crate::error::{BSPError, Result};
pub use crate::loader::{parse, parse_with_pacer, BSPMap, MapSummary};
pub use crate::meshes::{MeshBuffers, Surface};
pub use crate::packer::PageInfo;
pub use crate::pacing::{LogPacing, NoPacing, Pacer};
