pub mod atlas;
pub mod binaries;
pub mod bsp;
pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
pub mod meshes;
pub mod packer;
pub mod pacing;
pub mod prelude;

pub use loader::{parse, parse_with_pacer, BSPMap};
