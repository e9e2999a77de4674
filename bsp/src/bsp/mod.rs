pub mod consts;
pub mod displacement;
pub mod edges;
pub mod entities;
pub mod environment;
pub mod face;
pub mod gamelump;
pub mod header;
pub mod lightmap;
pub mod lump;
pub mod model;
pub mod overlay;
pub mod plane;
pub mod textures;
pub mod tree;
pub mod vert;
pub mod visibility;

#[cfg(test)]
pub mod test_util;

pub use consts::{GoldSrcLump, LumpType, MapFormat};
pub use lump::Lump;

// https://developer.valvesoftware.com/wiki/BSP_(Source)
// https://github.com/ValveSoftware/source-sdk-2013/blob/master/mp/src/public/bspfile.h
// https://developer.valvesoftware.com/wiki/BSP_(GoldSrc)
//
// A map is one flat buffer: a header with a fixed directory of (offset, length)
// pairs, each pointing at a "lump" of fixed size records. Faces reach their
// vertices through surfedges and edges, and their textures through texinfo.
// Source directories also carry a per-lump version and, for LZMA lumps, the
// uncompressed size. GoldSrc has 15 lumps and no versions.
//
// Everything here decodes records straight from the buffer; turning them into
// meshes happens in `crate::loader`.
