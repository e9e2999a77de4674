use flagset::flags;
use num_derive::FromPrimitive;
use serde::Serialize;

/// "VBSP", little endian.
pub const VBSP_IDENT: [u8; 4] = *b"VBSP";
pub const LZMA_IDENT: [u8; 4] = *b"LZMA";

pub const VBSP_MIN_VERSION: i32 = 19;
pub const VBSP_MAX_VERSION: i32 = 22;
pub const GOLDSRC_VERSION: i32 = 30;

pub const HEADER_LUMPS: usize = 64;
pub const GOLDSRC_HEADER_LUMPS: usize = 15;

// upper design bounds
pub const MIN_MAP_DISP_POWER: u32 = 2; // Minimum and maximum power a displacement can be.
pub const MAX_MAP_DISP_POWER: u32 = 4;

// Max # of neighboring displacement touching a displacement's corner.
pub const MAX_DISP_CORNER_NEIGHBORS: usize = 4;

pub const fn num_disp_power_verts(power: u32) -> usize {
    ((1 << power) + 1) * ((1 << power) + 1)
}
pub const fn num_disp_power_tris(power: u32) -> usize {
    (1 << power) * (1 << power) * 2
}

pub const MAX_MAP_MODELS: usize = 1024;
pub const MAX_MAP_TEXINFO: usize = 12288;
pub const MAX_MAP_TEXDATA: usize = 2048;
pub const MAX_MAP_DISPINFO: usize = 2048;
pub const MAX_MAP_DISP_VERTS: usize = MAX_MAP_DISPINFO * num_disp_power_verts(MAX_MAP_DISP_POWER);
// Planes come in pairs, thus an even number.
pub const MAX_MAP_PLANES: usize = 65536;
pub const MAX_MAP_NODES: usize = 65536;
pub const MAX_MAP_LEAFS: usize = 65536;
pub const MAX_MAP_VERTS: usize = 65536;
pub const MAX_MAP_FACES: usize = 65536;
pub const MAX_MAP_LEAFFACES: usize = 65536;
pub const MAX_MAP_CLUSTERS: usize = 65536;
pub const MAX_MAP_LEAFWATERDATA: usize = 32768;
pub const MAX_MAP_EDGES: usize = 256000;
pub const MAX_MAP_SURFEDGES: usize = 512000;
pub const MAX_MAP_LIGHTING: usize = 0x1000000;
pub const MAX_MAP_VISIBILITY: usize = 0x1000000; // increased BSPVERSION 7
pub const MAX_MAP_WORLDLIGHTS: usize = 8192;
pub const MAX_MAP_CUBEMAPSAMPLES: usize = 1024;
pub const MAX_MAP_OVERLAYS: usize = 512;
pub const MAX_MAP_TEXDATA_STRING_DATA: usize = 256000;
pub const MAX_MAP_TEXDATA_STRING_TABLE: usize = 65536;

pub const TEXTURE_NAME_LENGTH: usize = 128;
pub const MIPTEX_NAME_LENGTH: usize = 16;
pub const MIPLEVELS: usize = 4;
pub const MAX_LIGHTSTYLES: usize = 4;
/// Light style slot that is not in use.
pub const NO_LIGHT_STYLE: u8 = 255;

/// Luxels per world unit on GoldSrc faces.
pub const GOLDSRC_LUXEL_SIZE: f32 = 16.0;

// Displacements get the largest lightmaps; brush faces stop at 35.
pub const MAX_LIGHTMAP_DIM_INCLUDING_BORDER: u32 = 128;

/// Faces of an overlay, see `doverlay_t`.
pub const OVERLAY_BSP_FACE_COUNT: usize = 64;
pub const OVERLAY_NUM_RENDER_ORDERS: u16 = 4;
pub const OVERLAY_RENDER_ORDER_NUM_BITS: u16 = 2;

/// Lump ids of the Source engine directory.
///
/// Several slots were reused between engine branches; the names here follow
/// the 2013 SDK `bspfile.h`.
#[derive(Copy, Clone, FromPrimitive, Debug, PartialEq, Eq, Hash)]
pub enum LumpType {
    Entities = 0,
    Planes = 1,
    TexData = 2,
    Vertexes = 3,
    Visibility = 4,
    Nodes = 5,
    TexInfo = 6,
    Faces = 7,
    Lighting = 8,
    Occlusion = 9,
    Leafs = 10,
    FaceIds = 11,
    Edges = 12,
    SurfEdges = 13,
    Models = 14,
    WorldLights = 15,
    LeafFaces = 16,
    LeafBrushes = 17,
    Brushes = 18,
    BrushSides = 19,
    Areas = 20,
    AreaPortals = 21,
    PropCollision = 22,
    PropHulls = 23,
    PropHullVerts = 24,
    PropTris = 25,
    DispInfo = 26,
    OriginalFaces = 27,
    PhysDisp = 28,
    PhysCollide = 29,
    VertNormals = 30,
    VertNormalIndices = 31,
    DispLightmapAlphas = 32,
    DispVerts = 33,
    DispLightmapSamplePositions = 34,
    GameLump = 35,
    LeafWaterData = 36,
    Primitives = 37,
    PrimVerts = 38,
    PrimIndices = 39,
    PakFile = 40,
    ClipPortalVerts = 41,
    Cubemaps = 42,
    TexDataStringData = 43,
    TexDataStringTable = 44,
    Overlays = 45,
    LeafMinDistToWater = 46,
    FaceMacroTextureInfo = 47,
    DispTris = 48,
    PropBlob = 49,
    WaterOverlays = 50,
    LeafAmbientIndexHdr = 51,
    LeafAmbientIndex = 52,
    LightingHdr = 53,
    WorldLightsHdr = 54,
    LeafAmbientLightingHdr = 55,
    LeafAmbientLighting = 56,
    XZipPakFile = 57,
    FacesHdr = 58,
    MapFlags = 59,
    OverlayFades = 60,
    OverlaySystemLevels = 61,
    PhysLevel = 62,
    DispMultiBlend = 63,
}

/// Lump ids of the GoldSrc (version 30) directory.
#[derive(Copy, Clone, FromPrimitive, Debug, PartialEq, Eq, Hash)]
pub enum GoldSrcLump {
    Entities = 0,
    Planes = 1,
    Textures = 2,
    Vertexes = 3,
    Visibility = 4,
    Nodes = 5,
    TexInfo = 6,
    Faces = 7,
    Lighting = 8,
    ClipNodes = 9,
    Leafs = 10,
    MarkSurfaces = 11,
    Edges = 12,
    SurfEdges = 13,
    Models = 14,
}

/// Which of the two supported map families a buffer holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum MapFormat {
    GoldSrc,
    Source,
}

flags! {
    /// Texinfo surface flags (`SURF_*` in `bspflags.h`).
    pub enum SurfFlags: u32 {
        Light = 0x1,        // value will hold the light strength
        Sky2D = 0x2,        // don't draw, indicates we should skylight + draw 2d sky but not draw the 3D skybox
        Sky = 0x4,          // don't draw, but add to skybox
        Warp = 0x8,         // turbulent water warp
        Trans = 0x10,       // texture is translucent
        NoPortal = 0x20,    // the surface can not have a portal placed on it
        Trigger = 0x40,
        NoDraw = 0x80,      // don't bother referencing the texture
        Hint = 0x100,       // make a primary bsp splitter
        Skip = 0x200,       // completely ignore, allowing non-closed brushes
        NoLight = 0x400,    // Don't calculate light
        BumpLight = 0x800,  // calculate three lightmaps for the surface for bumpmapping
        NoShadows = 0x1000,
        NoDecals = 0x2000,
        NoChop = 0x4000,
        Hitbox = 0x8000,
    }
}

flags! {
    /// Leaf/brush contents.
    pub enum Contents: u32 {
        Solid = 0x1,           // an eye is never valid in a solid
        Window = 0x2,          // translucent, but not watery (glass)
        Aux = 0x4,
        Grate = 0x8,           // alpha-tested "grate" textures
        Slime = 0x10,
        Water = 0x20,
        Mist = 0x40,
        Opaque = 0x80,         // block AI line of sight
        TestFogVolume = 0x100,
        Team1 = 0x800,
        Team2 = 0x1000,
        IgnoreNodrawOpaque = 0x2000,
        Moveable = 0x4000,
        AreaPortal = 0x8000,
        PlayerClip = 0x10000,
        MonsterClip = 0x20000,
        Origin = 0x1000000,
        Monster = 0x2000000,
        Debris = 0x4000000,
        Detail = 0x8000000,
        Translucent = 0x10000000,
        Ladder = 0x20000000,
        Hitbox = 0x40000000,
    }
}

/// GoldSrc leaf contents are a plain enumeration, not a bitset.
pub const GOLDSRC_CONTENTS_EMPTY: i32 = -1;
pub const GOLDSRC_CONTENTS_SOLID: i32 = -2;
pub const GOLDSRC_CONTENTS_SKY: i32 = -6;

/// GoldSrc texinfo flag marking sky and liquid surfaces.
pub const GOLDSRC_TEX_SPECIAL: i32 = 1;

/// GoldSrc texture names that never produce geometry.
pub const GOLDSRC_NODRAW_TEXTURES: &[&str] = &[
    "sky",
    "aaatrigger",
    "clip",
    "null",
    "hint",
    "skip",
    "origin",
    "bevel",
];
