use glam::Vec3;
use serde::Serialize;

use super::{
    consts::{MAX_MAP_LEAFFACES, MAX_MAP_LEAFS, MAX_MAP_NODES},
    lightmap::ColorRGBExp32,
    Lump,
};

/// Source node, 32 bytes.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPNode {
    pub planenum: i32,
    /// negative numbers are -(leafs+1), not nodes
    pub children: [i32; 2],
    pub mins: [i16; 3], // for frustum culling
    pub maxs: [i16; 3],
    pub firstface: u16,
    pub numfaces: u16, // counting both sides
    pub area: i16,     // If all leaves below this node are in the same area, then this is the area index. If not, this is -1.
    pub padding: i16,
}

impl Lump for BSPNode {
    fn max() -> usize {
        MAX_MAP_NODES
    }
}

/// GoldSrc node, 24 bytes.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcNode {
    pub planenum: i32,
    pub children: [i16; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstface: u16,
    pub numfaces: u16,
}

impl Lump for GoldSrcNode {
    fn max() -> usize {
        MAX_MAP_NODES
    }
}

/// Source leaf, lump version 1 (32 bytes).
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPLeaf {
    pub contents: i32, // OR of all brushes (not needed?)
    pub cluster: i16,
    pub area_flags: i16, // area:9, flags:7
    pub mins: [i16; 3],  // for frustum culling
    pub maxs: [i16; 3],
    pub firstleafface: u16,
    pub numleaffaces: u16,
    pub firstleafbrush: u16,
    pub numleafbrushes: u16,
    pub leaf_water_data_id: i16, // -1 for not in water
    pub padding: i16,
}

impl Lump for BSPLeaf {
    fn max() -> usize {
        MAX_MAP_LEAFS
    }
}

/// Source leaf, lump version 0. Carries its ambient cube inline.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPLeafV0 {
    pub contents: i32,
    pub cluster: i16,
    pub area_flags: i16,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstleafface: u16,
    pub numleaffaces: u16,
    pub firstleafbrush: u16,
    pub numleafbrushes: u16,
    pub leaf_water_data_id: i16,
    pub ambient_lighting: [ColorRGBExp32; 6],
    pub padding: i16,
}

impl Lump for BSPLeafV0 {
    fn max() -> usize {
        MAX_MAP_LEAFS
    }
}

/// GoldSrc leaf, 28 bytes.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcLeaf {
    pub contents: i32,
    /// -1 = no visibility info
    pub visofs: i32,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstmarksurface: u16,
    pub nummarksurfaces: u16,
    pub ambient_level: [u8; 4],
}

impl Lump for GoldSrcLeaf {
    fn max() -> usize {
        MAX_MAP_LEAFS
    }
}

/// LEAFFACES / MARKSURFACES entry.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPLeafFace {
    pub face: u16,
}

impl Lump for BSPLeafFace {
    fn max() -> usize {
        MAX_MAP_LEAFFACES
    }
}

/// Node child, decoded once from the on-disk sign convention.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Child {
    Node(u32),
    Leaf(u32),
}

impl Child {
    /// Non-negative values are nodes, negative values are `-(leaf + 1)`.
    pub fn decode(raw: i32) -> Self {
        if raw >= 0 {
            Child::Node(raw as u32)
        } else {
            Child::Leaf((-(raw as i64) - 1) as u32)
        }
    }
}

fn extents(mins: [i16; 3], maxs: [i16; 3]) -> (Vec3, Vec3) {
    (
        Vec3::new(mins[0] as f32, mins[1] as f32, mins[2] as f32),
        Vec3::new(maxs[0] as f32, maxs[1] as f32, maxs[2] as f32),
    )
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Node {
    pub plane: u32,
    pub children: [Child; 2],
    pub mins: Vec3,
    pub maxs: Vec3,
    pub first_face: usize,
    pub num_faces: usize,
}

impl From<BSPNode> for Node {
    fn from(n: BSPNode) -> Self {
        let (children, mins, maxs) = (n.children, n.mins, n.maxs);
        let (mins, maxs) = extents(mins, maxs);
        Node {
            plane: n.planenum.max(0) as u32,
            children: [Child::decode(children[0]), Child::decode(children[1])],
            mins,
            maxs,
            first_face: n.firstface as usize,
            num_faces: n.numfaces as usize,
        }
    }
}

impl From<GoldSrcNode> for Node {
    fn from(n: GoldSrcNode) -> Self {
        let (children, mins, maxs) = (n.children, n.mins, n.maxs);
        let (mins, maxs) = extents(mins, maxs);
        Node {
            plane: n.planenum.max(0) as u32,
            children: [
                Child::decode(children[0] as i32),
                Child::decode(children[1] as i32),
            ],
            mins,
            maxs,
            first_face: n.firstface as usize,
            num_faces: n.numfaces as usize,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Leaf {
    pub contents: i32,
    /// -1 when the leaf is outside every cluster.
    pub cluster: i32,
    pub area: u16,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub first_leaf_face: usize,
    pub num_leaf_faces: usize,
    /// Index into the leaf water data, -1 for dry leaves.
    pub water_data: i16,
    /// GoldSrc ambient sound levels.
    pub ambient_level: Option<[u8; 4]>,
}

impl From<BSPLeaf> for Leaf {
    fn from(l: BSPLeaf) -> Self {
        let (mins, maxs) = extents(l.mins, l.maxs);
        Leaf {
            contents: l.contents,
            cluster: l.cluster as i32,
            area: (l.area_flags as u16) & 0x1ff,
            mins,
            maxs,
            first_leaf_face: l.firstleafface as usize,
            num_leaf_faces: l.numleaffaces as usize,
            water_data: l.leaf_water_data_id,
            ambient_level: None,
        }
    }
}

impl From<BSPLeafV0> for Leaf {
    fn from(l: BSPLeafV0) -> Self {
        let (mins, maxs) = extents(l.mins, l.maxs);
        Leaf {
            contents: l.contents,
            cluster: l.cluster as i32,
            area: (l.area_flags as u16) & 0x1ff,
            mins,
            maxs,
            first_leaf_face: l.firstleafface as usize,
            num_leaf_faces: l.numleaffaces as usize,
            water_data: l.leaf_water_data_id,
            ambient_level: None,
        }
    }
}

impl Leaf {
    /// GoldSrc has no clusters; every leaf but the shared solid leaf 0 is its own.
    pub fn from_goldsrc(index: usize, l: GoldSrcLeaf) -> Self {
        let (mins, maxs) = extents(l.mins, l.maxs);
        Leaf {
            contents: l.contents,
            cluster: index as i32 - 1,
            area: 0,
            mins,
            maxs,
            first_leaf_face: l.firstmarksurface as usize,
            num_leaf_faces: l.nummarksurfaces as usize,
            water_data: -1,
            ambient_level: Some(l.ambient_level),
        }
    }
}

#[cfg(test)]
mod tree_tests {
    use super::*;

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<BSPNode>(), 32);
        assert_eq!(std::mem::size_of::<GoldSrcNode>(), 24);
        assert_eq!(std::mem::size_of::<BSPLeaf>(), 32);
        assert_eq!(std::mem::size_of::<BSPLeafV0>(), 56);
        assert_eq!(std::mem::size_of::<GoldSrcLeaf>(), 28);
    }

    #[test]
    fn child_sign_convention() {
        assert_eq!(Child::decode(0), Child::Node(0));
        assert_eq!(Child::decode(12), Child::Node(12));
        assert_eq!(Child::decode(-1), Child::Leaf(0));
        assert_eq!(Child::decode(-5), Child::Leaf(4));
        assert_eq!(Child::decode(i32::MIN), Child::Leaf(i32::MAX as u32));
    }

    #[test]
    fn goldsrc_leaf_cluster_is_index_minus_one() {
        assert_eq!(Leaf::from_goldsrc(0, GoldSrcLeaf::default()).cluster, -1);
        assert_eq!(Leaf::from_goldsrc(3, GoldSrcLeaf::default()).cluster, 2);
    }
}
