use super::{
    consts::{MAX_LIGHTMAP_DIM_INCLUDING_BORDER, MAX_LIGHTSTYLES, MAX_MAP_FACES, NO_LIGHT_STYLE},
    Lump,
};

/// Source face (`dface_t`), 56 bytes.
///
/// The face array is limited to 65536 (`MAX_MAP_FACES`) entries. FACES and FACES_HDR share
/// this layout.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPFace {
    /// the plane number
    pub plane_num: u16,
    /// faces opposite to the node's plane direction
    pub side: u8,
    /// 1 of on node, 0 if in leaf
    pub on_node: u8,
    /// Index into the surfedge array; this and the following `num_edges` surfedges define the face.
    pub first_edge: i32,
    /// number of surfedges
    pub num_edges: i16,
    pub tex_info: i16,
    /// Index into the dispinfo array if the face is a displacement surface, otherwise -1.
    pub disp_info: i16,
    pub surface_fog_volume_id: i16,
    /// switchable lighting info
    pub styles: [u8; MAX_LIGHTSTYLES],
    /// offset into lightmap lump
    pub light_ofs: i32,
    /// face area in units^2
    pub area: f32,
    pub lightmap_texture_mins_in_luxels: [i32; 2],
    pub lightmap_texture_size_in_luxels: [i32; 2],
    /// Index of the original face which was split to produce this face.
    pub orig_face: i32,
    pub num_prims: u16,
    pub first_prim_id: u16,
    /// lightmap smoothing group
    pub smoothing_groups: u32,
}

impl Lump for BSPFace {
    fn max() -> usize {
        MAX_MAP_FACES
    }
}

impl BSPFace {
    pub fn is_displacement(&self) -> bool {
        self.disp_info >= 0
    }

    /// Luxels along each axis (the stored size is one less than the sample count).
    ///
    /// `None` for negative sizes or sizes past the engine's lightmap limit.
    pub fn lightmap_extent(&self) -> Option<(u32, u32)> {
        let size = self.lightmap_texture_size_in_luxels;
        let axis = |s: i32| {
            u32::try_from(s)
                .ok()
                .and_then(|s| s.checked_add(1))
                .filter(|&s| s <= MAX_LIGHTMAP_DIM_INCLUDING_BORDER)
        };
        Some((axis(size[0])?, axis(size[1])?))
    }
}

/// GoldSrc face, 20 bytes.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcFace {
    pub plane_num: u16,
    pub side: u16,
    pub first_edge: i32,
    pub num_edges: u16,
    pub tex_info: u16,
    pub styles: [u8; MAX_LIGHTSTYLES],
    pub light_ofs: i32,
}

impl Lump for GoldSrcFace {
    fn max() -> usize {
        MAX_MAP_FACES
    }
}

/// Number of light styles in use, counting up to the first unused slot.
pub fn style_count(styles: &[u8; MAX_LIGHTSTYLES]) -> usize {
    styles
        .iter()
        .take_while(|&&s| s != NO_LIGHT_STYLE)
        .count()
}

#[cfg(test)]
mod face_tests {
    use super::*;

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<BSPFace>(), 56);
        assert_eq!(std::mem::size_of::<GoldSrcFace>(), 20);
    }

    #[test]
    fn lightmap_extent_is_bounded() {
        let face = |size: [i32; 2]| BSPFace {
            lightmap_texture_size_in_luxels: size,
            ..Default::default()
        };
        assert_eq!(face([0, 0]).lightmap_extent(), Some((1, 1)));
        assert_eq!(face([15, 7]).lightmap_extent(), Some((16, 8)));
        assert_eq!(face([127, 127]).lightmap_extent(), Some((128, 128)));
        assert_eq!(face([128, 0]).lightmap_extent(), None);
        assert_eq!(face([i32::MAX, 1]).lightmap_extent(), None);
        assert_eq!(face([65535, 65535]).lightmap_extent(), None);
        assert_eq!(face([-1, 0]).lightmap_extent(), None);
    }

    #[test]
    fn styles_stop_at_unused_slot() {
        assert_eq!(style_count(&[0, 255, 255, 255]), 1);
        assert_eq!(style_count(&[0, 1, 2, 3]), 4);
        assert_eq!(style_count(&[255, 0, 0, 0]), 0);
    }
}
