use glam::Vec3;
use serde::Serialize;

use super::{consts::MAX_MAP_MODELS, Lump};

/// Source brush model, 48 bytes. Model 0 is the world.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

impl Lump for BSPModel {
    fn max() -> usize {
        MAX_MAP_MODELS
    }
}

/// GoldSrc brush model, 64 bytes, with one head node per hull.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: [i32; 4],
    pub visleafs: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

impl Lump for GoldSrcModel {
    fn max() -> usize {
        MAX_MAP_MODELS
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Model {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    /// Root of this model's render hull.
    pub head_node: i32,
    pub first_face: usize,
    pub num_faces: usize,
    /// Leaves with visibility rows, GoldSrc only.
    pub vis_leaves: usize,
}

impl From<BSPModel> for Model {
    fn from(m: BSPModel) -> Self {
        Model {
            mins: m.mins,
            maxs: m.maxs,
            origin: m.origin,
            head_node: m.headnode,
            first_face: m.firstface.max(0) as usize,
            num_faces: m.numfaces.max(0) as usize,
            vis_leaves: 0,
        }
    }
}

impl From<GoldSrcModel> for Model {
    fn from(m: GoldSrcModel) -> Self {
        let headnode = m.headnode;
        Model {
            mins: m.mins,
            maxs: m.maxs,
            origin: m.origin,
            head_node: headnode[0],
            first_face: m.firstface.max(0) as usize,
            num_faces: m.numfaces.max(0) as usize,
            vis_leaves: m.visleafs.max(0) as usize,
        }
    }
}

/// Which model each face belongs to. Faces no model claims stay with the world.
pub fn face_owners(models: &[Model], face_count: usize) -> Vec<usize> {
    let mut owners = vec![0; face_count];
    for (i, model) in models.iter().enumerate().skip(1) {
        let end = model
            .first_face
            .saturating_add(model.num_faces)
            .min(face_count);
        for owner in owners.iter_mut().take(end).skip(model.first_face) {
            *owner = i;
        }
    }
    owners
}

#[cfg(test)]
mod model_tests {
    use super::*;

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<BSPModel>(), 48);
        assert_eq!(std::mem::size_of::<GoldSrcModel>(), 64);
    }

    #[test]
    fn owners_follow_face_ranges() {
        let models = [
            Model {
                first_face: 0,
                num_faces: 3,
                ..Default::default()
            },
            Model {
                first_face: 3,
                num_faces: 2,
                ..Default::default()
            },
            Model {
                first_face: 5,
                num_faces: 10,
                ..Default::default()
            },
        ];
        assert_eq!(face_owners(&models, 7), vec![0, 0, 0, 1, 1, 2, 2]);
    }
}
