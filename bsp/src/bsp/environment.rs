use glam::{IVec3, Vec3};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::Serialize;

use crate::error::{BSPError, Result};

use super::{
    consts::{
        LumpType, MAX_MAP_CUBEMAPSAMPLES, MAX_MAP_LEAFS, MAX_MAP_LEAFWATERDATA,
        MAX_MAP_WORLDLIGHTS,
    },
    lightmap::ColorRGBExp32,
    lump::{decode, LumpId},
    tree::Leaf,
    Lump,
};

/// `dworldlight_t` as written by lump version 0, 88 bytes.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPWorldLightV0 {
    pub origin: Vec3,
    pub intensity: Vec3,
    pub normal: Vec3,
    pub cluster: i32,
    pub emit_type: i32,
    pub style: i32,
    pub stopdot: f32,
    pub stopdot2: f32,
    pub exponent: f32,
    pub radius: f32,
    pub constant_attn: f32,
    pub linear_attn: f32,
    pub quadratic_attn: f32,
    pub flags: i32,
    pub texinfo: i32,
    pub owner: i32,
}

impl Lump for BSPWorldLightV0 {
    fn max() -> usize {
        MAX_MAP_WORLDLIGHTS
    }
}

/// Version 1 adds the shadow cast offset, 100 bytes.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPWorldLightV1 {
    pub origin: Vec3,
    pub intensity: Vec3,
    pub normal: Vec3,
    pub shadow_cast_offset: Vec3,
    pub cluster: i32,
    pub emit_type: i32,
    pub style: i32,
    pub stopdot: f32,
    pub stopdot2: f32,
    pub exponent: f32,
    pub radius: f32,
    pub constant_attn: f32,
    pub linear_attn: f32,
    pub quadratic_attn: f32,
    pub flags: i32,
    pub texinfo: i32,
    pub owner: i32,
}

impl Lump for BSPWorldLightV1 {
    fn max() -> usize {
        MAX_MAP_WORLDLIGHTS
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum EmitType {
    Surface = 0,
    Point = 1,
    Spotlight = 2,
    Skylight = 3,
    QuakeLight = 4,
    SkyAmbient = 5,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorldLight {
    pub origin: Vec3,
    pub intensity: Vec3,
    pub normal: Vec3,
    pub shadow_cast_offset: Vec3,
    pub cluster: i32,
    /// `None` for emit types this decoder does not know.
    pub emit_type: Option<EmitType>,
    pub style: i32,
    pub stopdot: f32,
    pub stopdot2: f32,
    pub exponent: f32,
    pub radius: f32,
    /// Constant, linear and quadratic attenuation.
    pub attenuation: Vec3,
    pub flags: i32,
    pub texinfo: i32,
    pub owner: i32,
}

impl From<BSPWorldLightV1> for WorldLight {
    fn from(l: BSPWorldLightV1) -> Self {
        WorldLight {
            origin: l.origin,
            intensity: l.intensity,
            normal: l.normal,
            shadow_cast_offset: l.shadow_cast_offset,
            cluster: l.cluster,
            emit_type: EmitType::from_i32(l.emit_type),
            style: l.style,
            stopdot: l.stopdot,
            stopdot2: l.stopdot2,
            exponent: l.exponent,
            radius: l.radius,
            attenuation: Vec3::new(l.constant_attn, l.linear_attn, l.quadratic_attn),
            flags: l.flags,
            texinfo: l.texinfo,
            owner: l.owner,
        }
    }
}

impl From<BSPWorldLightV0> for WorldLight {
    fn from(l: BSPWorldLightV0) -> Self {
        BSPWorldLightV1 {
            origin: l.origin,
            intensity: l.intensity,
            normal: l.normal,
            shadow_cast_offset: Vec3::ZERO,
            cluster: l.cluster,
            emit_type: l.emit_type,
            style: l.style,
            stopdot: l.stopdot,
            stopdot2: l.stopdot2,
            exponent: l.exponent,
            radius: l.radius,
            constant_attn: l.constant_attn,
            linear_attn: l.linear_attn,
            quadratic_attn: l.quadratic_attn,
            flags: l.flags,
            texinfo: l.texinfo,
            owner: l.owner,
        }
        .into()
    }
}

/// Decode a world light lump of either record version.
pub fn parse_world_lights(id: LumpType, bytes: &[u8], version: i32) -> Result<Vec<WorldLight>> {
    let id = LumpId::Source(id);
    match version {
        0 => Ok(decode::<BSPWorldLightV0>(id, bytes)?
            .into_iter()
            .map(WorldLight::from)
            .collect()),
        1 => Ok(decode::<BSPWorldLightV1>(id, bytes)?
            .into_iter()
            .map(WorldLight::from)
            .collect()),
        v => Err(BSPError::LumpVersion {
            lump: id.to_string(),
            expected: 1,
            actual: v,
        }),
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPCubemapSample {
    pub origin: [i32; 3],
    /// 0 means the default size.
    pub size: i32,
}

impl Lump for BSPCubemapSample {
    fn max() -> usize {
        MAX_MAP_CUBEMAPSAMPLES
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Cubemap {
    pub origin: IVec3,
    pub size: i32,
}

impl From<BSPCubemapSample> for Cubemap {
    fn from(c: BSPCubemapSample) -> Self {
        let origin = c.origin;
        Cubemap {
            origin: IVec3::from_array(origin),
            size: c.size,
        }
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPLeafWaterData {
    pub surface_z: f32,
    pub min_z: f32,
    pub surface_tex_info: i16,
    pub padding: i16,
}

impl Lump for BSPLeafWaterData {
    fn max() -> usize {
        MAX_MAP_LEAFWATERDATA
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct LeafWater {
    pub surface_z: f32,
    pub min_z: f32,
    pub surface_tex_info: i16,
}

impl From<BSPLeafWaterData> for LeafWater {
    fn from(w: BSPLeafWaterData) -> Self {
        LeafWater {
            surface_z: w.surface_z,
            min_z: w.min_z,
            surface_tex_info: w.surface_tex_info,
        }
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPLeafAmbientIndex {
    pub ambient_sample_count: u16,
    pub first_ambient_sample: u16,
}

impl Lump for BSPLeafAmbientIndex {
    fn max() -> usize {
        MAX_MAP_LEAFS
    }
}

/// One ambient cube with its position inside the leaf, in 1/255ths of the leaf bounds.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPLeafAmbientLighting {
    pub cube: [ColorRGBExp32; 6],
    pub x: u8,
    pub y: u8,
    pub z: u8,
    pub pad: u8,
}

impl Lump for BSPLeafAmbientLighting {
    fn max() -> usize {
        MAX_MAP_LEAFS * 16
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AmbientSample {
    pub position: Vec3,
    /// +x, -x, +y, -y, +z, -z.
    pub cube: [Vec3; 6],
}

/// Resolve ambient samples per leaf into world space.
pub fn leaf_ambient(
    index: &[BSPLeafAmbientIndex],
    lighting: &[BSPLeafAmbientLighting],
    leaves: &[Leaf],
) -> Result<Vec<Vec<AmbientSample>>> {
    index
        .iter()
        .zip(leaves)
        .enumerate()
        .map(|(leaf_index, (entry, leaf))| {
            let first = entry.first_ambient_sample as usize;
            let count = entry.ambient_sample_count as usize;
            let samples = lighting.get(first..first + count).ok_or_else(|| {
                BSPError::corrupt(
                    LumpId::Source(LumpType::LeafAmbientIndex),
                    leaf_index * 4,
                    lighting.len(),
                    first + count,
                    "ambient samples out of range",
                )
            })?;
            let extent = leaf.maxs - leaf.mins;
            Ok(samples
                .iter()
                .map(|s| {
                    let cube = s.cube;
                    let offset = Vec3::new(s.x as f32, s.y as f32, s.z as f32) / 255.0;
                    AmbientSample {
                        position: leaf.mins + extent * offset,
                        cube: cube.map(Vec3::from),
                    }
                })
                .collect())
        })
        .collect()
}
