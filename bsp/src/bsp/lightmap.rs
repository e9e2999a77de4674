use glam::{vec3, Vec3};
use serde::Serialize;

use crate::{
    binaries::read_bytes,
    error::{BSPError, Result},
};

use super::{consts::MAX_MAP_LIGHTING, Lump};

/// Source lighting sample: RGB with a shared power of two exponent.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ColorRGBExp32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub exponent: i8,
}

impl ColorRGBExp32 {
    /// `channel * 2^exponent`, clamped to a byte.
    pub fn to_rgb8(&self) -> [u8; 3] {
        let scale = 2f32.powi(self.exponent.into());
        let c = |v: u8| (v as f32 * scale).round().clamp(0.0, 255.0) as u8;
        [c(self.r), c(self.g), c(self.b)]
    }
}

impl From<ColorRGBExp32> for Vec3 {
    fn from(value: ColorRGBExp32) -> Self {
        let scale = 2f32.powi(value.exponent.into()) / 255.0;
        vec3(
            value.r as f32 * scale,
            value.g as f32 * scale,
            value.b as f32 * scale,
        )
    }
}

impl Lump for ColorRGBExp32 {
    fn max() -> usize {
        MAX_MAP_LIGHTING / 4
    }
}

/// How a lighting lump stores one luxel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum LightingFormat {
    /// Three bytes per luxel.
    Rgb8,
    /// `ColorRGBExp32`, four bytes per luxel.
    RgbExp32,
}

impl LightingFormat {
    pub fn bytes_per_luxel(&self) -> usize {
        match self {
            LightingFormat::Rgb8 => 3,
            LightingFormat::RgbExp32 => 4,
        }
    }
}

/// Copy `maps` lightmaps of `luxels` samples each out of the lighting lump,
/// converted to RGB8.
pub fn face_samples(
    lighting: &[u8],
    light_ofs: i32,
    luxels: usize,
    maps: usize,
    format: LightingFormat,
) -> Result<Vec<u8>> {
    let offset = usize::try_from(light_ofs).map_err(|_| {
        BSPError::corrupt("Lighting", 0, 0, 0, "negative lightmap offset")
    })?;
    let len = luxels
        .checked_mul(maps)
        .and_then(|n| n.checked_mul(format.bytes_per_luxel()))
        .ok_or_else(|| BSPError::corrupt("Lighting", offset, 0, luxels, "lightmap too large"))?;
    let raw = read_bytes(lighting, offset, len, "Lighting")?;

    Ok(match format {
        LightingFormat::Rgb8 => raw.to_vec(),
        LightingFormat::RgbExp32 => raw
            .chunks_exact(4)
            .flat_map(|c| {
                ColorRGBExp32 {
                    r: c[0],
                    g: c[1],
                    b: c[2],
                    exponent: c[3] as i8,
                }
                .to_rgb8()
            })
            .collect(),
    })
}

#[cfg(test)]
mod lightmap_tests {
    use super::*;

    #[test]
    fn exponent_scales_channels() {
        let c = ColorRGBExp32 {
            r: 10,
            g: 100,
            b: 200,
            exponent: 1,
        };
        assert_eq!(c.to_rgb8(), [20, 200, 255]);

        let dark = ColorRGBExp32 {
            r: 64,
            g: 8,
            b: 0,
            exponent: -2,
        };
        assert_eq!(dark.to_rgb8(), [16, 2, 0]);

        let linear: Vec3 = dark.into();
        assert!((linear.x - 16.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn samples_are_bounds_checked() {
        let lighting = vec![7u8; 4 * 3];
        assert_eq!(
            face_samples(&lighting, 0, 4, 1, LightingFormat::Rgb8).unwrap().len(),
            12
        );
        assert!(matches!(
            face_samples(&lighting, 3, 4, 1, LightingFormat::Rgb8),
            Err(BSPError::CorruptData { .. })
        ));
        assert!(face_samples(&lighting, -1, 1, 1, LightingFormat::Rgb8).is_err());
        assert!(face_samples(&lighting, 0, usize::MAX, 4, LightingFormat::RgbExp32).is_err());
    }

    #[test]
    fn rgbexp_converts_per_luxel() {
        let lighting = [1u8, 2, 3, 2, 255, 255, 255, 0];
        let rgb = face_samples(&lighting, 0, 2, 1, LightingFormat::RgbExp32).unwrap();
        assert_eq!(rgb, vec![4, 8, 12, 255, 255, 255]);
    }
}
