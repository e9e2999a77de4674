use flagset::FlagSet;
use glam::{Vec2, Vec3};
use serde::Serialize;

use crate::{
    binaries::{read_bytes, read_cstr, BinaryReader},
    error::{BSPError, Result},
};

use super::{
    consts::{
        SurfFlags, GOLDSRC_NODRAW_TEXTURES, MAX_MAP_TEXDATA, MAX_MAP_TEXDATA_STRING_TABLE,
        MAX_MAP_TEXINFO, MIPLEVELS, MIPTEX_NAME_LENGTH, TEXTURE_NAME_LENGTH,
    },
    Lump,
};

// Texinfo
//
// The 2D coordinates (u, v) of a texel are mapped to the world coordinates (x, y, z) of a point on a face by:
//
// u = tv0,0 * x + tv0,1 * y + tv0,2 * z + tv0,3
//
// v = tv1,0 * x + tv1,1 * y + tv1,2 * z + tv1,3
//
// (ie. The dot product of the vectors with the vertex plus the offset in that direction. Where tvA,B is textureVecs[A][B].)
//
// The lightmapVecs float array performs a similar mapping of the lightmap samples of the texture onto the world,
// and then subtracts LightmapTextureMinsInLuxels from the face.

/// Source texinfo, 72 bytes.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPTexInfo {
    /// [s/t][xyz offset]
    pub texture_vecs: [[f32; 4]; 2],
    /// [s/t][xyz offset] - length is in units of texels/area
    pub lightmap_vecs: [[f32; 4]; 2],
    /// miptex flags overrides
    pub flags: i32,
    /// Pointer to texture name, size, etc.
    pub tex_data: i32,
}

impl Lump for BSPTexInfo {
    fn max() -> usize {
        MAX_MAP_TEXINFO
    }
}

impl BSPTexInfo {
    pub fn flags(&self) -> FlagSet<SurfFlags> {
        FlagSet::new_truncated(self.flags as u32)
    }
}

/// GoldSrc texinfo, 40 bytes. The texture vectors double as lightmap vectors.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcTexInfo {
    pub vecs: [[f32; 4]; 2],
    pub miptex: i32,
    pub flags: i32,
}

impl Lump for GoldSrcTexInfo {
    fn max() -> usize {
        MAX_MAP_TEXINFO
    }
}

/// Texdata, 32 bytes. Names come from the string table/data pair.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPTexData {
    pub reflectivity: Vec3,        // RGB reflectivity
    pub name_string_table_id: i32, // index into TexdataStringTable
    pub width: i32,
    pub height: i32, // source image
    pub view_width: i32,
    pub view_height: i32,
}

impl Lump for BSPTexData {
    fn max() -> usize {
        MAX_MAP_TEXDATA
    }
}

/// Offsets into TexdataStringData.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPTexDataStringTable {
    pub index: i32,
}

impl Lump for BSPTexDataStringTable {
    fn max() -> usize {
        MAX_MAP_TEXDATA_STRING_TABLE
    }
}

impl BSPTexData {
    /// Lower-cased material name of this texdata.
    pub fn name(&self, table: &[BSPTexDataStringTable], string_data: &[u8]) -> Result<String> {
        let id = self.name_string_table_id;
        let entry = usize::try_from(id)
            .ok()
            .and_then(|i| table.get(i))
            .ok_or_else(|| {
                BSPError::corrupt(
                    "TexDataStringTable",
                    id.max(0) as usize,
                    table.len(),
                    id.max(0) as usize,
                    "texdata name id out of range",
                )
            })?;
        let offset = entry.index;
        if offset < 0 || offset as usize >= string_data.len() {
            return Err(BSPError::corrupt(
                "TexDataStringData",
                offset.max(0) as usize,
                string_data.len(),
                offset.max(0) as usize,
                "texdata name offset out of range",
            ));
        }
        let mut name = read_cstr(
            string_data,
            offset as usize,
            TEXTURE_NAME_LENGTH,
            "TexDataStringData",
        )?;
        name.make_ascii_lowercase();
        Ok(name)
    }

    pub fn size(&self) -> Vec2 {
        let (w, h) = (self.width, self.height);
        Vec2::new(w as f32, h as f32)
    }
}

/// A texture as the mesh builder and renderer see it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Embedded mip 0 expanded through the palette, when the map carries pixels.
    #[serde(skip)]
    pub rgba: Option<Vec<u8>>,
}

impl Texture {
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    /// GoldSrc tool textures that never produce geometry.
    pub fn is_goldsrc_nodraw(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        GOLDSRC_NODRAW_TEXTURES.contains(&name.as_str())
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MipTexHeader {
    name: [u8; MIPTEX_NAME_LENGTH],
    width: u32,
    height: u32,
    offsets: [u32; MIPLEVELS],
}

const MIPTEX_HEADER_SIZE: usize = std::mem::size_of::<MipTexHeader>();
const PALETTE_COLORS: usize = 256;

/// Decode the GoldSrc TEXTURES lump.
///
/// A bad directory fails the whole lump. A bad entry becomes an unnamed placeholder
/// plus a `CorruptData` in the returned list, so texture indices stay stable.
pub fn parse_miptex_lump(lump: &[u8]) -> Result<(Vec<Texture>, Vec<BSPError>)> {
    if lump.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let mut reader = BinaryReader::new(lump, "Textures");
    let count: i32 = reader.read()?;
    if count < 0 {
        return Err(BSPError::corrupt(
            "Textures",
            0,
            0,
            count.unsigned_abs() as usize,
            "negative texture count",
        ));
    }

    let mut offsets = Vec::with_capacity((count as usize).min(lump.len() / 4));
    for _ in 0..count {
        offsets.push(reader.read::<i32>()?);
    }

    let mut textures = Vec::with_capacity(offsets.len());
    let mut errors = Vec::new();
    for (i, &ofs) in offsets.iter().enumerate() {
        if ofs == -1 {
            textures.push(Texture::default());
            continue;
        }
        match parse_miptex(lump, ofs) {
            Ok(texture) => {
                log::debug!(
                    "Texture {:>3}: {} {}x{}{}",
                    i,
                    texture.name,
                    texture.width,
                    texture.height,
                    if texture.rgba.is_some() { " (embedded)" } else { "" }
                );
                textures.push(texture);
            }
            Err(e) => {
                log::warn!("Texture {}: {}", i, e);
                errors.push(e);
                textures.push(Texture::default());
            }
        }
    }
    Ok((textures, errors))
}

fn parse_miptex(lump: &[u8], ofs: i32) -> Result<Texture> {
    let ofs = usize::try_from(ofs).map_err(|_| {
        BSPError::corrupt("Textures", 0, 0, 0, "negative miptex offset")
    })?;
    let header: MipTexHeader = BinaryReader::at(lump, ofs, "Textures").read()?;
    let name_len = header
        .name
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(MIPTEX_NAME_LENGTH);
    let name = String::from_utf8_lossy(&header.name[..name_len]).into_owned();
    let (width, height, mips) = (header.width, header.height, header.offsets);

    if width == 0 || height == 0 || width > 4096 || height > 4096 {
        return Err(BSPError::corrupt(
            "Textures",
            ofs + MIPTEX_NAME_LENGTH,
            4096,
            width.max(height) as usize,
            "miptex dimensions out of range",
        ));
    }

    // pixels live in an external WAD
    if mips[0] == 0 {
        return Ok(Texture {
            name,
            width,
            height,
            rgba: None,
        });
    }

    let (w, h) = (width as usize, height as usize);
    let indices = read_bytes(lump, ofs + mips[0] as usize, w * h, "Textures")?;

    let last_mip = (w / 8) * (h / 8);
    let palette_ofs = ofs + mips[MIPLEVELS - 1] as usize + last_mip;
    let mut reader = BinaryReader::at(lump, palette_ofs, "Textures");
    let colors: u16 = reader.read()?;
    if colors as usize != PALETTE_COLORS {
        return Err(BSPError::corrupt(
            "Textures",
            palette_ofs,
            PALETTE_COLORS,
            colors as usize,
            "unexpected palette size",
        ));
    }
    let palette = reader.bytes(PALETTE_COLORS * 3)?;

    let transparent = name.starts_with('{');
    let mut rgba = Vec::with_capacity(w * h * 4);
    for &index in indices {
        if transparent && index == 255 {
            rgba.extend_from_slice(&[0, 0, 0, 0]);
        } else {
            let c = &palette[index as usize * 3..index as usize * 3 + 3];
            rgba.extend_from_slice(&[c[0], c[1], c[2], 255]);
        }
    }

    Ok(Texture {
        name,
        width,
        height,
        rgba: Some(rgba),
    })
}

#[cfg(test)]
pub(crate) mod textures_tests {
    use super::*;

    /// A miptex lump holding `names`, each a 16x16 texture. Embedded ones use a
    /// palette where index i maps to (i, i, i).
    pub fn miptex_lump(names: &[(&str, bool)]) -> Vec<u8> {
        let mut body = Vec::new();
        let mut offsets = Vec::new();
        let header_len = 4 + 4 * names.len();
        for (name, embedded) in names {
            offsets.push((header_len + body.len()) as i32);
            let mut raw_name = [0u8; MIPTEX_NAME_LENGTH];
            raw_name[..name.len()].copy_from_slice(name.as_bytes());
            body.extend_from_slice(&raw_name);
            body.extend_from_slice(&16u32.to_le_bytes());
            body.extend_from_slice(&16u32.to_le_bytes());
            if *embedded {
                let m0 = MIPTEX_HEADER_SIZE as u32;
                let mips = [m0, m0 + 256, m0 + 256 + 64, m0 + 256 + 64 + 16];
                for m in mips {
                    body.extend_from_slice(&m.to_le_bytes());
                }
                body.extend((0..256u32).map(|i| i as u8));
                body.extend(std::iter::repeat(0).take(64 + 16 + 4));
                body.extend_from_slice(&256u16.to_le_bytes());
                body.extend((0..256u32).flat_map(|i| [i as u8; 3]));
                body.extend_from_slice(&[0, 0]);
            } else {
                body.extend_from_slice(&[0u8; 16]);
            }
        }
        let mut lump = Vec::new();
        lump.extend_from_slice(&(names.len() as i32).to_le_bytes());
        for o in offsets {
            lump.extend_from_slice(&o.to_le_bytes());
        }
        lump.extend_from_slice(&body);
        lump
    }

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<BSPTexInfo>(), 72);
        assert_eq!(std::mem::size_of::<GoldSrcTexInfo>(), 40);
        assert_eq!(std::mem::size_of::<BSPTexData>(), 32);
        assert_eq!(MIPTEX_HEADER_SIZE, 40);
    }

    #[test]
    fn external_miptex_has_no_pixels() {
        let (textures, errors) = parse_miptex_lump(&miptex_lump(&[("test", false)])).unwrap();
        assert!(errors.is_empty());
        assert_eq!(textures.len(), 1);
        assert_eq!(textures[0].name, "test");
        assert_eq!((textures[0].width, textures[0].height), (16, 16));
        assert!(textures[0].rgba.is_none());
    }

    #[test]
    fn embedded_miptex_goes_through_palette() {
        let (textures, _) =
            parse_miptex_lump(&miptex_lump(&[("brick", true), ("{fence", true)])).unwrap();
        let brick = textures[0].rgba.as_ref().unwrap();
        assert_eq!(brick.len(), 16 * 16 * 4);
        assert_eq!(&brick[7 * 4..8 * 4], &[7, 7, 7, 255]);
        assert_eq!(&brick[255 * 4..256 * 4], &[255, 255, 255, 255]);

        let fence = textures[1].rgba.as_ref().unwrap();
        assert_eq!(&fence[255 * 4..256 * 4], &[0, 0, 0, 0]);
    }

    #[test]
    fn bad_palette_only_breaks_one_texture() {
        let mut lump = miptex_lump(&[("ok", false), ("broken", true)]);
        // palette count sits after mip 3 of the second texture
        let second = i32::from_le_bytes([lump[8], lump[9], lump[10], lump[11]]) as usize;
        let count_at = second + MIPTEX_HEADER_SIZE + 256 + 64 + 16 + 4;
        lump[count_at] = 17;
        lump[count_at + 1] = 0;

        let (textures, errors) = parse_miptex_lump(&lump).unwrap();
        assert_eq!(textures.len(), 2);
        assert_eq!(textures[0].name, "ok");
        assert_eq!(textures[1], Texture::default());
        assert!(matches!(
            errors[..],
            [BSPError::CorruptData {
                reason: "unexpected palette size",
                ..
            }]
        ));
    }

    #[test]
    fn missing_slot_keeps_indices() {
        let mut lump = miptex_lump(&[("a", false), ("b", false)]);
        lump[4..8].copy_from_slice(&(-1i32).to_le_bytes());
        let (textures, errors) = parse_miptex_lump(&lump).unwrap();
        assert!(errors.is_empty());
        assert_eq!(textures[0].name, "");
        assert_eq!(textures[1].name, "b");
    }

    #[test]
    fn truncated_directory_fails_lump() {
        assert!(parse_miptex_lump(&[2, 0, 0, 0, 4, 0]).is_err());
    }

    #[test]
    fn texdata_names_are_lowercased() {
        let data = b"Tools/ToolsNodraw\0BRICK/wall01\0";
        let table = [
            BSPTexDataStringTable { index: 0 },
            BSPTexDataStringTable { index: 18 },
        ];
        let texdata = BSPTexData {
            name_string_table_id: 1,
            ..Default::default()
        };
        assert_eq!(texdata.name(&table, data).unwrap(), "brick/wall01");

        let bad = BSPTexData {
            name_string_table_id: 5,
            ..Default::default()
        };
        assert!(bad.name(&table, data).is_err());
    }
}
