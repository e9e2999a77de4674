use std::borrow::Cow;

use glam::Vec3;
use serde::Serialize;

use crate::{
    binaries::{read_bytes, read_cstr, BinaryData, BinaryReader},
    error::{BSPError, Result},
};

use super::{
    consts::{LumpType, LZMA_IDENT},
    lump::{decompress_lzma, LumpId},
};

/// Id of the static prop game lump, "sprp" as stored on disk.
pub const STATIC_PROPS_ID: [u8; 4] = *b"prps";
const GAMELUMP_COMPRESSED: u16 = 0x1;
const PROP_NAME_LENGTH: usize = 128;

#[derive(Debug, Copy, Clone, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub struct BSPGameLump {
    pub id: [u8; 4],
    pub flags: u16,
    pub version: u16,
    /// Absolute file offset.
    pub fileofs: i32,
    pub filelen: i32,
}

impl BSPGameLump {
    /// The id as it reads in tools, e.g. "sprp".
    pub fn name(&self) -> String {
        let mut id = self.id;
        id.reverse();
        String::from_utf8_lossy(&id).into_owned()
    }
}

#[derive(Debug, Default, Clone)]
pub struct GameLumpDirectory {
    pub entries: Vec<BSPGameLump>,
}

impl GameLumpDirectory {
    pub fn parse(lump: &[u8]) -> Result<Self> {
        let name = LumpId::Source(LumpType::GameLump).to_string();
        let mut reader = BinaryReader::new(lump, &name);
        let count = reader.read::<i32>()?;
        if count < 0 || count as usize * 16 > reader.remaining() {
            return Err(BSPError::corrupt(
                &name,
                0,
                reader.remaining() / 16,
                count.unsigned_abs() as usize,
                "bad game lump count",
            ));
        }

        let entries = (0..count)
            .map(|_| reader.read::<BSPGameLump>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn find(&self, id: [u8; 4]) -> Option<&BSPGameLump> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Bytes of one game lump, decompressed if needed. `file` is the whole map.
    pub fn read<'a>(&self, entry: &BSPGameLump, file: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let (ofs, len, flags) = (entry.fileofs, entry.filelen, entry.flags);
        let name = format!("game lump {}", entry.name());
        let (Ok(ofs), Ok(len)) = (usize::try_from(ofs), usize::try_from(len)) else {
            return Err(BSPError::corrupt(
                name,
                ofs.max(0) as usize,
                0,
                len.unsigned_abs() as usize,
                "negative game lump offset or length",
            ));
        };
        let raw = read_bytes(file, ofs, len, &name)?;
        if flags & GAMELUMP_COMPRESSED != 0 && raw.starts_with(&LZMA_IDENT) {
            Ok(Cow::Owned(decompress_lzma(
                LumpId::Source(LumpType::GameLump),
                raw,
                None,
            )?))
        } else {
            Ok(Cow::Borrowed(raw))
        }
    }
}

/// Fields shared by every static prop version (the v4 layout).
#[derive(Debug, Copy, Clone, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub struct StaticPropLumpV4 {
    pub origin: Vec3,
    pub angles: Vec3,
    pub prop_type: u16,
    pub first_leaf: u16,
    pub leaf_count: u16,
    pub solid: u8,
    pub flags: u8,
    pub skin: i32,
    pub fade_min_dist: f32,
    pub fade_max_dist: f32,
    pub lighting_origin: Vec3,
}

fn prop_stride(version: u16) -> Option<usize> {
    Some(match version {
        4 => 56,
        5 => 60,
        6 => 64,
        7 | 8 => 68,
        9 => 72,
        10 => 76,
        11 => 80,
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticProp {
    pub model: String,
    pub origin: Vec3,
    pub angles: Vec3,
    pub first_leaf: u16,
    pub leaf_count: u16,
    pub solid: u8,
    pub flags: u8,
    pub skin: i32,
    pub fade_min_dist: f32,
    pub fade_max_dist: f32,
    pub lighting_origin: Vec3,
    pub forced_fade_scale: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StaticProps {
    pub version: u16,
    pub names: Vec<String>,
    pub leaves: Vec<u16>,
    pub props: Vec<StaticProp>,
}

fn read_count(reader: &mut BinaryReader, item_size: usize, name: &str) -> Result<usize> {
    let pos = reader.position();
    let count = reader.read::<i32>()?;
    match usize::try_from(count) {
        Ok(c) if c.saturating_mul(item_size) <= reader.remaining() => Ok(c),
        _ => Err(BSPError::corrupt(
            name,
            pos,
            reader.remaining() / item_size.max(1),
            count.unsigned_abs() as usize,
            "count runs past end of game lump",
        )),
    }
}

/// Decode the "sprp" game lump: model dictionary, leaf list, then the props.
pub fn parse_static_props(data: &[u8], version: u16) -> Result<StaticProps> {
    let name = "game lump sprp";
    let mut reader = BinaryReader::new(data, name);

    let dict = read_count(&mut reader, PROP_NAME_LENGTH, name)?;
    let mut names = Vec::with_capacity(dict);
    for _ in 0..dict {
        let pos = reader.position();
        names.push(read_cstr(data, pos, PROP_NAME_LENGTH, name)?.to_ascii_lowercase());
        reader.skip(PROP_NAME_LENGTH)?;
    }

    let leaf_count = read_count(&mut reader, 2, name)?;
    let leaves = (0..leaf_count)
        .map(|_| reader.read::<u16>())
        .collect::<Result<Vec<_>>>()?;

    let prop_count = read_count(&mut reader, 1, name)?;
    let base_size = std::mem::size_of::<StaticPropLumpV4>();
    let stride = match prop_stride(version) {
        Some(s) if s * prop_count <= reader.remaining() => s,
        // some branches pad their records; trust the lump size
        _ if prop_count > 0 && reader.remaining() / prop_count >= base_size => {
            reader.remaining() / prop_count
        }
        _ if prop_count == 0 => base_size,
        _ => {
            return Err(BSPError::corrupt(
                name,
                reader.position(),
                prop_count * base_size,
                reader.remaining(),
                "static props do not fit the lump",
            ))
        }
    };

    let mut props = Vec::with_capacity(prop_count);
    for _ in 0..prop_count {
        let start = reader.position();
        let record = reader.bytes(stride)?;
        let p: StaticPropLumpV4 = bytemuck::pod_read_unaligned(&record[..base_size]);
        let forced_fade_scale = if version >= 5 {
            f32::read_at(record, base_size, name)?
        } else {
            1.0
        };

        let prop_type = p.prop_type as usize;
        let model = names.get(prop_type).cloned().ok_or_else(|| {
            BSPError::corrupt(name, start, names.len(), prop_type, "prop model out of range")
        })?;

        props.push(StaticProp {
            model,
            origin: p.origin,
            angles: p.angles,
            first_leaf: p.first_leaf,
            leaf_count: p.leaf_count,
            solid: p.solid,
            flags: p.flags,
            skin: p.skin,
            fade_min_dist: p.fade_min_dist,
            fade_max_dist: p.fade_max_dist,
            lighting_origin: p.lighting_origin,
            forced_fade_scale,
        });
    }

    log::debug!(
        "Static props v{}: {} models, {} props",
        version,
        names.len(),
        props.len()
    );

    Ok(StaticProps {
        version,
        names,
        leaves,
        props,
    })
}
