use std::{borrow::Cow, fmt};

use num_traits::FromPrimitive;

use crate::{
    binaries::BinaryData,
    error::{BSPError, Result},
};

use super::{
    consts::{
        GoldSrcLump, LumpType, MapFormat, GOLDSRC_HEADER_LUMPS, GOLDSRC_VERSION, HEADER_LUMPS,
        VBSP_IDENT, VBSP_MAX_VERSION, VBSP_MIN_VERSION,
    },
    lump::{decode, BSPLump, GoldSrcLumpEntry, Lump, LumpId},
};

#[repr(C, packed)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPHeader {
    pub ident: [u8; 4],                 // BSP file identifier
    pub version: i32,                   // BSP file version
    pub lumps: [BSPLump; HEADER_LUMPS], // lump directory array
    pub map_revision: i32,              // the map's revision (iteration, version) number
}

impl fmt::Debug for BSPHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = self.version;
        let map_revision = self.map_revision;
        f.debug_struct("BSPHeader")
            .field("ident", &self.ident)
            .field("version", &version)
            .field("map_revision", &map_revision)
            .finish()
    }
}

/// GoldSrc maps have no ident, just the version and a shorter directory.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcHeader {
    pub version: i32,
    pub lumps: [GoldSrcLumpEntry; GOLDSRC_HEADER_LUMPS],
}

/// Validated lump directory over a borrowed map buffer.
pub struct LumpContainer<'a> {
    data: &'a [u8],
    format: MapFormat,
    version: i32,
    map_revision: i32,
    lumps: Vec<BSPLump>,
}

impl<'a> fmt::Debug for LumpContainer<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LumpContainer")
            .field("format", &self.format)
            .field("version", &self.version)
            .field("map_revision", &self.map_revision)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Work out which family a buffer belongs to from its first bytes.
pub fn sniff_format(data: &[u8]) -> Result<MapFormat> {
    if data.len() < 4 {
        return Err(BSPError::UnsupportedVersion(format!(
            "{} byte file is too short for a map header",
            data.len()
        )));
    }
    if data[0..4] == VBSP_IDENT {
        return Ok(MapFormat::Source);
    }
    // checked above
    let version = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if version == GOLDSRC_VERSION {
        return Ok(MapFormat::GoldSrc);
    }
    Err(BSPError::UnsupportedVersion(format!(
        "unknown ident {:02x?}",
        &data[0..4]
    )))
}

impl<'a> LumpContainer<'a> {
    /// Validate the header of either family and read its directory.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        match sniff_format(data)? {
            MapFormat::Source => Self::parse_source(data),
            MapFormat::GoldSrc => Self::parse_goldsrc(data),
        }
    }

    pub fn parse_source(data: &'a [u8]) -> Result<Self> {
        let header = BSPHeader::read_at(data, 0, "header")
            .map_err(|_| BSPError::UnsupportedVersion("truncated VBSP header".to_owned()))?;

        // This way around means little endian, PSBV is big endian
        if header.ident != VBSP_IDENT {
            return Err(BSPError::UnsupportedVersion(format!(
                "bad ident {:02x?}",
                header.ident
            )));
        }

        let version = header.version;
        if !(VBSP_MIN_VERSION..=VBSP_MAX_VERSION).contains(&version) {
            return Err(BSPError::UnsupportedVersion(format!(
                "VBSP version {} (supported {}..={})",
                version, VBSP_MIN_VERSION, VBSP_MAX_VERSION
            )));
        }

        log::debug!("{:?}", header);
        for (i, lump) in header.lumps.iter().enumerate() {
            if lump.file_len != 0 {
                log::debug!(
                    "{: <24} {:?}",
                    format!("{:?}:", LumpType::from_usize(i)),
                    lump
                );
            }
        }

        Ok(Self {
            data,
            format: MapFormat::Source,
            version,
            map_revision: header.map_revision,
            lumps: header.lumps.to_vec(),
        })
    }

    pub fn parse_goldsrc(data: &'a [u8]) -> Result<Self> {
        let header = GoldSrcHeader::read_at(data, 0, "header")
            .map_err(|_| BSPError::UnsupportedVersion("truncated GoldSrc header".to_owned()))?;

        let version = header.version;
        if version != GOLDSRC_VERSION {
            return Err(BSPError::UnsupportedVersion(format!(
                "GoldSrc version {} (supported {})",
                version, GOLDSRC_VERSION
            )));
        }

        let lumps: Vec<BSPLump> = header.lumps.iter().map(|&l| l.into()).collect();
        for (i, lump) in lumps.iter().enumerate() {
            let (ofs, len) = (lump.file_ofs, lump.file_len);
            log::debug!(
                "{: <14} Offset = 0x{:>08x} | Size = 0x{:>08x}",
                format!("{:?}:", GoldSrcLump::from_usize(i)),
                ofs,
                len
            );
        }

        Ok(Self {
            data,
            format: MapFormat::GoldSrc,
            version,
            map_revision: 0,
            lumps,
        })
    }

    pub fn format(&self) -> MapFormat {
        self.format
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn map_revision(&self) -> i32 {
        self.map_revision
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn entry(&self, id: impl Into<LumpId>) -> Result<&BSPLump> {
        let id = id.into();
        if id.format() != self.format {
            return Err(BSPError::corrupt(
                id,
                0,
                0,
                0,
                "lump id does not belong to this map format",
            ));
        }
        // every id of a format is below its directory length
        Ok(&self.lumps[id.index()])
    }

    /// Directory version of a lump (always 0 for GoldSrc).
    pub fn lump_version(&self, id: impl Into<LumpId>) -> Result<i32> {
        let entry = self.entry(id)?;
        Ok(entry.version)
    }

    /// The bytes of a lump, decompressed when the directory says so.
    pub fn get_lump(&self, id: impl Into<LumpId>) -> Result<Cow<'a, [u8]>> {
        let id = id.into();
        self.entry(id)?.read_bytes(id, self.data)
    }

    /// As `get_lump`, but a directory version other than `expected` is an error.
    pub fn get_lump_versioned(
        &self,
        id: impl Into<LumpId>,
        expected: i32,
    ) -> Result<Cow<'a, [u8]>> {
        let id = id.into();
        let actual = self.entry(id)?.version;
        if actual != expected {
            return Err(BSPError::LumpVersion {
                lump: id.to_string(),
                expected,
                actual,
            });
        }
        self.get_lump(id)
    }

    pub fn has_lump(&self, id: impl Into<LumpId>) -> bool {
        self.entry(id).map(|e| e.file_len > 0).unwrap_or(false)
    }

    /// Read a lump as an array of fixed size records.
    pub fn decode<T: Lump>(&self, id: impl Into<LumpId>) -> Result<Vec<T>> {
        let id = id.into();
        let bytes = self.get_lump(id)?;
        decode(id, &bytes)
    }
}
