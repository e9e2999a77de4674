use std::{
    borrow::Cow,
    fmt,
    io::{self, Cursor},
    mem,
};

use crate::error::{BSPError, Result};

use super::consts::{GoldSrcLump, LumpType, LZMA_IDENT, MapFormat};

/// A fixed size record stored as an array inside one lump.
pub trait Lump
where
    Self: Sized + bytemuck::Pod,
{
    /// Largest element count the engine accepts.
    fn max() -> usize;
}

/// A lump id of either map family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LumpId {
    Source(LumpType),
    GoldSrc(GoldSrcLump),
}

impl LumpId {
    pub fn index(&self) -> usize {
        match self {
            LumpId::Source(l) => *l as usize,
            LumpId::GoldSrc(l) => *l as usize,
        }
    }

    pub fn format(&self) -> MapFormat {
        match self {
            LumpId::Source(_) => MapFormat::Source,
            LumpId::GoldSrc(_) => MapFormat::GoldSrc,
        }
    }
}

impl From<LumpType> for LumpId {
    fn from(value: LumpType) -> Self {
        LumpId::Source(value)
    }
}

impl From<GoldSrcLump> for LumpId {
    fn from(value: GoldSrcLump) -> Self {
        LumpId::GoldSrc(value)
    }
}

impl fmt::Display for LumpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LumpId::Source(l) => write!(f, "{:?}", l),
            LumpId::GoldSrc(l) => write!(f, "{:?}", l),
        }
    }
}

// https://developer.valvesoftware.com/wiki/BSP_(Source)
#[repr(C, packed)]
#[derive(Debug, Default, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPLump {
    pub file_ofs: i32, // offset into file (bytes)
    pub file_len: i32, // length of lump (bytes)
    pub version: i32,  // lump format version
    /// Uncompressed size of the lump, zero when the lump is stored as is.
    /// (Named `fourCC` in the SDK, which never used it as an ident.)
    pub uncompressed_size: u32,
}

/// Directory entry of a GoldSrc map.
#[repr(C, packed)]
#[derive(Debug, Default, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcLumpEntry {
    pub file_ofs: i32,
    pub file_len: i32,
}

impl From<GoldSrcLumpEntry> for BSPLump {
    fn from(value: GoldSrcLumpEntry) -> Self {
        BSPLump {
            file_ofs: value.file_ofs,
            file_len: value.file_len,
            version: 0,
            uncompressed_size: 0,
        }
    }
}

impl BSPLump {
    pub fn is_compressed(&self) -> bool {
        self.uncompressed_size != 0
    }

    /// Validated byte range of this lump inside a buffer of `data_len` bytes.
    pub fn range(&self, id: LumpId, data_len: usize) -> Result<std::ops::Range<usize>> {
        let (ofs, len) = (self.file_ofs, self.file_len);
        if ofs < 0 || len < 0 {
            return Err(BSPError::corrupt(
                id,
                ofs.max(0) as usize,
                0,
                len.unsigned_abs() as usize,
                "negative lump offset or length",
            ));
        }
        let (ofs, len) = (ofs as usize, len as usize);
        match ofs.checked_add(len) {
            Some(end) if end <= data_len => Ok(ofs..end),
            _ => Err(BSPError::corrupt(
                id,
                ofs,
                len,
                data_len.saturating_sub(ofs),
                "lump extends past end of file",
            )),
        }
    }

    /// Slice out this lump, decompressing it if needed.
    pub fn read_bytes<'a>(&self, id: LumpId, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let raw = &data[self.range(id, data.len())?];

        if !self.is_compressed() {
            return Ok(Cow::Borrowed(raw));
        }

        let bytes = decompress_lzma(id, raw, Some(self.uncompressed_size as usize))?;
        if bytes.len() != self.uncompressed_size as usize {
            return Err(BSPError::corrupt(
                id,
                self.file_ofs as usize,
                self.uncompressed_size as usize,
                bytes.len(),
                "decompressed lump size does not match directory",
            ));
        }
        Ok(Cow::Owned(bytes))
    }
}

/// Valve's LZMA lump header, followed by the raw LZMA stream.
#[repr(C, packed)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LzmaHeader {
    pub id: [u8; 4],
    pub actual_size: u32, // always little endian
    pub lzma_size: u32,   // always little endian
    pub properties: [u8; 5],
}

/// Decompress a Valve LZMA lump.
///
/// Valve strips the classic 13 byte `.lzma` header down to the property bytes,
/// so it is rebuilt here (properties, then the 64 bit unpacked size) before
/// handing the stream to the decoder.
///
/// `expected` is the size the directory promises; the header must agree with it
/// before anything is allocated.
pub fn decompress_lzma(id: LumpId, raw: &[u8], expected: Option<usize>) -> Result<Vec<u8>> {
    let header_len = mem::size_of::<LzmaHeader>();
    let header: LzmaHeader = crate::binaries::BinaryData::read_at(raw, 0, &id.to_string())?;

    if header.id != LZMA_IDENT {
        return Err(BSPError::Decompression {
            lump: id.to_string(),
            reason: format!("bad ident {:?}", header.id),
        });
    }

    let lzma_size = header.lzma_size as usize;
    let actual_size = header.actual_size;
    if let Some(expected) = expected {
        if actual_size as usize != expected {
            return Err(BSPError::corrupt(
                id,
                0,
                expected,
                actual_size as usize,
                "LZMA header size does not match directory",
            ));
        }
    }
    let stream = crate::binaries::read_bytes(raw, header_len, lzma_size, &id.to_string())?;

    let mut classic = Vec::with_capacity(13 + stream.len());
    classic.extend_from_slice(&header.properties);
    classic.extend_from_slice(&(actual_size as u64).to_le_bytes());
    classic.extend_from_slice(stream);

    // unchecked sizes only get what the stream could plausibly expand to
    let capacity = match expected {
        Some(_) => actual_size as usize,
        None => (actual_size as usize).min(stream.len().saturating_mul(16)),
    };
    let mut out = Vec::with_capacity(capacity);
    lzma_rs::lzma_decompress(&mut io::BufReader::new(Cursor::new(classic)), &mut out).map_err(
        |e| BSPError::Decompression {
            lump: id.to_string(),
            reason: format!("{:?}", e),
        },
    )?;
    if out.len() != actual_size as usize {
        return Err(BSPError::corrupt(
            id,
            0,
            actual_size as usize,
            out.len(),
            "decompressed size does not match LZMA header",
        ));
    }

    log::debug!(
        "Decompressed {} lump: {} -> {} bytes",
        id,
        lzma_size,
        out.len()
    );
    Ok(out)
}

/// Reinterpret a lump as an array of `T`.
pub fn decode<T: Lump>(id: LumpId, bytes: &[u8]) -> Result<Vec<T>> {
    let item_size = mem::size_of::<T>();

    if bytes.len() % item_size != 0 {
        return Err(BSPError::corrupt(
            id,
            0,
            item_size,
            bytes.len() % item_size,
            "lump size is not a multiple of its element size",
        ));
    }

    let len = bytes.len() / item_size;
    if len > T::max() {
        return Err(BSPError::corrupt(
            id,
            0,
            T::max(),
            len,
            "too many elements in lump",
        ));
    }

    if len == 0 {
        return Ok(Vec::new());
    }

    Ok(bytemuck::pod_collect_to_vec(bytes))
}
