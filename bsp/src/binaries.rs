use std::mem;

use crate::error::{BSPError, Result};

/// Plain data that can be read straight out of a map buffer.
///
/// Reads never index past the buffer: a short read is `CorruptData` naming the
/// lump and offset it happened at.
pub trait BinaryData
where
    Self: Sized,
{
    fn read_at(data: &[u8], offset: usize, lump: &str) -> Result<Self>;
}

impl<T: bytemuck::Pod> BinaryData for T {
    fn read_at(data: &[u8], offset: usize, lump: &str) -> Result<Self> {
        let bytes = read_bytes(data, offset, mem::size_of::<T>(), lump)?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }
}

/// Bounds checked `&data[offset..offset + len]`.
pub fn read_bytes<'a>(data: &'a [u8], offset: usize, len: usize, lump: &str) -> Result<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| {
            BSPError::corrupt(
                lump,
                offset,
                len,
                data.len().saturating_sub(offset),
                "read past end of data",
            )
        })
}

/// Reads a NUL terminated string of at most `max_len` bytes.
/// A string that runs into `max_len` or the end of data is cut there.
pub fn read_cstr(data: &[u8], offset: usize, max_len: usize, lump: &str) -> Result<String> {
    let available = data.len().saturating_sub(offset).min(max_len);
    let bytes = read_bytes(data, offset, available, lump)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// A forward-only cursor over a lump.
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
    lump: &'a str,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8], lump: &'a str) -> Self {
        Self { data, pos: 0, lump }
    }

    pub fn at(data: &'a [u8], pos: usize, lump: &'a str) -> Self {
        Self { data, pos, lump }
    }

    pub fn read<T: BinaryData>(&mut self) -> Result<T> {
        let value = T::read_at(self.data, self.pos, self.lump)?;
        self.pos += mem::size_of::<T>();
        Ok(value)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = read_bytes(self.data, self.pos, len, self.lump)?;
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }
}
