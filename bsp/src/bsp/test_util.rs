//! In-memory map writer for tests.

use std::io::Cursor;

use super::consts::{
    GOLDSRC_HEADER_LUMPS, GOLDSRC_VERSION, HEADER_LUMPS, LZMA_IDENT, VBSP_IDENT,
};

struct Entry {
    bytes: Vec<u8>,
    version: i32,
    uncompressed_size: u32,
}

/// Lays lumps out back to back after the directory, in lump id order.
pub struct MapWriter {
    source_version: Option<i32>,
    lumps: Vec<Option<Entry>>,
}

impl MapWriter {
    pub fn goldsrc() -> Self {
        Self {
            source_version: None,
            lumps: (0..GOLDSRC_HEADER_LUMPS).map(|_| None).collect(),
        }
    }

    pub fn source(version: i32) -> Self {
        Self {
            source_version: Some(version),
            lumps: (0..HEADER_LUMPS).map(|_| None).collect(),
        }
    }

    pub fn lump(self, index: usize, bytes: Vec<u8>) -> Self {
        self.versioned_lump(index, bytes, 0)
    }

    pub fn versioned_lump(mut self, index: usize, bytes: Vec<u8>, version: i32) -> Self {
        self.lumps[index] = Some(Entry {
            bytes,
            version,
            uncompressed_size: 0,
        });
        self
    }

    pub fn compressed_lump(mut self, index: usize, bytes: Vec<u8>, uncompressed: usize) -> Self {
        self.lumps[index] = Some(Entry {
            bytes,
            version: 0,
            uncompressed_size: uncompressed as u32,
        });
        self
    }

    fn header_len(&self) -> usize {
        match self.source_version {
            Some(_) => 8 + HEADER_LUMPS * 16 + 4,
            None => 4 + GOLDSRC_HEADER_LUMPS * 8,
        }
    }

    pub fn build(self) -> Vec<u8> {
        let mut directory = Vec::new();
        let mut body = Vec::new();
        let mut offset = self.header_len();

        for entry in &self.lumps {
            let (ofs, len, version, size) = match entry {
                Some(e) => (offset, e.bytes.len(), e.version, e.uncompressed_size),
                None => (0, 0, 0, 0),
            };
            directory.extend_from_slice(&(ofs as i32).to_le_bytes());
            directory.extend_from_slice(&(len as i32).to_le_bytes());
            if self.source_version.is_some() {
                directory.extend_from_slice(&version.to_le_bytes());
                directory.extend_from_slice(&size.to_le_bytes());
            }
            if let Some(e) = entry {
                body.extend_from_slice(&e.bytes);
                offset += e.bytes.len();
            }
        }

        let mut out = Vec::with_capacity(offset);
        match self.source_version {
            Some(version) => {
                out.extend_from_slice(&VBSP_IDENT);
                out.extend_from_slice(&version.to_le_bytes());
                out.extend_from_slice(&directory);
                out.extend_from_slice(&1i32.to_le_bytes());
            }
            None => {
                out.extend_from_slice(&GOLDSRC_VERSION.to_le_bytes());
                out.extend_from_slice(&directory);
            }
        }
        out.extend_from_slice(&body);
        out
    }
}

pub fn pod_bytes<T: bytemuck::Pod>(items: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(items).to_vec()
}

/// Compress `payload` and wrap it the way Valve stores LZMA lumps.
pub fn lzma_lump(payload: &[u8]) -> Vec<u8> {
    let mut classic = Vec::new();
    let options = lzma_rs::compress::Options {
        unpacked_size: lzma_rs::compress::UnpackedSize::WriteToHeader(Some(payload.len() as u64)),
    };
    lzma_rs::lzma_compress_with_options(&mut Cursor::new(payload), &mut classic, &options)
        .unwrap();

    // classic: 5 property bytes, u64 size, stream
    let stream = &classic[13..];
    let mut out = Vec::new();
    out.extend_from_slice(&LZMA_IDENT);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&(stream.len() as u32).to_le_bytes());
    out.extend_from_slice(&classic[0..5]);
    out.extend_from_slice(stream);
    out
}
