use thiserror::Error;

/// Everything that can go wrong while decoding a map.
///
/// `UnsupportedVersion`, `Config` and `PackingFailure` abort a parse. The rest
/// abort only the lump they were found in; the loaders record those in
/// `BSPMap::diagnostics` and keep going.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BSPError {
    #[error("unsupported map: {0}")]
    UnsupportedVersion(String),
    #[error("corrupt {lump} lump at byte {offset}: {reason} (expected {expected}, found {actual})")]
    CorruptData {
        lump: String,
        offset: usize,
        expected: usize,
        actual: usize,
        reason: &'static str,
    },
    #[error("{lump} lump has version {actual}, expected {expected}")]
    LumpVersion {
        lump: String,
        expected: i32,
        actual: i32,
    },
    #[error("failed to decompress {lump} lump: {reason}")]
    Decompression { lump: String, reason: String },
    #[error("lightmap of {width}x{height} luxels does not fit a {page_width}x{page_height} page")]
    PackingFailure {
        width: u32,
        height: u32,
        page_width: u32,
        page_height: u32,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BSPError {
    pub fn corrupt(
        lump: impl ToString,
        offset: usize,
        expected: usize,
        actual: usize,
        reason: &'static str,
    ) -> Self {
        BSPError::CorruptData {
            lump: lump.to_string(),
            offset,
            expected,
            actual,
            reason,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BSPError::UnsupportedVersion(_) | BSPError::Config(_) | BSPError::PackingFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BSPError>;

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn only_header_config_and_packing_are_fatal() {
        assert!(BSPError::UnsupportedVersion("IBSP".into()).is_fatal());
        assert!(BSPError::Config("page".into()).is_fatal());
        assert!(!BSPError::corrupt("Faces", 0, 56, 3, "short lump").is_fatal());
        let e = BSPError::Decompression {
            lump: "Lighting".into(),
            reason: "eof".into(),
        };
        assert!(!e.is_fatal());
        assert_eq!(e.to_string(), "failed to decompress Lighting lump: eof");
    }
}
