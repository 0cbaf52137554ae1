//! On-disk metadata marker (design doc §6).
//!
//! The engine persists nothing but this one small page: bitmaps are always
//! rebuilt from the source table on open, since rebuild is fast and the
//! bitmap corpus itself is large. The marker exists only to let a host tell
//! "index built" from "index never built", and to flag staleness.
//!
//! Grounded on the teacher's `zimf::zim::Header` (`magic_number`,
//! `major_version`/`minor_version` fields parsed with `#[derive(BinRead)]`);
//! trimmed to the four fields the design doc names.

use binread::{BinRead, BinReaderExt};
use std::io::Cursor;

use crate::error::{BiscuitError, Result};

pub const MAGIC: u32 = 0x4253_4B54; // "BSKT" read as a little-endian u32
pub const FORMAT_VERSION: u32 = 1;
pub const MARKER_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexMarker {
    pub magic: u32,
    pub format_version: u32,
    pub record_count: u32,
    pub reserved_block: u32,
}

#[derive(BinRead)]
#[br(little)]
struct RawMarker {
    magic: u32,
    format_version: u32,
    record_count: u32,
    reserved_block: u32,
}

impl IndexMarker {
    pub fn new(record_count: u32) -> Self {
        IndexMarker {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            record_count,
            reserved_block: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; MARKER_BYTES] {
        let mut buf = [0u8; MARKER_BYTES];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.record_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.reserved_block.to_le_bytes());
        buf
    }

    pub fn read(bytes: &[u8]) -> Result<IndexMarker> {
        let mut cursor = Cursor::new(bytes);
        let raw: RawMarker = cursor.read_le().map_err(|e| BiscuitError::Integrity {
            reason: format!("failed to parse index marker: {e}"),
        })?;
        Ok(IndexMarker {
            magic: raw.magic,
            format_version: raw.format_version,
            record_count: raw.record_count,
            reserved_block: raw.reserved_block,
        })
    }

    /// Validate the marker read at open time against the record count the
    /// host's source table actually reports. A mismatch (or a bad magic or
    /// an unsupported format version) is an `integrity` error, which the
    /// caller logs and responds to by triggering a full rebuild.
    pub fn validate(&self, observed_record_count: u32) -> Result<()> {
        if self.magic != MAGIC {
            return Err(BiscuitError::Integrity {
                reason: format!("bad marker magic: {:#x}", self.magic),
            });
        }
        if self.format_version != FORMAT_VERSION {
            return Err(BiscuitError::Integrity {
                reason: format!("unsupported marker format version {}", self.format_version),
            });
        }
        if self.record_count != observed_record_count {
            return Err(BiscuitError::Integrity {
                reason: format!(
                    "marker record count {} does not match observed {}",
                    self.record_count, observed_record_count
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let marker = IndexMarker::new(42);
        let bytes = marker.to_bytes();
        let parsed = IndexMarker::read(&bytes).unwrap();
        assert_eq!(parsed, marker);
        assert!(parsed.validate(42).is_ok());
    }

    #[test]
    fn test_bad_magic_is_integrity_error() {
        let mut bytes = IndexMarker::new(1).to_bytes();
        bytes[0] = 0xFF;
        let parsed = IndexMarker::read(&bytes).unwrap();
        assert!(matches!(parsed.validate(1), Err(BiscuitError::Integrity { .. })));
    }

    #[test]
    fn test_record_count_mismatch_is_integrity_error() {
        let marker = IndexMarker::new(10);
        assert!(matches!(marker.validate(11), Err(BiscuitError::Integrity { .. })));
    }

    #[test]
    fn test_truncated_bytes_fail_to_parse() {
        let bytes = [0u8; 4];
        assert!(IndexMarker::read(&bytes).is_err());
    }
}
