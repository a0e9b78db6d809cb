//! Small shared types that don't belong to any single crate's core algorithm.

use serde::{Deserialize, Serialize};

/// Everything the Index needs to know about one stored key, independent of
/// the key string itself: where its record lives in the Data Log, how big it
/// is, its type tag, and its optional expiry.
///
/// This is the value side of the Index's `key -> RecordMeta` map (§3 of the
/// design), and is also what gets written into WAL SET entries and the
/// checkpoint file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Byte offset of the record within the Data Log file.
    pub offset: u64,
    /// Size in bytes of the framed record at `offset`.
    pub size: u32,
    /// The Serializer type tag of the stored value, duplicated here so
    /// callers can filter by type without touching the Data Log.
    pub type_tag: u8,
    /// Absolute Unix timestamp, in milliseconds, at which this key expires,
    /// or `None` if it never expires.
    pub expiry: Option<i64>,
}

impl RecordMeta {
    /// Construct a `RecordMeta` with no expiry.
    pub fn new(offset: u64, size: u32, type_tag: u8) -> Self {
        RecordMeta {
            offset,
            size,
            type_tag,
            expiry: None,
        }
    }

    /// Returns a copy of this metadata with the given expiry timestamp set.
    pub fn with_expiry(mut self, expiry: Option<i64>) -> Self {
        self.expiry = expiry;
        self
    }

    /// True if `now` (Unix milliseconds) is at or past this record's expiry.
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expiry, Some(exp) if now >= exp)
    }
}
