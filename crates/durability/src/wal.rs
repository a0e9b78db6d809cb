//! Write-ahead log entries and the append-only file that holds them.
//!
//! Entry format: `[op: u8][key_len: u32 LE][key bytes]` and, for SET only,
//! `[meta_len: u32 LE][meta bytes]` where `meta` is the JSON encoding of a
//! `haven_core::RecordMeta` (so embedded `Value::Bytes` offsets never appear
//! here — metadata carries no payload, only where to find one).

use haven_core::RecordMeta;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// WAL opcode for an inserted/overwritten key.
pub const OP_SET: u8 = 1;
/// WAL opcode for a removed key.
pub const OP_DELETE: u8 = 2;

/// One decoded WAL entry.
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// The key the entry mutates.
    pub key: String,
    /// The mutation itself.
    pub op: WalOp,
}

/// The mutation a `WalEntry` applies to the Index.
#[derive(Debug, Clone, PartialEq)]
pub enum WalOp {
    /// Install this metadata for the key.
    Set(RecordMeta),
    /// Remove the key.
    Delete,
}

impl WalEntry {
    /// Build a SET entry.
    pub fn set(key: impl Into<String>, meta: RecordMeta) -> Self {
        WalEntry {
            key: key.into(),
            op: WalOp::Set(meta),
        }
    }

    /// Build a DELETE entry.
    pub fn delete(key: impl Into<String>) -> Self {
        WalEntry {
            key: key.into(),
            op: WalOp::Delete,
        }
    }
}

/// Encode one entry into its on-disk byte representation.
pub fn encode_entry(entry: &WalEntry) -> haven_core::Result<Vec<u8>> {
    let key_bytes = entry.key.as_bytes();
    let key_len: u32 = key_bytes
        .len()
        .try_into()
        .map_err(|_| haven_core::Error::Serialization("key exceeds 4 GiB".into()))?;

    let mut out = Vec::new();
    match &entry.op {
        WalOp::Set(meta) => {
            out.push(OP_SET);
            out.extend_from_slice(&key_len.to_le_bytes());
            out.extend_from_slice(key_bytes);
            let meta_bytes = serde_json::to_vec(meta)
                .map_err(|e| haven_core::Error::Serialization(format!("encoding meta: {e}")))?;
            let meta_len: u32 = meta_bytes
                .len()
                .try_into()
                .map_err(|_| haven_core::Error::Serialization("meta exceeds 4 GiB".into()))?;
            out.extend_from_slice(&meta_len.to_le_bytes());
            out.extend_from_slice(&meta_bytes);
        }
        WalOp::Delete => {
            out.push(OP_DELETE);
            out.extend_from_slice(&key_len.to_le_bytes());
            out.extend_from_slice(key_bytes);
        }
    }
    Ok(out)
}

/// Encode a batch of entries into one contiguous buffer, in order.
pub fn encode_batch(entries: &[WalEntry]) -> haven_core::Result<Vec<u8>> {
    let mut out = Vec::new();
    for entry in entries {
        out.extend_from_slice(&encode_entry(entry)?);
    }
    Ok(out)
}

/// Decode as many whole entries as possible from the start of `bytes`.
///
/// Returns the decoded entries, the number of bytes consumed by them, and
/// whether decoding stopped early because the tail was truncated or
/// malformed. A truncated/malformed tail is never an error: replay halts at
/// the entry boundary and the caller discards the rest.
pub fn decode_entries(bytes: &[u8]) -> (Vec<WalEntry>, usize, bool) {
    let mut entries = Vec::new();
    let mut pos = 0usize;

    loop {
        match decode_one(&bytes[pos..]) {
            Some((entry, consumed)) => {
                entries.push(entry);
                pos += consumed;
                if pos == bytes.len() {
                    return (entries, pos, false);
                }
            }
            None => {
                let truncated = pos < bytes.len();
                return (entries, pos, truncated);
            }
        }
    }
}

fn decode_one(bytes: &[u8]) -> Option<(WalEntry, usize)> {
    if bytes.is_empty() {
        return None;
    }
    if bytes.len() < 5 {
        return None;
    }
    let op = bytes[0];
    let key_len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let mut pos = 5;
    if bytes.len() < pos + key_len {
        return None;
    }
    let key = std::str::from_utf8(&bytes[pos..pos + key_len]).ok()?.to_string();
    pos += key_len;

    match op {
        OP_SET => {
            if bytes.len() < pos + 4 {
                return None;
            }
            let meta_len =
                u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
                    as usize;
            pos += 4;
            if bytes.len() < pos + meta_len {
                return None;
            }
            let meta: RecordMeta = serde_json::from_slice(&bytes[pos..pos + meta_len]).ok()?;
            pos += meta_len;
            Some((WalEntry::set(key, meta), pos))
        }
        OP_DELETE => Some((WalEntry::delete(key), pos)),
        _ => None,
    }
}

/// The WAL's append-only file, plus its tracked in-memory size.
pub struct Wal {
    path: PathBuf,
    file: File,
    size: u64,
}

impl Wal {
    /// Open (creating if absent) the WAL at `path`.
    pub fn open(path: impl AsRef<Path>) -> haven_core::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        Ok(Wal { path, file, size })
    }

    /// Current tracked size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append a batch of entries as one write, returning the bytes written.
    /// On failure the caller is responsible for re-queueing the batch; this
    /// function does not mutate `size` unless the write succeeds.
    pub fn append_batch(&mut self, entries: &[WalEntry], fsync: bool) -> haven_core::Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }
        let buf = encode_batch(entries)?;
        self.file.write_all(&buf)?;
        if fsync {
            self.file.sync_all()?;
        }
        self.size += buf.len() as u64;
        Ok(buf.len() as u64)
    }

    /// Resynchronize the tracked size with the file's actual length, used
    /// after a failed write whose partial effect on disk is unknown.
    pub fn resync_size(&mut self) -> haven_core::Result<()> {
        self.size = self.file.metadata()?.len();
        Ok(())
    }

    /// Read the entire WAL file from the start, for replay.
    pub fn read_all(&mut self) -> haven_core::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Truncate the WAL to zero bytes, fsyncing if requested.
    pub fn truncate(&mut self, fsync: bool) -> haven_core::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        if fsync {
            self.file.sync_all()?;
        }
        self.size = 0;
        Ok(())
    }

    /// Path this WAL is backed by.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::RecordMeta;
    use tempfile::tempdir;

    #[test]
    fn encode_decode_set_round_trips() {
        let entry = WalEntry::set("a", RecordMeta::new(0, 10, 4).with_expiry(Some(123)));
        let bytes = encode_entry(&entry).unwrap();
        let (decoded, consumed, truncated) = decode_entries(&bytes);
        assert!(!truncated);
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, vec![entry]);
    }

    #[test]
    fn encode_decode_delete_round_trips() {
        let entry = WalEntry::delete("a");
        let bytes = encode_entry(&entry).unwrap();
        let (decoded, consumed, truncated) = decode_entries(&bytes);
        assert!(!truncated);
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, vec![entry]);
    }

    #[test]
    fn decodes_a_batch_of_mixed_entries_in_order() {
        let entries = vec![
            WalEntry::set("a", RecordMeta::new(0, 1, 4)),
            WalEntry::delete("b"),
            WalEntry::set("c", RecordMeta::new(10, 5, 4)),
        ];
        let bytes = encode_batch(&entries).unwrap();
        let (decoded, consumed, truncated) = decode_entries(&bytes);
        assert!(!truncated);
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, entries);
    }

    #[test]
    fn truncated_tail_stops_replay_at_entry_boundary() {
        let entries = vec![
            WalEntry::set("a", RecordMeta::new(0, 1, 4)),
            WalEntry::set("b", RecordMeta::new(1, 1, 4)),
        ];
        let mut bytes = encode_batch(&entries).unwrap();
        let first_entry_len = encode_entry(&entries[0]).unwrap().len();
        bytes.truncate(first_entry_len + 3);

        let (decoded, consumed, truncated) = decode_entries(&bytes);
        assert!(truncated);
        assert_eq!(consumed, first_entry_len);
        assert_eq!(decoded, vec![entries[0].clone()]);
    }

    #[test]
    fn unknown_opcode_halts_replay_without_panicking() {
        let mut bytes = vec![99u8];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let (decoded, consumed, truncated) = decode_entries(&bytes);
        assert!(truncated);
        assert_eq!(consumed, 0);
        assert!(decoded.is_empty());
    }

    #[test]
    fn wal_append_and_read_all_round_trips() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("kv.wal")).unwrap();
        let entries = vec![WalEntry::set("a", RecordMeta::new(0, 1, 4))];
        let written = wal.append_batch(&entries, true).unwrap();
        assert!(written > 0);
        assert_eq!(wal.size(), written);

        let bytes = wal.read_all().unwrap();
        let (decoded, _, truncated) = decode_entries(&bytes);
        assert!(!truncated);
        assert_eq!(decoded, entries);
    }

    #[test]
    fn wal_truncate_resets_size_and_file() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("kv.wal")).unwrap();
        wal.append_batch(&[WalEntry::delete("a")], true).unwrap();
        wal.truncate(true).unwrap();
        assert_eq!(wal.size(), 0);
        assert_eq!(wal.read_all().unwrap().len(), 0);
    }
}
