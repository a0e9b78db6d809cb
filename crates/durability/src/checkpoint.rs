//! The base index file: a point-in-time snapshot of the Index, committed by
//! an atomic rename over the previous snapshot.

use haven_core::RecordMeta;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Checkpoint-related counters carried inside the base index document.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CheckpointStats {
    /// Unix milliseconds of the last successful checkpoint, or 0 if none.
    pub last_checkpoint_time: i64,
    /// Total number of checkpoints taken over the engine's lifetime.
    pub checkpoints: u64,
}

/// The base index file's textual document shape:
/// `{ index: {key -> metadata}, stats: {...}, updatedAt }`.
#[derive(Debug, Serialize, Deserialize)]
struct BaseIndexDocument {
    index: HashMap<String, RecordMeta>,
    stats: CheckpointStats,
    #[serde(rename = "updatedAt")]
    updated_at: i64,
}

/// Write a checkpoint to `path`: serialize to `<path>.tmp`, optionally fsync
/// it, then atomically rename over `path`. The rename is the commit point —
/// if the process dies before it, the prior base index file is untouched and
/// remains authoritative.
pub fn write_checkpoint(
    path: &Path,
    index: &HashMap<String, RecordMeta>,
    stats: CheckpointStats,
    updated_at: i64,
    fsync: bool,
) -> haven_core::Result<()> {
    let doc = BaseIndexDocument {
        index: index.clone(),
        stats,
        updated_at,
    };
    let bytes = serde_json::to_vec(&doc)
        .map_err(|e| haven_core::Error::Serialization(format!("encoding checkpoint: {e}")))?;

    let tmp_path = tmp_path_for(path);
    std::fs::write(&tmp_path, &bytes)?;
    if fsync {
        let tmp_file = std::fs::File::open(&tmp_path)?;
        tmp_file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read the base index file at `path`, returning `None` if it does not exist
/// yet (fresh database). A present-but-malformed file is a corruption error.
pub fn read_checkpoint(
    path: &Path,
) -> haven_core::Result<Option<(HashMap<String, RecordMeta>, CheckpointStats)>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let doc: BaseIndexDocument = serde_json::from_slice(&bytes)
        .map_err(|e| haven_core::Error::Corruption(format!("malformed base index file: {e}")))?;
    Ok(Some((doc.index, doc.stats)))
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_missing_checkpoint_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.index");
        assert!(read_checkpoint(&path).unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.index");

        let mut index = HashMap::new();
        index.insert("a".to_string(), RecordMeta::new(0, 10, 4));
        let stats = CheckpointStats {
            last_checkpoint_time: 1000,
            checkpoints: 1,
        };

        write_checkpoint(&path, &index, stats, 1000, true).unwrap();
        let (read_index, read_stats) = read_checkpoint(&path).unwrap().unwrap();
        assert_eq!(read_index, index);
        assert_eq!(read_stats, stats);
    }

    #[test]
    fn write_leaves_no_tmp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.index");
        write_checkpoint(&path, &HashMap::new(), CheckpointStats::default(), 0, true).unwrap();
        assert!(!tmp_path_for(&path).exists());
    }

    #[test]
    fn second_checkpoint_overwrites_first_atomically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.index");

        let mut first = HashMap::new();
        first.insert("a".to_string(), RecordMeta::new(0, 1, 4));
        write_checkpoint(&path, &first, CheckpointStats::default(), 1, false).unwrap();

        let mut second = HashMap::new();
        second.insert("b".to_string(), RecordMeta::new(1, 1, 4));
        write_checkpoint(&path, &second, CheckpointStats::default(), 2, false).unwrap();

        let (read_index, _) = read_checkpoint(&path).unwrap().unwrap();
        assert_eq!(read_index, second);
    }

    #[test]
    fn malformed_checkpoint_file_is_a_corruption_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.index");
        std::fs::write(&path, b"not json").unwrap();
        let err = read_checkpoint(&path).unwrap_err();
        assert!(matches!(err, haven_core::Error::Corruption(_)));
    }
}
