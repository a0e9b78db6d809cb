//! Crash-recovery: reconstruct the Index from the base index file plus a
//! sequential replay of the WAL.

use crate::checkpoint::{self, CheckpointStats};
use crate::wal::{self, Wal, WalOp};
use haven_storage::Index;
use std::path::Path;
use tracing::warn;

/// Result of opening an engine: the reconstructed Index, the WAL handle
/// (positioned for further appends), and replay bookkeeping.
pub struct Recovered {
    /// The reconstructed Index.
    pub index: Index,
    /// The open WAL, ready to accept further writes.
    pub wal: Wal,
    /// Checkpoint counters carried forward from the base index file.
    pub checkpoint_stats: CheckpointStats,
    /// Number of WAL entries successfully replayed.
    pub replayed_ops: usize,
    /// True if the WAL's tail was truncated or malformed and replay stopped
    /// early.
    pub truncated: bool,
}

/// Open the base index file and WAL at the given paths and reconstruct the
/// Index. `now_ms` is used to drop already-expired keys during replay rather
/// than resurrecting them into the Index just to delete them a moment later.
pub fn recover(index_path: &Path, wal_path: &Path, now_ms: i64) -> haven_core::Result<Recovered> {
    let (entries, checkpoint_stats) = checkpoint::read_checkpoint(index_path)?
        .unwrap_or_else(|| (std::collections::HashMap::new(), CheckpointStats::default()));

    let mut index = Index::new();
    index.replace_all(entries);

    let mut wal = Wal::open(wal_path)?;
    let bytes = wal.read_all()?;
    let (wal_entries, _consumed, truncated) = wal::decode_entries(&bytes);

    if truncated {
        warn!(
            wal_path = %wal_path.display(),
            replayed = wal_entries.len(),
            "WAL tail truncated or malformed; replay stopped at entry boundary"
        );
    }

    for entry in &wal_entries {
        match &entry.op {
            WalOp::Set(meta) => {
                if let Some(expiry) = meta.expiry {
                    if now_ms >= expiry {
                        index.delete(&entry.key);
                        continue;
                    }
                }
                index.set(entry.key.clone(), *meta);
            }
            WalOp::Delete => {
                index.delete(&entry.key);
            }
        }
    }

    Ok(Recovered {
        index,
        wal,
        checkpoint_stats,
        replayed_ops: wal_entries.len(),
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::RecordMeta;
    use tempfile::tempdir;

    fn paths(dir: &tempfile::TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        (dir.path().join("kv.index"), dir.path().join("kv.wal"))
    }

    #[test]
    fn recovers_empty_store_with_no_files() {
        let dir = tempdir().unwrap();
        let (index_path, wal_path) = paths(&dir);
        let recovered = recover(&index_path, &wal_path, 0).unwrap();
        assert_eq!(recovered.index.size(), 0);
        assert_eq!(recovered.replayed_ops, 0);
        assert!(!recovered.truncated);
    }

    #[test]
    fn replays_wal_on_top_of_checkpoint() {
        let dir = tempdir().unwrap();
        let (index_path, wal_path) = paths(&dir);

        let mut base = std::collections::HashMap::new();
        base.insert("a".to_string(), RecordMeta::new(0, 5, 4));
        checkpoint::write_checkpoint(&index_path, &base, CheckpointStats::default(), 1, false)
            .unwrap();

        {
            let mut wal = Wal::open(&wal_path).unwrap();
            wal.append_batch(
                &[
                    wal::WalEntry::set("b", RecordMeta::new(5, 3, 4)),
                    wal::WalEntry::delete("a"),
                ],
                true,
            )
            .unwrap();
        }

        let recovered = recover(&index_path, &wal_path, 0).unwrap();
        assert!(!recovered.index.contains("a"));
        assert!(recovered.index.contains("b"));
        assert_eq!(recovered.replayed_ops, 2);
    }

    #[test]
    fn drops_keys_already_expired_at_recovery_time() {
        let dir = tempdir().unwrap();
        let (index_path, wal_path) = paths(&dir);

        {
            let mut wal = Wal::open(&wal_path).unwrap();
            wal.append_batch(
                &[wal::WalEntry::set(
                    "t",
                    RecordMeta::new(0, 1, 4).with_expiry(Some(100)),
                )],
                true,
            )
            .unwrap();
        }

        let recovered = recover(&index_path, &wal_path, 200).unwrap();
        assert!(!recovered.index.contains("t"));
    }

    #[test]
    fn keeps_keys_not_yet_expired_at_recovery_time() {
        let dir = tempdir().unwrap();
        let (index_path, wal_path) = paths(&dir);

        {
            let mut wal = Wal::open(&wal_path).unwrap();
            wal.append_batch(
                &[wal::WalEntry::set(
                    "t",
                    RecordMeta::new(0, 1, 4).with_expiry(Some(1_000_000)),
                )],
                true,
            )
            .unwrap();
        }

        let recovered = recover(&index_path, &wal_path, 200).unwrap();
        assert!(recovered.index.contains("t"));
    }

    #[test]
    fn truncated_wal_tail_still_recovers_prior_entries() {
        let dir = tempdir().unwrap();
        let (index_path, wal_path) = paths(&dir);

        let good = wal::encode_entry(&wal::WalEntry::set("a", RecordMeta::new(0, 1, 4))).unwrap();
        let mut bytes = good.clone();
        bytes.extend_from_slice(&[9, 9, 9]);
        std::fs::write(&wal_path, &bytes).unwrap();

        let recovered = recover(&index_path, &wal_path, 0).unwrap();
        assert!(recovered.truncated);
        assert_eq!(recovered.replayed_ops, 1);
        assert!(recovered.index.contains("a"));
    }
}
