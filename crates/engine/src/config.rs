//! Engine configuration, builder-style with a `validate` pass.

use std::path::{Path, PathBuf};

/// Configuration for an `Engine` instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Data Log path.
    pub db_path: PathBuf,
    /// Base index (checkpoint) path.
    pub index_path: PathBuf,
    /// WAL path.
    pub wal_path: PathBuf,
    /// Periodic deferred-flush cadence; `None` disables the periodic task
    /// (flushes then only happen via explicit `flush()`/`close()` calls or
    /// as a side effect of another periodic deadline firing).
    pub flush_interval_ms: Option<u64>,
    /// If true, every write immediately and synchronously fsyncs the Data
    /// Log and WAL.
    pub sync_on_write: bool,
    /// Default TTL (milliseconds) applied when `set` does not specify one.
    pub default_ttl_ms: Option<i64>,
    /// Load all live values into the read cache at startup.
    pub preload: bool,
    /// LRU cap on the read cache; `None` means unbounded.
    pub max_memory_keys: Option<usize>,
    /// Periodic compaction check cadence, in milliseconds.
    pub compact_interval_ms: u64,
    /// Minimum `wasted_space / data_file_size` ratio triggering auto-compact.
    pub compact_threshold: f64,
    /// Periodic checkpoint cadence, in milliseconds.
    pub checkpoint_interval_ms: u64,
    /// WAL size, in bytes, that triggers a size-based checkpoint.
    pub checkpoint_wal_size_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let index_path = PathBuf::from("kv.index");
        let wal_path = wal_path_for(&index_path);
        EngineConfig {
            db_path: PathBuf::from("kv.db"),
            index_path,
            wal_path,
            flush_interval_ms: Some(100),
            sync_on_write: false,
            default_ttl_ms: None,
            preload: true,
            max_memory_keys: None,
            compact_interval_ms: 3_600_000,
            compact_threshold: 0.5,
            checkpoint_interval_ms: 600_000,
            checkpoint_wal_size_threshold: 5_242_880,
        }
    }
}

impl EngineConfig {
    /// Set the Data Log path. If the WAL path has not been overridden
    /// separately, leaves it derived from the index path.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Set the base index path and re-derive the default WAL path from it.
    pub fn with_index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = path.into();
        self.wal_path = wal_path_for(&self.index_path);
        self
    }

    /// Override the WAL path explicitly.
    pub fn with_wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wal_path = path.into();
        self
    }

    /// Set the periodic deferred-flush cadence.
    pub fn with_flush_interval_ms(mut self, interval: Option<u64>) -> Self {
        self.flush_interval_ms = interval;
        self
    }

    /// Set whether every write immediately fsyncs.
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Set the default TTL applied when `set` omits one.
    pub fn with_default_ttl_ms(mut self, ttl: Option<i64>) -> Self {
        self.default_ttl_ms = ttl;
        self
    }

    /// Set whether to preload live values into the cache at startup.
    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    /// Set the LRU cap on the read cache.
    pub fn with_max_memory_keys(mut self, cap: Option<usize>) -> Self {
        self.max_memory_keys = cap;
        self
    }

    /// Set the periodic compaction check cadence.
    pub fn with_compact_interval_ms(mut self, interval: u64) -> Self {
        self.compact_interval_ms = interval;
        self
    }

    /// Set the wasted-space ratio that triggers auto-compact.
    pub fn with_compact_threshold(mut self, threshold: f64) -> Self {
        self.compact_threshold = threshold;
        self
    }

    /// Set the periodic checkpoint cadence.
    pub fn with_checkpoint_interval_ms(mut self, interval: u64) -> Self {
        self.checkpoint_interval_ms = interval;
        self
    }

    /// Set the WAL size threshold that triggers a checkpoint.
    pub fn with_checkpoint_wal_size_threshold(mut self, bytes: u64) -> Self {
        self.checkpoint_wal_size_threshold = bytes;
        self
    }

    /// Validate this configuration, failing fast on nonsensical values
    /// rather than surfacing confusing behavior later.
    pub fn validate(&self) -> haven_core::Result<()> {
        if let Some(0) = self.max_memory_keys {
            // a zero-capacity cache is legal (every insert evicts
            // immediately); nothing to reject here, kept as a reminder that
            // this boundary was considered.
        }
        if !(0.0..=1.0).contains(&self.compact_threshold) {
            return Err(haven_core::Error::Configuration(format!(
                "compact_threshold must be within [0.0, 1.0], got {}",
                self.compact_threshold
            )));
        }
        if let Some(ttl) = self.default_ttl_ms {
            if ttl < 0 {
                return Err(haven_core::Error::Configuration(
                    "default_ttl_ms must not be negative".into(),
                ));
            }
        }
        Ok(())
    }
}

fn wal_path_for(index_path: &Path) -> PathBuf {
    let mut name = index_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".wal");
    index_path.with_file_name(name)
}
