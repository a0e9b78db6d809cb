//! Operational counters exposed by `Engine::get_stats`.

/// Snapshot of the engine's running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    /// Total `get` calls.
    pub reads: u64,
    /// Total `set` calls.
    pub writes: u64,
    /// Total `delete` calls that removed a key.
    pub deletes: u64,
    /// Reads satisfied from the in-memory cache.
    pub hits: u64,
    /// Reads for keys absent from the Index.
    pub misses: u64,
    /// Reads that required a Data Log read.
    pub disk_reads: u64,
    /// Cumulative bytes appended to the Data Log.
    pub bytes_written_to_data_file: u64,
    /// Cumulative bytes read from the Data Log.
    pub bytes_read_from_data_file: u64,
    /// Cumulative bytes appended to the WAL.
    pub bytes_written_to_wal: u64,
    /// Total compactions run.
    pub compactions: u64,
    /// Unix milliseconds of the last compaction, or 0 if none.
    pub last_compaction_time: i64,
    /// Data Log bytes not referenced by any live Index entry.
    pub wasted_space: u64,
    /// Approximate in-memory size of the Index, in bytes.
    pub index_size_bytes: u64,
    /// Current WAL file size in bytes.
    pub wal_size_bytes: u64,
    /// Total checkpoints taken.
    pub checkpoints: u64,
    /// Unix milliseconds of the last checkpoint, or 0 if none.
    pub last_checkpoint_time: i64,
    /// Number of keys currently in the Index.
    pub active_keys: u64,
    /// Number of keys currently in the read cache.
    pub memory_store_keys: u64,
    /// Keys in the dirty-data set awaiting a data flush.
    pub pending_data_writes: u64,
    /// Entries in the pending-change set awaiting a WAL flush.
    pub pending_index_changes: u64,
    /// Current Data Log file size in bytes.
    pub data_file_size: u64,
}
