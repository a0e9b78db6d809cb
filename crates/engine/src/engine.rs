//! The `Engine`: ties the Data Log, Index, WAL/checkpoint, LRU cache, TTL
//! table and background driver together into the single entry point callers
//! use.
//!
//! All mutable state lives behind one `parking_lot::Mutex`, which is what
//! actually realizes the single-threaded cooperative scheduling model: at
//! most one of (a foreground call, the background driver's tick) is ever
//! touching the Data Log, Index, WAL or caches at a time.

use crate::background::Driver;
use crate::config::EngineConfig;
use crate::events::{Event, NoopObserver, Observer};
use crate::lru::LruCache;
use crate::stats::Stats;
use crate::ttl::TtlTable;
use haven_core::{serializer, Error, RecordMeta, Result, Value};
use haven_durability::checkpoint::{self, CheckpointStats};
use haven_storage::{DataLog, Index};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Where an `Engine` is in its open/close lifecycle. Rejects writes (and, for
/// `Closing`/`Closed`, reads) outside `Open`/`Compacting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Open,
    Compacting,
    Closing,
    Closed,
}

/// A change waiting to be written to the WAL, keyed by the key it mutates.
/// Repeated writes to the same key before a flush coalesce to the last one.
#[derive(Debug, Clone)]
enum PendingChange {
    Set(RecordMeta),
    Delete,
}

struct EngineInner {
    data_log: DataLog,
    index: Index,
    wal: haven_durability::Wal,
    cache: LruCache,
    /// Keys written since the last data flush, awaiting encode + append.
    dirty: HashSet<String>,
    /// Index mutations since the last WAL flush, awaiting a durable batch.
    pending: HashMap<String, PendingChange>,
    ttl: TtlTable,
    stats: Stats,
    checkpoint_stats: CheckpointStats,
    state: LifecycleState,
    checkpoint_running: bool,
    last_checkpoint_check_ms: i64,
    last_compact_check_ms: i64,
    config: EngineConfig,
}

/// The havenkv storage engine: a durable, embedded key-value store.
pub struct Engine {
    inner: Arc<Mutex<EngineInner>>,
    observer: Arc<dyn Observer>,
    driver: Mutex<Option<Driver>>,
}

impl Engine {
    /// Open (or create) an engine at the paths named by `config`, discarding
    /// events (see `open_with_observer` to receive them).
    pub fn open(config: EngineConfig) -> Result<Engine> {
        Engine::open_with_observer(config, Arc::new(NoopObserver))
    }

    /// Open (or create) an engine at the paths named by `config`, recovering
    /// from the base index file and WAL if present, and spawning the
    /// background driver that handles deferred flushes, checkpoints,
    /// compaction, and TTL expiry.
    pub fn open_with_observer(config: EngineConfig, observer: Arc<dyn Observer>) -> Result<Engine> {
        config.validate()?;
        let now = now_ms();

        let recovered = haven_durability::recover(&config.index_path, &config.wal_path, now)?;
        let mut data_log = DataLog::open(&config.db_path)?;

        let mut ttl = TtlTable::new();
        for (key, meta) in recovered.index.entries() {
            if let Some(expiry) = meta.expiry {
                ttl.insert(key.to_string(), expiry);
            }
        }

        let mut cache = LruCache::new(config.max_memory_keys);
        if config.preload {
            let entries: Vec<(String, RecordMeta)> = recovered
                .index
                .entries()
                .map(|(k, m)| (k.to_string(), *m))
                .collect();
            for (key, meta) in entries {
                let bytes = data_log.read_exact(meta.offset, meta.size)?;
                let (value, _) = serializer::decode(&bytes)?;
                cache.insert(key, value);
            }
        }

        let replayed_ops = recovered.replayed_ops;
        let final_index_size = recovered.index.size();
        let truncated = recovered.truncated;

        let inner = Arc::new(Mutex::new(EngineInner {
            data_log,
            index: recovered.index,
            wal: recovered.wal,
            cache,
            dirty: HashSet::new(),
            pending: HashMap::new(),
            ttl,
            stats: Stats::default(),
            checkpoint_stats: recovered.checkpoint_stats,
            state: LifecycleState::Open,
            checkpoint_running: false,
            last_checkpoint_check_ms: now,
            last_compact_check_ms: now,
            config: config.clone(),
        }));

        let tick_interval_ms = [
            config.flush_interval_ms,
            Some(config.checkpoint_interval_ms),
            Some(config.compact_interval_ms),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(100)
        .max(10);

        let driver_inner = Arc::clone(&inner);
        let driver_observer = Arc::clone(&observer);
        let driver = Driver::spawn(Duration::from_millis(tick_interval_ms), move || {
            let events = {
                let mut guard = driver_inner.lock();
                run_tick(&mut guard)
            };
            for event in events {
                driver_observer.emit(event);
            }
        });

        let engine = Engine {
            inner,
            observer,
            driver: Mutex::new(Some(driver)),
        };

        if truncated {
            engine.observer.emit(Event::Warn {
                message: "WAL tail was truncated or malformed during recovery".to_string(),
            });
        }
        engine.observer.emit(Event::WalReplayed {
            replayed_ops,
            final_index_size,
        });
        engine.observer.emit(Event::Ready);

        Ok(engine)
    }

    /// Store `value` under `key`. `ttl`, if `Some` and positive, overrides
    /// `EngineConfig::default_ttl_ms` for this write; `Some(0)` or negative
    /// cancels any existing TTL without scheduling a new one; `None` falls
    /// back to the configured default (and cancels a prior TTL if there is
    /// no default either).
    pub fn set(&self, key: &str, value: Value, ttl: Option<i64>) -> Result<()> {
        haven_core::validate_key(key)?;
        let now = now_ms();
        let mut events = Vec::new();

        {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, LifecycleState::Open | LifecycleState::Compacting) {
                return Err(Error::Lifecycle("engine is closing or closed".into()));
            }

            inner.stats.writes += 1;

            match ttl.or(inner.config.default_ttl_ms) {
                Some(t) if t > 0 => inner.ttl.insert(key.to_string(), now + t),
                _ => inner.ttl.remove(key),
            }

            inner.dirty.insert(key.to_string());
            cache_insert(&mut inner, key.to_string(), value.clone())?;
            events.push(Event::Set {
                key: key.to_string(),
                value,
            });

            if inner.config.sync_on_write {
                flush_data(&mut inner, true, &mut events)?;
                flush_wal(&mut inner, true, &mut events)?;
            }
        }

        self.notify_driver();
        self.emit_all(events);
        Ok(())
    }

    /// Look up `key`, consulting the read cache before falling back to a
    /// Data Log read. Returns `Ok(None)` (never an error) if the engine is
    /// closing or closed.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut events = Vec::new();
        let result;

        {
            let mut inner = self.inner.lock();
            if matches!(inner.state, LifecycleState::Closing | LifecycleState::Closed) {
                return Ok(None);
            }

            inner.stats.reads += 1;

            if let Some(value) = inner.cache.get(key).cloned() {
                inner.stats.hits += 1;
                events.push(Event::Get {
                    key: key.to_string(),
                    value: value.clone(),
                });
                result = Some(value);
            } else if let Some(meta) = inner.index.get(key).copied() {
                match read_record(&mut inner, meta) {
                    Ok(value) => {
                        inner.stats.hits += 1;
                        inner.stats.disk_reads += 1;
                        inner.stats.bytes_read_from_data_file += meta.size as u64;
                        cache_insert(&mut inner, key.to_string(), value.clone())?;
                        events.push(Event::Get {
                            key: key.to_string(),
                            value: value.clone(),
                        });
                        result = Some(value);
                    }
                    Err(e) => {
                        inner.stats.misses += 1;
                        events.push(Event::Error {
                            message: format!("corrupt record for key {key:?}: {e}"),
                        });
                        result = None;
                    }
                }
            } else {
                inner.stats.misses += 1;
                events.push(Event::Miss {
                    key: key.to_string(),
                });
                result = None;
            }
        }

        self.emit_all(events);
        Ok(result)
    }

    /// True if `key` is present, without affecting read statistics or LRU
    /// recency. Always `false` once the engine is closing or closed.
    pub fn has(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        if matches!(inner.state, LifecycleState::Closing | LifecycleState::Closed) {
            return false;
        }
        inner.index.contains(key)
    }

    /// Remove `key`, if present. Not an error if `key` was already absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut events = Vec::new();

        {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, LifecycleState::Open | LifecycleState::Compacting) {
                return Err(Error::Lifecycle("engine is closing or closed".into()));
            }

            let removed = internal_delete(&mut inner, key);
            if removed.is_some() {
                events.push(Event::Delete {
                    key: key.to_string(),
                });
            }

            if inner.config.sync_on_write {
                flush_wal(&mut inner, true, &mut events)?;
            }
        }

        self.notify_driver();
        self.emit_all(events);
        Ok(())
    }

    /// Empty the store: cache, Index, Data Log and WAL are all cleared and a
    /// fresh (empty) checkpoint is written durably.
    pub fn clear(&self) -> Result<()> {
        let mut events = Vec::new();

        {
            let mut inner = self.inner.lock();
            if inner.state != LifecycleState::Open {
                return Err(Error::Lifecycle("engine is closing or closed".into()));
            }

            let old_size = inner.index.live_bytes();
            inner.cache.clear();
            inner.dirty.clear();
            inner.pending.clear();
            inner.ttl.clear();
            inner.index.clear();
            inner.data_log.truncate()?;
            inner.wal.truncate(true)?;
            inner.stats.wasted_space = 0;

            let now = now_ms();
            checkpoint::write_checkpoint(
                &inner.config.index_path,
                inner.index.as_map(),
                inner.checkpoint_stats,
                now,
                true,
            )?;
            inner.checkpoint_stats.checkpoints += 1;
            inner.checkpoint_stats.last_checkpoint_time = now;
            inner.stats.checkpoints = inner.checkpoint_stats.checkpoints;
            inner.stats.last_checkpoint_time = now;

            events.push(Event::Clear { old_size });
        }

        self.notify_driver();
        self.emit_all(events);
        Ok(())
    }

    /// All keys currently in the Index. Empty once closing or closed.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock();
        if matches!(inner.state, LifecycleState::Closing | LifecycleState::Closed) {
            return Vec::new();
        }
        inner.index.keys().map(String::from).collect()
    }

    /// Number of keys currently in the Index. `0` once closing or closed.
    pub fn size(&self) -> usize {
        let inner = self.inner.lock();
        if matches!(inner.state, LifecycleState::Closing | LifecycleState::Closed) {
            return 0;
        }
        inner.index.size()
    }

    /// Force a data flush followed by a WAL flush, outside the usual
    /// background-driver cadence.
    pub fn flush(&self, force_sync: bool) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            flush_data(&mut inner, force_sync, &mut events)?;
            flush_wal(&mut inner, force_sync, &mut events)?;
        }
        self.emit_all(events);
        Ok(())
    }

    /// Force a checkpoint, outside the usual background-driver cadence.
    pub fn checkpoint(&self, force_sync: bool) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            checkpoint_now(&mut inner, force_sync, false, &mut events)?;
        }
        self.emit_all(events);
        Ok(())
    }

    /// Force compaction of the Data Log, outside the usual background-driver
    /// cadence. Fails if the engine is not `Open` (already compacting, or
    /// closing/closed).
    pub fn compact(&self) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            run_compaction(&mut inner, &mut events)?;
        }
        self.emit_all(events);
        Ok(())
    }

    /// Snapshot of the engine's running counters.
    pub fn get_stats(&self) -> Stats {
        let inner = self.inner.lock();
        let mut stats = inner.stats;
        stats.active_keys = inner.index.size() as u64;
        stats.memory_store_keys = inner.cache.len() as u64;
        stats.pending_data_writes = inner.dirty.len() as u64;
        stats.pending_index_changes = inner.pending.len() as u64;
        stats.wal_size_bytes = inner.wal.size();
        stats.data_file_size = inner.data_log.len().unwrap_or(stats.data_file_size);
        stats.index_size_bytes = estimate_index_bytes(&inner.index);
        stats
    }

    /// Idempotent, terminal shutdown: stops the background driver, flushes
    /// and checkpoints everything durably, then marks the engine closed.
    /// Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if matches!(inner.state, LifecycleState::Closing | LifecycleState::Closed) {
                return Ok(());
            }
            inner.state = LifecycleState::Closing;
        }
        self.observer.emit(Event::Closing);

        if let Some(driver) = self.driver.lock().take() {
            driver.stop();
        }

        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner.ttl.clear();
            flush_data(&mut inner, true, &mut events)?;
            flush_wal(&mut inner, true, &mut events)?;
            checkpoint_now(&mut inner, true, true, &mut events)?;
            inner.state = LifecycleState::Closed;
        }
        self.emit_all(events);
        self.observer.emit(Event::Close);
        Ok(())
    }

    fn notify_driver(&self) {
        if let Some(driver) = self.driver.lock().as_ref() {
            driver.notify();
        }
    }

    fn emit_all(&self, events: Vec<Event>) {
        for event in events {
            self.observer.emit(event);
        }
    }
}

/// One background-driver tick: TTL sweep, deferred data flush, deferred WAL
/// flush, and the periodic checkpoint/compaction checks, all under a single
/// lock acquisition.
fn run_tick(inner: &mut EngineInner) -> Vec<Event> {
    let mut events = Vec::new();
    if inner.state != LifecycleState::Open {
        return events;
    }
    let now = now_ms();

    expire_due(inner, now, &mut events);

    if let Err(e) = flush_data(inner, inner.config.sync_on_write, &mut events) {
        events.push(Event::Error {
            message: format!("background data flush failed: {e}"),
        });
    }
    if let Err(e) = flush_wal(inner, inner.config.sync_on_write, &mut events) {
        events.push(Event::Error {
            message: format!("background WAL flush failed: {e}"),
        });
    }
    if let Err(e) = maybe_periodic_checkpoint(inner, now, &mut events) {
        events.push(Event::Error {
            message: format!("periodic checkpoint failed: {e}"),
        });
    }
    if let Err(e) = maybe_auto_compact(inner, now, &mut events) {
        events.push(Event::Warn {
            message: format!("periodic compaction check failed: {e}"),
        });
    }

    events
}

fn expire_due(inner: &mut EngineInner, now: i64, events: &mut Vec<Event>) {
    let expired = inner.ttl.find_expired(now);
    for key in expired {
        if internal_delete(inner, &key).is_some() {
            events.push(Event::Expired { key });
        }
    }
}

/// Shared removal path for `delete()` and TTL expiry: drops the key from the
/// Index, cache, dirty set and TTL table, and queues a WAL delete.
fn internal_delete(inner: &mut EngineInner, key: &str) -> Option<RecordMeta> {
    let removed = inner.index.delete(key);
    if let Some(meta) = removed {
        inner.stats.wasted_space += meta.size as u64;
        inner.pending.insert(key.to_string(), PendingChange::Delete);
        inner.stats.deletes += 1;
    }
    inner.cache.remove(key);
    inner.dirty.remove(key);
    inner.ttl.remove(key);
    removed
}

/// Read and decode the record `meta` points at.
fn read_record(inner: &mut EngineInner, meta: RecordMeta) -> Result<Value> {
    let bytes = inner.data_log.read_exact(meta.offset, meta.size)?;
    let (value, _) = serializer::decode(&bytes)?;
    Ok(value)
}

/// Insert `key`/`value` into the read cache. A key still in the dirty set
/// must never be lost to LRU pressure (invariant: every dirty key has a live
/// cache entry), so if inserting evicts a dirty victim, that victim is
/// persisted to the Data Log immediately, before the eviction can drop it.
fn cache_insert(inner: &mut EngineInner, key: String, value: Value) -> Result<()> {
    if let Some((evicted_key, evicted_value)) = inner.cache.insert(key, value) {
        if inner.dirty.remove(&evicted_key) {
            persist_value(inner, &evicted_key, &evicted_value)?;
        }
    }
    Ok(())
}

/// Encode and append `key`'s current value to the Data Log, install the
/// resulting metadata in the Index, and queue it as a pending WAL change.
fn persist_value(inner: &mut EngineInner, key: &str, value: &Value) -> Result<()> {
    let bytes = serializer::encode(value)?;
    let offset = inner.data_log.next_offset();
    inner.data_log.append(&bytes, offset)?;

    if let Some(old) = inner.index.get(key) {
        inner.stats.wasted_space += old.size as u64;
    }
    let type_tag = bytes[0];
    let expiry = inner.ttl.expiry_of(key);
    let meta = RecordMeta::new(offset, bytes.len() as u32, type_tag).with_expiry(expiry);
    inner.index.set(key.to_string(), meta);
    inner.pending.insert(key.to_string(), PendingChange::Set(meta));
    inner.stats.bytes_written_to_data_file += bytes.len() as u64;
    Ok(())
}

/// Encode and append every dirty key's current cached value to the Data Log,
/// install the resulting metadata in the Index, and queue it as a pending
/// WAL change. Per-key failures put the key back in the dirty set for the
/// next attempt rather than losing it.
fn flush_data(inner: &mut EngineInner, force_sync: bool, events: &mut Vec<Event>) -> Result<()> {
    if inner.dirty.is_empty() {
        return Ok(());
    }

    let keys: Vec<String> = inner.dirty.drain().collect();
    let mut retry = Vec::new();
    let mut flushed = 0usize;

    for key in keys {
        // Dirty keys are pinned in the cache (see `cache_insert`), so this
        // can only miss if the key was never cached in the first place,
        // which never happens on the `set()` path that marks it dirty.
        let value = inner
            .cache
            .peek(&key)
            .cloned()
            .expect("dirty keys are pinned in the cache until flushed");

        match persist_value(inner, &key, &value) {
            Ok(()) => flushed += 1,
            Err(_) => retry.push(key),
        }
    }

    for key in retry {
        inner.dirty.insert(key);
    }

    if force_sync && flushed > 0 {
        inner.data_log.fsync()?;
    }
    if flushed > 0 {
        events.push(Event::DataFlush { count: flushed });
    }
    Ok(())
}

/// Drain the pending-change set into one WAL batch. On write failure the
/// batch is merged back in (last-writer-wins with whatever accumulated since)
/// and the tracked size is resynchronized against the file's real length.
fn flush_wal(inner: &mut EngineInner, force_sync: bool, events: &mut Vec<Event>) -> Result<()> {
    if inner.pending.is_empty() {
        return Ok(());
    }

    let batch: Vec<(String, PendingChange)> = inner.pending.drain().collect();
    let entries: Vec<haven_durability::WalEntry> = batch
        .iter()
        .map(|(key, change)| match change {
            PendingChange::Set(meta) => haven_durability::WalEntry::set(key.clone(), *meta),
            PendingChange::Delete => haven_durability::WalEntry::delete(key.clone()),
        })
        .collect();

    let do_sync = force_sync || inner.config.sync_on_write;
    match inner.wal.append_batch(&entries, do_sync) {
        Ok(written) => {
            inner.stats.bytes_written_to_wal += written;
            events.push(Event::IndexWalFlush {
                count: entries.len(),
            });
            if inner.wal.size() >= inner.config.checkpoint_wal_size_threshold {
                checkpoint_now(inner, false, false, events)?;
            }
        }
        Err(e) => {
            for (key, change) in batch {
                inner.pending.insert(key, change);
            }
            inner.wal.resync_size()?;
            return Err(e);
        }
    }
    Ok(())
}

/// Write a checkpoint and truncate the WAL on success. Re-entrant calls while
/// one is already running are skipped unless `during_close`, which also
/// skips the redundant WAL flush a normal checkpoint performs first (the
/// caller has already flushed everything by then).
fn checkpoint_now(
    inner: &mut EngineInner,
    force_sync: bool,
    during_close: bool,
    events: &mut Vec<Event>,
) -> Result<()> {
    if inner.checkpoint_running && !during_close {
        return Ok(());
    }
    inner.checkpoint_running = true;
    events.push(Event::CheckpointStart);

    if !during_close {
        flush_wal(inner, force_sync, events)?;
    }

    let now = now_ms();
    let write_result = checkpoint::write_checkpoint(
        &inner.config.index_path,
        inner.index.as_map(),
        inner.checkpoint_stats,
        now,
        force_sync || inner.config.sync_on_write,
    );
    inner.checkpoint_running = false;

    match write_result {
        Ok(()) => {
            inner.wal.truncate(force_sync || inner.config.sync_on_write)?;
            inner.checkpoint_stats.checkpoints += 1;
            inner.checkpoint_stats.last_checkpoint_time = now;
            inner.stats.checkpoints = inner.checkpoint_stats.checkpoints;
            inner.stats.last_checkpoint_time = now;
            let size = std::fs::metadata(&inner.config.index_path)
                .map(|m| m.len())
                .unwrap_or(0);
            events.push(Event::CheckpointEnd { size });
            Ok(())
        }
        Err(e) => {
            events.push(Event::Error {
                message: format!("checkpoint failed: {e}"),
            });
            Err(e)
        }
    }
}

fn maybe_periodic_checkpoint(
    inner: &mut EngineInner,
    now: i64,
    events: &mut Vec<Event>,
) -> Result<()> {
    if now - inner.last_checkpoint_check_ms < inner.config.checkpoint_interval_ms as i64 {
        return Ok(());
    }
    inner.last_checkpoint_check_ms = now;
    checkpoint_now(inner, false, false, events)
}

fn maybe_auto_compact(inner: &mut EngineInner, now: i64, events: &mut Vec<Event>) -> Result<()> {
    if now - inner.last_compact_check_ms < inner.config.compact_interval_ms as i64 {
        return Ok(());
    }
    inner.last_compact_check_ms = now;

    let data_file_size = inner.data_log.len()?;
    if data_file_size == 0 {
        return Ok(());
    }
    let ratio = inner.stats.wasted_space as f64 / data_file_size as f64;
    if ratio >= inner.config.compact_threshold {
        run_compaction(inner, events)?;
    }
    Ok(())
}

/// Rewrite the Data Log with only live values, dropping the dead space
/// accumulated by overwrites and deletes, then checkpoint the rebuilt Index
/// durably so recovery never needs the old file again.
fn run_compaction(inner: &mut EngineInner, events: &mut Vec<Event>) -> Result<()> {
    if inner.state != LifecycleState::Open {
        return Err(Error::Lifecycle(
            "cannot compact: engine is not open".into(),
        ));
    }

    inner.state = LifecycleState::Compacting;
    events.push(Event::CompactStart);

    flush_data(inner, true, events)?;
    flush_wal(inner, true, events)?;

    let compacting_path = temp_path_for(&inner.config.db_path);
    let build_result = build_compacted_log(inner, &compacting_path);

    inner.state = LifecycleState::Open;

    let new_index = match build_result {
        Ok(new_index) => new_index,
        Err(e) => {
            let _ = std::fs::remove_file(&compacting_path);
            events.push(Event::Error {
                message: format!("compaction failed: {e}"),
            });
            return Err(e);
        }
    };

    std::fs::rename(&compacting_path, &inner.config.db_path)?;
    inner.data_log.reopen()?;
    inner.index.replace_all(new_index.into_map());

    checkpoint_now(inner, true, false, events)?;

    inner.stats.wasted_space = 0;
    inner.stats.data_file_size = inner.data_log.len()?;
    inner.stats.compactions += 1;
    inner.stats.last_compaction_time = now_ms();
    events.push(Event::CompactEnd {
        new_size: inner.stats.data_file_size,
    });
    Ok(())
}

fn build_compacted_log(inner: &mut EngineInner, compacting_path: &Path) -> Result<Index> {
    let mut temp_log = DataLog::open(compacting_path)?;
    let mut new_index = Index::new();

    let keys: Vec<String> = inner.index.keys().map(String::from).collect();
    for key in keys {
        let meta = *inner
            .index
            .get(&key)
            .expect("key came from a snapshot of the same index");

        let value = match inner.cache.peek(&key) {
            Some(v) => v.clone(),
            None => {
                let bytes = inner.data_log.read_exact(meta.offset, meta.size)?;
                serializer::decode(&bytes)?.0
            }
        };

        let bytes = serializer::encode(&value)?;
        let offset = temp_log.append(&bytes, temp_log.next_offset())?;
        let new_meta = RecordMeta::new(offset, bytes.len() as u32, bytes[0]).with_expiry(meta.expiry);
        new_index.set(key, new_meta);
    }

    temp_log.fsync()?;
    Ok(new_index)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".compacting");
    path.with_file_name(name)
}

fn estimate_index_bytes(index: &Index) -> u64 {
    index
        .entries()
        .map(|(k, _)| k.len() as u64 + std::mem::size_of::<RecordMeta>() as u64)
        .sum()
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::Event;
    use parking_lot::Mutex as TestMutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingObserver {
        events: TestMutex<Vec<Event>>,
    }

    impl Observer for RecordingObserver {
        fn emit(&self, event: Event) {
            self.events.lock().push(event);
        }
    }

    fn config_in(dir: &tempfile::TempDir) -> EngineConfig {
        EngineConfig::default()
            .with_db_path(dir.path().join("kv.db"))
            .with_index_path(dir.path().join("kv.index"))
            .with_flush_interval_ms(None)
            .with_checkpoint_interval_ms(u64::MAX / 2)
            .with_compact_interval_ms(u64::MAX / 2)
    }

    #[test]
    fn set_then_get_round_trips_through_the_cache() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(config_in(&dir)).unwrap();

        engine
            .set("user:1", Value::String("alice".into()), None)
            .unwrap();
        assert_eq!(
            engine.get("user:1").unwrap(),
            Some(Value::String("alice".into()))
        );
        assert!(engine.has("user:1"));
        engine.close().unwrap();
    }

    #[test]
    fn get_of_missing_key_is_a_miss_not_an_error() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(config_in(&dir)).unwrap();
        assert_eq!(engine.get("nope").unwrap(), None);
        assert!(!engine.has("nope"));
        engine.close().unwrap();
    }

    #[test]
    fn delete_removes_a_key() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(config_in(&dir)).unwrap();
        engine.set("a", Value::Number(1.0), None).unwrap();
        engine.delete("a").unwrap();
        assert!(!engine.has("a"));
        assert_eq!(engine.get("a").unwrap(), None);
        engine.close().unwrap();
    }

    #[test]
    fn explicit_zero_ttl_cancels_a_prior_ttl() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(config_in(&dir)).unwrap();
        engine
            .set("a", Value::Bool(true), Some(1_000_000))
            .unwrap();
        engine.set("a", Value::Bool(true), Some(0)).unwrap();
        {
            let inner = engine.inner.lock();
            assert!(!inner.ttl.contains("a"));
        }
        engine.close().unwrap();
    }

    #[test]
    fn data_survives_a_reopen_after_flush_and_checkpoint() {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open(config_in(&dir)).unwrap();
            engine
                .set("a", Value::String("persisted".into()), None)
                .unwrap();
            engine.flush(true).unwrap();
            engine.checkpoint(true).unwrap();
            engine.close().unwrap();
        }
        {
            let engine = Engine::open(config_in(&dir)).unwrap();
            assert_eq!(
                engine.get("a").unwrap(),
                Some(Value::String("persisted".into()))
            );
            engine.close().unwrap();
        }
    }

    #[test]
    fn data_survives_a_reopen_via_wal_replay_without_a_checkpoint() {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open(config_in(&dir)).unwrap();
            engine.set("a", Value::Number(7.0), None).unwrap();
            engine.flush(true).unwrap(); // data + WAL durable, no checkpoint
            engine.close().unwrap();
        }
        {
            let engine = Engine::open(config_in(&dir)).unwrap();
            assert_eq!(engine.get("a").unwrap(), Some(Value::Number(7.0)));
            engine.close().unwrap();
        }
    }

    #[test]
    fn empty_key_is_rejected_with_a_configuration_error() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(config_in(&dir)).unwrap();
        let err = engine.set("", Value::Null, None).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        engine.close().unwrap();
    }

    #[test]
    fn clear_empties_the_store_and_persists_that_emptiness() {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open(config_in(&dir)).unwrap();
            engine.set("a", Value::Null, None).unwrap();
            engine.set("b", Value::Null, None).unwrap();
            engine.clear().unwrap();
            assert_eq!(engine.size(), 0);
            engine.close().unwrap();
        }
        {
            let engine = Engine::open(config_in(&dir)).unwrap();
            assert_eq!(engine.size(), 0);
            engine.close().unwrap();
        }
    }

    #[test]
    fn compaction_preserves_live_values_and_reclaims_wasted_space() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(config_in(&dir)).unwrap();

        engine.set("a", Value::String("v1".into()), None).unwrap();
        for i in 0..5 {
            engine
                .set("a", Value::String(format!("v{i}")), None)
                .unwrap();
            engine.flush(true).unwrap();
        }
        engine.set("b", Value::Number(42.0), None).unwrap();
        engine.flush(true).unwrap();

        let before = engine.get_stats();
        assert!(before.wasted_space > 0);

        engine.compact().unwrap();

        let after = engine.get_stats();
        assert_eq!(after.wasted_space, 0);
        assert_eq!(engine.get("a").unwrap(), Some(Value::String("v4".into())));
        assert_eq!(engine.get("b").unwrap(), Some(Value::Number(42.0)));
        engine.close().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(config_in(&dir)).unwrap();
        engine.close().unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn writes_after_close_fail_with_a_lifecycle_error() {
        let dir = tempdir().unwrap();
        let engine = Engine::open(config_in(&dir)).unwrap();
        engine.close().unwrap();
        let err = engine.set("a", Value::Null, None).unwrap_err();
        assert!(matches!(err, Error::Lifecycle(_)));
        assert_eq!(engine.get("a").unwrap(), None);
        assert_eq!(engine.keys().len(), 0);
    }

    #[test]
    fn observer_sees_ready_then_set_then_close() {
        let dir = tempdir().unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let engine = Engine::open_with_observer(config_in(&dir), observer.clone()).unwrap();
        engine.set("a", Value::Null, None).unwrap();
        engine.close().unwrap();

        let events = observer.events.lock();
        assert!(matches!(events.first(), Some(Event::Ready)));
        assert!(events.iter().any(|e| matches!(e, Event::Set { .. })));
        assert!(matches!(events.last(), Some(Event::Close)));
    }

    #[test]
    fn ttl_expiry_is_swept_by_the_background_driver() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir).with_flush_interval_ms(Some(10));
        let engine = Engine::open(config).unwrap();

        engine.set("short", Value::Bool(true), Some(50)).unwrap();
        assert!(engine.has("short"));

        std::thread::sleep(Duration::from_millis(300));
        assert!(!engine.has("short"));
        assert_eq!(engine.get("short").unwrap(), None);
        engine.close().unwrap();
    }

    #[test]
    fn sync_on_write_persists_immediately_without_an_explicit_flush() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir).with_sync_on_write(true);
        {
            let engine = Engine::open(config.clone()).unwrap();
            engine.set("a", Value::Number(1.0), None).unwrap();
            // deliberately no flush()/checkpoint() before close
            engine.close().unwrap();
        }
        {
            let engine = Engine::open(config).unwrap();
            assert_eq!(engine.get("a").unwrap(), Some(Value::Number(1.0)));
            engine.close().unwrap();
        }
    }

    #[test]
    fn a_dirty_write_survives_being_pushed_out_of_a_tiny_cache() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir).with_max_memory_keys(Some(2));
        let engine = Engine::open(config).unwrap();

        // Cache holds 2 keys; setting a third evicts "a" from the cache
        // before the engine ever gets a chance to flush it on its own.
        engine.set("a", Value::Number(1.0), None).unwrap();
        engine.set("b", Value::Number(2.0), None).unwrap();
        engine.set("c", Value::Number(3.0), None).unwrap();

        engine.flush(true).unwrap();
        assert_eq!(engine.size(), 3);
        assert_eq!(engine.get("a").unwrap(), Some(Value::Number(1.0)));
        assert_eq!(engine.get("b").unwrap(), Some(Value::Number(2.0)));
        assert_eq!(engine.get("c").unwrap(), Some(Value::Number(3.0)));
        engine.close().unwrap();
    }

    #[test]
    fn a_corrupt_record_is_reported_as_a_miss_not_an_error_return() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        let engine = Engine::open(config.clone()).unwrap();

        engine.set("a", Value::Number(1.0), None).unwrap();
        engine.flush(true).unwrap();
        {
            // Evict "a" from the cache so `get` has to hit the Data Log.
            let mut inner = engine.inner.lock();
            inner.cache.clear();
        }

        // Truncate the Data Log out from under the Index entry for "a".
        std::fs::write(&config.db_path, b"").unwrap();

        assert_eq!(engine.get("a").unwrap(), None);
        engine.close().unwrap();
    }
}
