//! Observer pattern: the engine's only way of talking to the outside world
//! about what it's doing, besides its public method return values.
//!
//! Replaces a language-specific emitter base class with a plain trait.
//! Dispatch to multiple listeners, if a caller wants that, is the
//! implementation's problem — the engine only ever calls `emit` once per
//! event.

use haven_core::Value;

/// One occurrence the engine reports to its observer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The engine finished opening and recovery.
    Ready,
    /// An error occurred that the engine locally recovered from.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// A key was written.
    Set {
        /// The key written.
        key: String,
        /// The value written.
        value: Value,
    },
    /// A key was read successfully.
    Get {
        /// The key read.
        key: String,
        /// The value returned.
        value: Value,
    },
    /// A `get` found no entry for the key.
    Miss {
        /// The key that was missing.
        key: String,
    },
    /// A key was removed.
    Delete {
        /// The key removed.
        key: String,
    },
    /// A key was removed by TTL expiry.
    Expired {
        /// The key that expired.
        key: String,
    },
    /// A data flush completed.
    DataFlush {
        /// Number of keys flushed.
        count: usize,
    },
    /// A WAL flush completed.
    IndexWalFlush {
        /// Number of entries flushed.
        count: usize,
    },
    /// Compaction began.
    CompactStart,
    /// Compaction completed.
    CompactEnd {
        /// New Data Log size in bytes.
        new_size: u64,
    },
    /// A checkpoint began.
    CheckpointStart,
    /// A checkpoint completed.
    CheckpointEnd {
        /// Base index file size in bytes.
        size: u64,
    },
    /// `clear()` emptied the store.
    Clear {
        /// Live bytes the Index referenced before clearing.
        old_size: u64,
    },
    /// `close()` began its shutdown sequence.
    Closing,
    /// `close()` finished; the engine is now terminal.
    Close,
    /// A recoverable problem worth surfacing to the caller.
    Warn {
        /// Human-readable description.
        message: String,
    },
    /// A diagnostic message.
    Log {
        /// Human-readable message.
        message: String,
    },
    /// WAL replay finished during open/recovery.
    WalReplayed {
        /// Number of WAL entries successfully replayed.
        replayed_ops: usize,
        /// Index size after replay.
        final_index_size: usize,
    },
}

/// Receives `Event`s emitted by an `Engine`.
pub trait Observer: Send + Sync {
    /// Handle one emitted event.
    fn emit(&self, event: Event);
}

/// An `Observer` that discards every event. The engine's default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn emit(&self, _event: Event) {}
}
