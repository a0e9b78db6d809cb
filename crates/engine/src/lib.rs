//! Orchestrates writes, reads, TTL expiry, LRU caching and background
//! compaction/checkpointing on top of `haven-storage` and `haven-durability`.

#![warn(missing_docs)]

mod background;
mod config;
mod engine;
mod events;
mod lru;
mod stats;
mod ttl;

pub use config::EngineConfig;
pub use engine::Engine;
pub use events::{Event, NoopObserver, Observer};
pub use stats::Stats;
