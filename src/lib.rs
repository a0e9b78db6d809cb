//! # havenkv
//!
//! An embedded, single-process, persistent key-value store: an append-only
//! Data Log for values, an in-memory Index of where to find them, and a
//! write-ahead log + checkpoint pair for crash recovery.
//!
//! # Quick Start
//!
//! ```no_run
//! use havenkv::{Engine, EngineConfig, Value};
//!
//! fn main() -> havenkv::Result<()> {
//!     let engine = Engine::open(
//!         EngineConfig::default()
//!             .with_db_path("data/kv.db")
//!             .with_index_path("data/kv.index"),
//!     )?;
//!
//!     engine.set("user:1", Value::String("alice".into()), None)?;
//!     assert_eq!(engine.get("user:1")?, Some(Value::String("alice".into())));
//!
//!     engine.set("session:1", Value::Bool(true), Some(60_000))?; // expires in 60s
//!     engine.delete("user:1")?;
//!     engine.close()?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`Engine`] is the entry point; all reads and writes go through it. It
//! coordinates four internal crates not exposed here: `haven-core` (the
//! `Value` type, binary framing, shared error taxonomy), `haven-storage`
//! (the Data Log and Index), `haven-durability` (WAL, checkpoint, crash
//! recovery) and the engine's own TTL table, LRU cache and background
//! driver. Observability is opt-in via [`Observer`]; the engine logs
//! nothing callers don't ask for.

pub use haven_core::{Error, Result, Value};
pub use haven_engine::{Engine, EngineConfig, Event, NoopObserver, Observer, Stats};
