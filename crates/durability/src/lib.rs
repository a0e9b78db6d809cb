//! WAL, checkpoint, and crash-recovery protocol for havenkv's Index.

#![warn(missing_docs)]

pub mod checkpoint;
pub mod recovery;
pub mod wal;

pub use checkpoint::CheckpointStats;
pub use recovery::{recover, Recovered};
pub use wal::{Wal, WalEntry, WalOp};
