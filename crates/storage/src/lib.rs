//! Append-only Data Log and in-memory Index for havenkv.

#![warn(missing_docs)]

pub mod data_log;
pub mod index;

pub use data_log::DataLog;
pub use index::Index;
