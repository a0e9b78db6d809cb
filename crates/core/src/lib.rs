//! Core types shared by every havenkv crate.
//!
//! - `Value`: the unified value type stored under each key.
//! - `serializer`: binary framing of a `Value` for the Data Log and WAL.
//! - `types::RecordMeta`: per-key metadata held by the Index.
//! - `error`: the error taxonomy used across the workspace.
//! - `limits`: key-length and nesting-depth bounds enforced at the boundary.

#![warn(missing_docs)]

pub mod error;
pub mod limits;
pub mod serializer;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use limits::{validate_key, MAX_KEY_LEN, MAX_NESTING_DEPTH};
pub use types::RecordMeta;
pub use value::Value;
