//! Error taxonomy shared by every havenkv crate.
//!
//! Mirrors the propagation policy in the design doc: configuration and
//! serialization failures are local to the caller's operation, I/O and
//! corruption failures are handled by the layer that can retry or degrade
//! (the engine), and lifecycle errors reject an operation without any state
//! change.

use std::io;
use thiserror::Error;

/// Result type alias used throughout havenkv.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for havenkv operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid key or configuration value (e.g. an empty key).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Underlying file I/O failure (open/read/write/fsync/rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record or log entry was malformed on read.
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Operation rejected because of the engine's current lifecycle state.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

impl Error {
    /// True for failures that a caller could plausibly retry (I/O
    /// transients); false for ones that won't change on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
