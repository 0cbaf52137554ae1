//! Error kinds produced by the index engine.
//!
//! Mirrors the flat enum-of-causes shape the storage core used for
//! `BognError`, widened to the kinds a pattern-matching index needs to
//! report to its host: a bad pattern, an allocator failure, an interrupted
//! scan, or an on-disk marker that doesn't match what's in memory.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BiscuitError {
    #[error("invalid pattern: {reason}")]
    InvalidPattern { reason: String },

    #[error("out of memory during index build or growth")]
    OutOfMemory,

    #[error("operation cancelled by interrupt")]
    Cancelled,

    #[error("index integrity check failed: {reason}")]
    Integrity { reason: String },
}

pub type Result<T> = std::result::Result<T, BiscuitError>;
