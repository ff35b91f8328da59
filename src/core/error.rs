//! Error types for volume streaming

use thiserror::Error;

/// Main error type for the crate
///
/// Cache misses and budget pressure are not errors: `try_get` returns
/// `Option` and eviction runs silently. Only decode, I/O, descriptor and
/// GPU failures surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// A frame chunk could not be decoded. Retryable: the pool keeps the
    /// entry around flagged as failed and re-enqueues it on the next
    /// request.
    #[error("decode error on frame {frame}: {reason}")]
    Decode { frame: u32, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sequence error: {0}")]
    Sequence(String),

    #[error("GPU error: {0}")]
    Gpu(String),
}
