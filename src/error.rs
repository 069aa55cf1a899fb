//! Error types for hopper.

use thiserror::Error;

/// Hopper error types.
///
/// Every fallible operation in the crate reports one of these kinds
/// synchronously at the call that caused it. Nothing is retried
/// internally; retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum HopperError {
    /// Text example violates the line grammar
    #[error("malformed example: {0}")]
    MalformedExample(String),

    /// Binary buffer ends before a declared length is satisfied
    #[error("truncated buffer: need {needed} bytes, {available} available")]
    TruncatedBuffer { needed: usize, available: usize },

    /// Namespace identifier does not fit the single-byte encoding
    #[error("namespace {0:?} does not fit the single-byte encoding")]
    UnsupportedNamespaceId(char),

    /// Weight index does not fit the selected index width
    #[error("weight index {index} does not fit a {width_bytes}-byte index")]
    IndexOverflow { index: u64, width_bytes: usize },

    /// The learning engine declined an operation
    #[error("engine rejected: {0}")]
    EngineRejected(String),

    /// Label attached to an example that already carries one
    #[error("example is already labeled")]
    AlreadyLabeled,

    /// Release called on an example that was already released
    #[error("example was already released")]
    AlreadyReleased,

    /// Handle does not refer to a current example (stale or never issued)
    #[error("invalid example handle")]
    InvalidExample,

    /// Operation called in the wrong lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Streaming source could not be opened or read
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[from] std::io::Error),

    /// Recognized engine option carries a malformed value
    #[error("bad option: {0}")]
    Config(String),
}

/// Result type alias for hopper operations.
pub type Result<T> = std::result::Result<T, HopperError>;
