//! Error types.
//!
//! Per-line parsing problems are never errors: they are recorded as
//! [`Anomaly`](crate::Anomaly) values on the receipt. [`ParseError`] is kept
//! for contract violations at the parser boundary.

use thiserror::Error;

/// Fatal errors raised by the parser entry point.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("store id must not be empty")]
    EmptyStoreId,

    #[error("receipt text is {len} bytes, limit is {max}")]
    InputTooLarge { len: usize, max: usize },

    /// A built-in line pattern failed to compile.
    #[error("invalid receipt pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Failure of the AI fallback collaborator.
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("no fallback parser configured")]
    NotConfigured,

    #[error("fallback request failed: {0}")]
    Request(String),

    #[error("fallback returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("fallback timed out after {0}s")]
    Timeout(u64),

    #[error("fallback cancelled")]
    Cancelled,
}
