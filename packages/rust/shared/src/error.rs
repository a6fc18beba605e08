//! Error types for acctfetch.
//!
//! Library crates use [`AcctFetchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all acctfetch operations.
#[derive(Debug, thiserror::Error)]
pub enum AcctFetchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an external collaborator.
    #[error("network error: {0}")]
    Network(String),

    /// The identity source failed mid-iteration. Fatal for a run.
    #[error("identity source error: {0}")]
    Source(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad config value, malformed payload, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// One or more records could not be enriched. Carries no per-record
    /// detail so it is safe to surface to callers as-is.
    #[error("some records could not be fetched")]
    Incomplete { failed: usize },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AcctFetchError>;

impl AcctFetchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a single document lookup did not produce a payload.
///
/// Every variant is recovered locally as a failure record; none of them
/// abort a run on their own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// The store has no document under this key.
    #[error("document not found: {key}")]
    NotFound { key: String },

    /// Network, status, or decoding failure. Not retried.
    #[error("lookup failed: {0}")]
    Transient(String),

    /// The lookup task panicked before producing an outcome.
    #[error("lookup task aborted: {0}")]
    Aborted(String),
}

impl LookupError {
    /// Create a not-found error for `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
