//! Error types for Tokenswap

use std::io;
use thiserror::Error;

/// Result type for Tokenswap operations
pub type Result<T> = std::result::Result<T, TokenSwapError>;

/// Errors that can occur while rewriting replayed traffic
#[derive(Debug, Error)]
pub enum TokenSwapError {
    /// I/O error on the frame stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input line could not be decoded into a frame
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Token could not be decoded or carried no subject claim
    #[error("Identity not found in token")]
    IdentityNotFound,

    /// Expected JSON field is absent
    #[error("JSON path not found: {0}")]
    PathNotFound(String),

    /// Shared store is unreachable; cache correctness cannot be guaranteed
    #[error("Shared store unavailable: {0}")]
    BackendUnavailable(String),

    /// Shared store rejected a single command
    #[error("Shared store error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TokenSwapError {
    /// Whether this error must stop the processing loop.
    ///
    /// Per-field failures (identity, path, malformed input) are recovered by
    /// skipping the affected step.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(TokenSwapError::BackendUnavailable("down".into()).is_fatal());
        assert!(TokenSwapError::Io(io::Error::other("broken pipe")).is_fatal());

        assert!(!TokenSwapError::IdentityNotFound.is_fatal());
        assert!(!TokenSwapError::PathNotFound("data.accessToken".into()).is_fatal());
        assert!(!TokenSwapError::MalformedFrame("empty".into()).is_fatal());
        assert!(!TokenSwapError::Backend("WRONGTYPE".into()).is_fatal());
    }
}
