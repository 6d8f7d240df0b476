//! Centralized error types for postbox.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::EmailId;

/// All errors produced by the postbox library.
///
/// Irregular but recoverable input (missing boundary, unknown encodings,
/// bad dates, corrupt base64) never surfaces here; those cases take a
/// named fallback branch in the parser instead.
#[derive(Error, Debug)]
pub enum PostboxError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified message file does not exist.
    #[error("Message file not found: {0}")]
    FileNotFound(PathBuf),

    /// The header section cannot be separated from the body.
    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },

    /// The message exceeds the configured size limit.
    #[error("Message of {size} bytes exceeds the limit of {limit} bytes")]
    MessageTooLarge { size: u64, limit: u64 },

    /// No stored email has the requested identity.
    #[error("Email {0} not found")]
    EmailNotFound(EmailId),
}

/// Convenience alias for `Result<T, PostboxError>`.
pub type Result<T> = std::result::Result<T, PostboxError>;

impl PostboxError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `MalformedMessage` variant.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for PostboxError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
