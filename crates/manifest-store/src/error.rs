//! Error types for the record store

use manifest_model::RecordName;
use std::path::PathBuf;

/// Errors raised by a [`RecordStore`](crate::RecordStore)
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record stored under this name
    #[error("record not found: {0}")]
    NotFound(RecordName),

    /// Create-if-absent lost: a record already exists
    #[error("record already exists: {0}")]
    AlreadyExists(RecordName),

    /// Resolved record path is not a direct child of the store root
    #[error("record path escapes store root: {}", path.display())]
    PathEscape { path: PathBuf },

    /// Stored document could not be decoded into a valid record
    #[error("malformed record document {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    /// Record could not be encoded
    #[error("encode error: {0}")]
    Encode(String),

    /// Store root is missing or not a directory
    #[error("unusable store root {}: {reason}", path.display())]
    Root { path: PathBuf, reason: String },

    /// IO error while reading or writing
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create malformed-document error for path
    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this failure is the server's fault rather than the caller's
    #[inline]
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. } | Self::Encode(_) | Self::Root { .. } | Self::Io { .. }
        )
    }
}
