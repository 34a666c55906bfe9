//! Protocol errors
//!
//! [`EnrollError`] is the single error type an operation can end in.
//! [`EnrollError::status_code`] is the only place an error becomes a status.

use crate::config::ConfigError;
use crate::request::ParseFailure;
use manifest_model::{RecordName, ValidationError};
use manifest_store::StoreError;

/// Message returned to callers for every server-side failure
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Identity gate rejections
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SecurityViolation {
    /// Presented token differs from the stored one, or none was presented
    #[error("identity token does not match")]
    IdentityMismatch,

    /// Fetch against a record that has no stored token
    #[error("record has no identity token")]
    MissingIdentity,
}

/// Protocol operation failure
#[derive(Debug, thiserror::Error)]
pub enum EnrollError {
    /// Malformed or missing input
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Record absent
    #[error("record not found: {0}")]
    NotFound(RecordName),

    /// Enroll against an existing record
    #[error("record already exists: {0}")]
    Conflict(RecordName),

    /// Identity gate refused the caller
    #[error("security violation: {0}")]
    Security(#[from] SecurityViolation),

    /// I/O failure, malformed stored document or broken configuration
    #[error("server error: {0}")]
    Server(String),
}

impl EnrollError {
    /// HTTP status for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Security(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Server(_) => 500,
        }
    }

    /// Message safe to show the caller
    ///
    /// Server errors are reduced to [`INTERNAL_ERROR_MESSAGE`]; their detail
    /// is only available through `Display`.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Server(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            Self::Security(_) => "access denied".to_string(),
            other => other.to_string(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server(_))
    }
}

impl From<StoreError> for EnrollError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => Self::NotFound(name),
            StoreError::AlreadyExists(name) => Self::Conflict(name),
            StoreError::PathEscape { .. } => Self::Validation(ValidationError::PathEscape),
            other => Self::Server(other.to_string()),
        }
    }
}

impl From<ConfigError> for EnrollError {
    fn from(err: ConfigError) -> Self {
        Self::Server(err.to_string())
    }
}

impl From<ParseFailure> for EnrollError {
    fn from(err: ParseFailure) -> Self {
        match err {
            ParseFailure::Invalid(e) => Self::Validation(e),
            ParseFailure::Config(e) => e.into(),
        }
    }
}
