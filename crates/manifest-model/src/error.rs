//! Validation errors for record fields
//!
//! Every variant maps to a 400 at the endpoint. None of them are raised after
//! the store has been touched.

/// Input validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required parameter was not supplied
    #[error("missing required parameter: {0}")]
    Missing(&'static str),

    /// Record name is empty
    #[error("record name is empty")]
    EmptyRecordName,

    /// Record name contains characters outside `[A-Za-z0-9_-]`
    #[error("record name contains invalid characters")]
    InvalidRecordName,

    /// Record name exceeds the file name limit
    #[error("record name too long: {len} bytes (max: {max})")]
    RecordNameTooLong { len: usize, max: usize },

    /// Display name is empty after sanitization
    #[error("display name is empty after sanitization")]
    EmptyDisplayName,

    /// Identity token is not in canonical form
    #[error("identity token is not a canonical hardware UUID")]
    InvalidIdentityToken,

    /// Catalog is not in the allow-list
    #[error("catalog not allowed: {0}")]
    CatalogNotAllowed(String),

    /// Included manifest reference is not path-like
    #[error("invalid manifest reference: {0}")]
    InvalidReference(String),

    /// More catalogs than a record may hold
    #[error("too many catalogs: {len} (max: {max})")]
    TooManyCatalogs { len: usize, max: usize },

    /// More included manifests than a record may hold
    #[error("too many included manifests: {len} (max: {max})")]
    TooManyReferences { len: usize, max: usize },

    /// Record includes itself
    #[error("record '{0}' cannot include itself")]
    SelfInclusion(String),

    /// Unknown protocol operation
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// Resolved path escapes the store root
    #[error("record path escapes the store root")]
    PathEscape,
}

impl ValidationError {
    /// Parameter this error concerns, when there is one
    #[must_use]
    pub fn parameter(&self) -> Option<&'static str> {
        match self {
            Self::Missing(name) => Some(*name),
            Self::EmptyRecordName
            | Self::InvalidRecordName
            | Self::RecordNameTooLong { .. }
            | Self::PathEscape => Some("recordname"),
            Self::EmptyDisplayName => Some("displayname"),
            Self::InvalidIdentityToken => Some("uuid"),
            Self::CatalogNotAllowed(_) | Self::TooManyCatalogs { .. } => Some("catalog"),
            Self::InvalidReference(_)
            | Self::TooManyReferences { .. }
            | Self::SelfInclusion(_) => Some("manifest"),
            Self::UnknownFunction(_) => Some("function"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_parameter() {
        let err = ValidationError::Missing("recordname");
        assert!(err.to_string().contains("recordname"));
        assert_eq!(err.parameter(), Some("recordname"));
    }

    #[test]
    fn path_escape_is_a_record_name_problem() {
        assert_eq!(ValidationError::PathEscape.parameter(), Some("recordname"));
    }
}
