//! Validated names carried by a manifest record
//!
//! Provides [`RecordName`], [`DisplayName`], [`CatalogName`] and [`IncludedRef`].
//! Each type can only be built through its parser, so holding one is proof
//! the value passed validation.

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Longest record name accepted (one path component on common filesystems)
pub const MAX_RECORD_NAME_LEN: usize = 255;

/// Longest display name kept after sanitization
pub const MAX_DISPLAY_NAME_LEN: usize = 100;

/// Longest included manifest reference accepted
pub const MAX_REF_LEN: usize = 255;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>?").expect("static regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static REF_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("static regex"));

/// Client identifier, also the on-disk file name of the record
///
/// Only `[A-Za-z0-9_-]` is accepted, so a `RecordName` can never contain a
/// path separator, a dot segment or a NUL byte.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordName(String);

impl RecordName {
    /// Validate a raw client identifier
    ///
    /// # Errors
    /// Empty, too long, or containing anything outside `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::EmptyRecordName);
        }
        if raw.len() > MAX_RECORD_NAME_LEN {
            return Err(ValidationError::RecordNameTooLong {
                len: raw.len(),
                max: MAX_RECORD_NAME_LEN,
            });
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(ValidationError::InvalidRecordName);
        }
        Ok(Self(raw.to_string()))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for RecordName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RecordName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Human-readable label for a client
///
/// Markup is stripped, the character set is restricted to
/// `[A-Za-z0-9 ._'()-]`, whitespace is collapsed and the result is cut to
/// [`MAX_DISPLAY_NAME_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    /// Sanitize and validate a raw display name
    ///
    /// # Errors
    /// Returns [`ValidationError::EmptyDisplayName`] if nothing survives
    /// sanitization.
    pub fn sanitize(raw: &str) -> Result<Self, ValidationError> {
        let untagged = TAG_RE.replace_all(raw, "");
        let filtered: String = untagged
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .filter(|c| {
                c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-' | '\'' | '(' | ')')
            })
            .collect();
        let collapsed = WHITESPACE_RE.replace_all(filtered.trim(), " ");
        let truncated: String = collapsed.chars().take(MAX_DISPLAY_NAME_LEN).collect();
        let truncated = truncated.trim_end();

        if truncated.is_empty() {
            return Err(ValidationError::EmptyDisplayName);
        }
        Ok(Self(truncated.to_string()))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for DisplayName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::sanitize(&raw).map_err(serde::de::Error::custom)
    }
}

impl Display for DisplayName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Software catalog tag drawn from the configured allow-list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogName(String);

impl CatalogName {
    /// Accept `raw` only if it appears verbatim in `allowed`
    ///
    /// # Errors
    /// Returns [`ValidationError::CatalogNotAllowed`] otherwise.
    pub fn parse<S: AsRef<str>>(raw: &str, allowed: &[S]) -> Result<Self, ValidationError> {
        if allowed.iter().any(|a| a.as_ref() == raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::CatalogNotAllowed(raw.to_string()))
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CatalogName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to another manifest in the waterfall inclusion list
///
/// Path-like: `segment(/segment)*`, segments of `[A-Za-z0-9_.-]`, no dot
/// segments, no leading or trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncludedRef(String);

impl IncludedRef {
    /// Validate a raw manifest reference
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidReference`] if the value is not path-like.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidReference(raw.to_string());

        if raw.is_empty() || raw.len() > MAX_REF_LEN {
            return Err(invalid());
        }
        for segment in raw.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(invalid());
            }
            if !REF_SEGMENT_RE.is_match(segment) {
                return Err(invalid());
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// Whether this reference names the given record
    #[inline]
    #[must_use]
    pub fn refers_to(&self, name: &RecordName) -> bool {
        self.0 == name.as_str()
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IncludedRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
