//! Hardware identity tokens and the identity gate
//!
//! A record is locked to the first well-formed token it is given. The gate
//! decides, for a stored token and a candidate, whether the caller owns the
//! record.

use crate::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

/// Canonical hardware UUID, stored upper-case
///
/// Only the hyphenated 8-4-4-4-12 form is accepted. Because the value is
/// normalized on parse, `==` is a case-insensitive comparison of the
/// caller's input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Canonical textual length (`XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`)
    pub const LEN: usize = 36;

    /// Parse a token in canonical hyphenated form
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidIdentityToken`] for any other form,
    /// including braced, URN and unhyphenated UUIDs.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let hyphens_at_canonical_offsets = raw.len() == Self::LEN
            && raw
                .char_indices()
                .all(|(i, c)| matches!(i, 8 | 13 | 18 | 23) == (c == '-'));
        if !hyphens_at_canonical_offsets {
            return Err(ValidationError::InvalidIdentityToken);
        }
        let uuid = Uuid::parse_str(raw).map_err(|_| ValidationError::InvalidIdentityToken)?;
        let mut buf = Uuid::encode_buffer();
        Ok(Self(uuid.hyphenated().encode_upper(&mut buf).to_string()))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IdentityToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for IdentityToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Outcome of checking a candidate token against a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityVerdict {
    /// Nothing stored, nothing presented
    NoCheckNeeded,
    /// Nothing stored, a well-formed token presented; the record takes it
    Adopt,
    /// Stored token equals the presented one
    Match,
    /// Stored token differs from the presented one, or none was presented
    Mismatch,
}

impl IdentityVerdict {
    /// Whether the caller may proceed with a mutating operation
    #[inline]
    #[must_use]
    pub fn permits_write(self) -> bool {
        !matches!(self, Self::Mismatch)
    }
}

/// Identity gate
///
/// `stored` is `None` both when no record exists and when the record has no
/// token yet. A stored token with no candidate is a [`IdentityVerdict::Mismatch`].
#[must_use]
pub fn verify(
    stored: Option<&IdentityToken>,
    candidate: Option<&IdentityToken>,
) -> IdentityVerdict {
    match (stored, candidate) {
        (None, None) => IdentityVerdict::NoCheckNeeded,
        (None, Some(_)) => IdentityVerdict::Adopt,
        (Some(s), Some(c)) if s == c => IdentityVerdict::Match,
        (Some(_), _) => IdentityVerdict::Mismatch,
    }
}
