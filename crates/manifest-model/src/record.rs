//! The manifest record and its creation/merge rules
//!
//! A [`ManifestRecord`] is never mutated after it is loaded. Each protocol
//! operation computes a new value from the old one:
//!
//! ```text
//! NewRecord ──enroll──▶ ManifestRecord ──apply_update(RecordPatch)──▶ ManifestRecord'
//!                              │
//!                              └──with_checkin(now)──▶ ManifestRecord'
//! ```

use crate::error::ValidationError;
use crate::identity::IdentityToken;
use crate::name::{CatalogName, DisplayName, IncludedRef, RecordName};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Most catalogs a record may list
pub const MAX_CATALOGS: usize = 3;

/// Most included manifests a record may list
pub const MAX_INCLUDED_REFS: usize = 4;

/// Stored document violates a record invariant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed record document: {0}")]
pub struct MalformedRecord(pub String);

/// One client's manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RecordDocument", try_from = "RecordDocument")]
pub struct ManifestRecord {
    record_name: RecordName,
    display_name: DisplayName,
    identity_token: Option<IdentityToken>,
    catalogs: Vec<CatalogName>,
    included_refs: Vec<IncludedRef>,
    managed_entries: Vec<Value>,
    created_at: Timestamp,
    modified_at: Timestamp,
    checked_in_at: Timestamp,
    created_by: String,
    modified_by: String,
    extra: BTreeMap<String, Value>,
}

/// Validated input for a first enrollment
///
/// Defaults (catalog, inclusion) are resolved by the caller before this is
/// built; the record only checks bounds and self-inclusion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub record_name: RecordName,
    pub display_name: DisplayName,
    pub identity_token: IdentityToken,
    pub catalogs: Vec<CatalogName>,
    pub included_refs: Vec<IncludedRef>,
}

/// Fields a caller explicitly supplied on update
///
/// `None` means "omitted, carry the stored value over".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub display_name: Option<DisplayName>,
    pub identity_token: Option<IdentityToken>,
    pub catalogs: Option<Vec<CatalogName>>,
    pub included_refs: Option<Vec<IncludedRef>>,
}

impl RecordPatch {
    /// Whether the caller supplied nothing to change
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.identity_token.is_none()
            && self.catalogs.is_none()
            && self.included_refs.is_none()
    }
}

/// Substantive field of a record, for change reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    DisplayName,
    IdentityToken,
    Catalogs,
    IncludedRefs,
}

impl RecordField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DisplayName => "display_name",
            Self::IdentityToken => "identity_token",
            Self::Catalogs => "catalogs",
            Self::IncludedRefs => "included_manifests",
        }
    }
}

/// Result of merging a patch into a record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub record: ManifestRecord,
    pub changed: Vec<RecordField>,
}

impl RecordUpdate {
    #[inline]
    #[must_use]
    pub fn is_modified(&self) -> bool {
        !self.changed.is_empty()
    }
}

fn check_bounds(
    name: &RecordName,
    catalogs: &[CatalogName],
    refs: &[IncludedRef],
) -> Result<(), ValidationError> {
    if catalogs.len() > MAX_CATALOGS {
        return Err(ValidationError::TooManyCatalogs {
            len: catalogs.len(),
            max: MAX_CATALOGS,
        });
    }
    if refs.len() > MAX_INCLUDED_REFS {
        return Err(ValidationError::TooManyReferences {
            len: refs.len(),
            max: MAX_INCLUDED_REFS,
        });
    }
    if refs.iter().any(|r| r.refers_to(name)) {
        return Err(ValidationError::SelfInclusion(name.to_string()));
    }
    Ok(())
}

impl ManifestRecord {
    /// Build the first version of a record
    ///
    /// All three timestamps are `now`; `created_by` and `modified_by` are both
    /// the caller's audit string.
    ///
    /// # Errors
    /// Bounds exceeded or the record includes itself.
    pub fn enroll(new: NewRecord, now: &Timestamp, caller: &str) -> Result<Self, ValidationError> {
        check_bounds(&new.record_name, &new.catalogs, &new.included_refs)?;
        Ok(Self {
            record_name: new.record_name,
            display_name: new.display_name,
            identity_token: Some(new.identity_token),
            catalogs: new.catalogs,
            included_refs: new.included_refs,
            managed_entries: Vec::new(),
            created_at: now.clone(),
            modified_at: now.clone(),
            checked_in_at: now.clone(),
            created_by: caller.to_string(),
            modified_by: caller.to_string(),
            extra: BTreeMap::new(),
        })
    }

    /// Merge caller-supplied fields over this record
    ///
    /// Supplied fields replace, omitted fields carry over. The identity token
    /// is only ever filled in, never replaced. `modified_at` moves only when a
    /// substantive field actually changed; `checked_in_at` always moves.
    /// The identity gate must have passed before this is called.
    ///
    /// # Errors
    /// Bounds exceeded or the merged inclusion list names this record.
    pub fn apply_update(
        &self,
        patch: RecordPatch,
        now: &Timestamp,
        caller: &str,
    ) -> Result<RecordUpdate, ValidationError> {
        let display_name = patch.display_name.unwrap_or_else(|| self.display_name.clone());
        let identity_token = self.identity_token.clone().or(patch.identity_token);
        let catalogs = patch.catalogs.unwrap_or_else(|| self.catalogs.clone());
        let included_refs = patch.included_refs.unwrap_or_else(|| self.included_refs.clone());

        check_bounds(&self.record_name, &catalogs, &included_refs)?;

        let mut changed = Vec::new();
        if display_name != self.display_name {
            changed.push(RecordField::DisplayName);
        }
        if identity_token != self.identity_token {
            changed.push(RecordField::IdentityToken);
        }
        if catalogs != self.catalogs {
            changed.push(RecordField::Catalogs);
        }
        if included_refs != self.included_refs {
            changed.push(RecordField::IncludedRefs);
        }

        let modified_at = if changed.is_empty() {
            self.modified_at.clone()
        } else {
            now.clone()
        };

        let record = Self {
            record_name: self.record_name.clone(),
            display_name,
            identity_token,
            catalogs,
            included_refs,
            managed_entries: self.managed_entries.clone(),
            created_at: self.created_at.clone(),
            modified_at,
            checked_in_at: now.clone(),
            created_by: self.created_by.clone(),
            modified_by: caller.to_string(),
            extra: self.extra.clone(),
        };
        Ok(RecordUpdate { record, changed })
    }

    /// Same record with only the check-in timestamp refreshed
    #[must_use]
    pub fn with_checkin(&self, now: &Timestamp) -> Self {
        Self {
            checked_in_at: now.clone(),
            ..self.clone()
        }
    }

    #[inline]
    #[must_use]
    pub fn record_name(&self) -> &RecordName {
        &self.record_name
    }

    #[inline]
    #[must_use]
    pub fn display_name(&self) -> &DisplayName {
        &self.display_name
    }

    #[inline]
    #[must_use]
    pub fn identity_token(&self) -> Option<&IdentityToken> {
        self.identity_token.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn catalogs(&self) -> &[CatalogName] {
        &self.catalogs
    }

    #[inline]
    #[must_use]
    pub fn included_refs(&self) -> &[IncludedRef] {
        &self.included_refs
    }

    #[inline]
    #[must_use]
    pub fn managed_entries(&self) -> &[Value] {
        &self.managed_entries
    }

    #[inline]
    #[must_use]
    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    #[inline]
    #[must_use]
    pub fn modified_at(&self) -> &Timestamp {
        &self.modified_at
    }

    #[inline]
    #[must_use]
    pub fn checked_in_at(&self) -> &Timestamp {
        &self.checked_in_at
    }

    #[inline]
    #[must_use]
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    #[inline]
    #[must_use]
    pub fn modified_by(&self) -> &str {
        &self.modified_by
    }

    /// Keys found in the stored document that this engine does not own
    #[inline]
    #[must_use]
    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }
}

/// On-disk key schema
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordDocument {
    record_name: RecordName,
    display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity_token: Option<String>,
    #[serde(default)]
    catalogs: Vec<CatalogName>,
    #[serde(default)]
    included_manifests: Vec<String>,
    #[serde(default)]
    managed_installs: Vec<Value>,
    created_epoch: i64,
    created_date: String,
    modified_epoch: i64,
    modified_date: String,
    checkin_epoch: i64,
    checkin_date: String,
    #[serde(default)]
    created_by: String,
    #[serde(default)]
    modified_by: String,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl From<ManifestRecord> for RecordDocument {
    fn from(r: ManifestRecord) -> Self {
        Self {
            record_name: r.record_name,
            display_name: r.display_name.to_string(),
            identity_token: r.identity_token.map(|t| t.as_str().to_string()),
            catalogs: r.catalogs,
            included_manifests: r.included_refs.iter().map(|i| i.as_str().to_string()).collect(),
            managed_installs: r.managed_entries,
            created_epoch: r.created_at.epoch,
            created_date: r.created_at.human,
            modified_epoch: r.modified_at.epoch,
            modified_date: r.modified_at.human,
            checkin_epoch: r.checked_in_at.epoch,
            checkin_date: r.checked_in_at.human,
            created_by: r.created_by,
            modified_by: r.modified_by,
            extra: r.extra,
        }
    }
}

impl TryFrom<RecordDocument> for ManifestRecord {
    type Error = MalformedRecord;

    fn try_from(doc: RecordDocument) -> Result<Self, Self::Error> {
        let display_name =
            DisplayName::sanitize(&doc.display_name).map_err(|e| MalformedRecord(e.to_string()))?;
        let identity_token = match doc.identity_token.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                IdentityToken::parse(raw).map_err(|e| MalformedRecord(e.to_string()))?,
            ),
        };
        let included_refs = doc
            .included_manifests
            .iter()
            .map(|raw| IncludedRef::parse(raw))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MalformedRecord(e.to_string()))?;

        check_bounds(&doc.record_name, &doc.catalogs, &included_refs)
            .map_err(|e| MalformedRecord(e.to_string()))?;

        if doc.created_epoch < 0 || doc.modified_epoch < doc.created_epoch {
            return Err(MalformedRecord(format!(
                "timestamps out of order: created {} modified {}",
                doc.created_epoch, doc.modified_epoch
            )));
        }

        Ok(Self {
            record_name: doc.record_name,
            display_name,
            identity_token,
            catalogs: doc.catalogs,
            included_refs,
            managed_entries: doc.managed_installs,
            created_at: Timestamp {
                epoch: doc.created_epoch,
                human: doc.created_date,
            },
            modified_at: Timestamp {
                epoch: doc.modified_epoch,
                human: doc.modified_date,
            },
            checked_in_at: Timestamp {
                epoch: doc.checkin_epoch,
                human: doc.checkin_date,
            },
            created_by: doc.created_by,
            modified_by: doc.modified_by,
            extra: doc.extra,
        })
    }
}
