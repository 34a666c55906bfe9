//! Parsing raw endpoint parameters into typed protocol requests
//!
//! Everything here runs before the store is touched. A parameter that is
//! absent from the map is "omitted"; a parameter that is present, even with an
//! empty value, is "supplied" and validated as such.

use crate::config::{ConfigError, EngineConfig};
use manifest_model::{
    CatalogName, DisplayName, IdentityToken, IncludedRef, NewRecord, RecordName, RecordPatch,
    ValidationError, MAX_CATALOGS, MAX_INCLUDED_REFS,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Raw query or form parameters
pub type Params = HashMap<String, String>;

/// Protocol operation named by the `function` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Enroll,
    Update,
    Checkin,
    Fetch,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enroll => "enroll",
            Self::Update => "update",
            Self::Checkin => "checkin",
            Self::Fetch => "fetch",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enroll" => Ok(Self::Enroll),
            "update" => Ok(Self::Update),
            "checkin" => Ok(Self::Checkin),
            "fetch" => Ok(Self::Fetch),
            other => Err(ValidationError::UnknownFunction(other.to_string())),
        }
    }
}

/// Validated update
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub record_name: RecordName,
    pub patch: RecordPatch,
}

/// A request ready for the protocol engine
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolRequest {
    /// Defaults are already resolved: catalogs are never empty and slot 1
    /// holds the default inclusion unless the caller supplied a valid one
    Enroll(NewRecord),
    Update(UpdateRequest),
    Checkin {
        record_name: RecordName,
    },
    Fetch {
        record_name: RecordName,
        identity_token: IdentityToken,
    },
}

impl ProtocolRequest {
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Enroll(_) => Operation::Enroll,
            Self::Update(_) => Operation::Update,
            Self::Checkin { .. } => Operation::Checkin,
            Self::Fetch { .. } => Operation::Fetch,
        }
    }

    #[must_use]
    pub fn record_name(&self) -> &RecordName {
        match self {
            Self::Enroll(r) => &r.record_name,
            Self::Update(r) => &r.record_name,
            Self::Checkin { record_name } | Self::Fetch { record_name, .. } => record_name,
        }
    }

    /// Parse and validate raw parameters
    ///
    /// # Errors
    /// [`ParseFailure::Invalid`] for unknown functions, missing or malformed
    /// required fields and self-inclusion; [`ParseFailure::Config`] when a
    /// configured default does not validate.
    pub fn from_params(params: &Params, config: &EngineConfig) -> Result<Self, ParseFailure> {
        let operation = match params.get("function") {
            Some(raw) => raw.parse::<Operation>()?,
            None => Operation::default(),
        };
        let record_name = RecordName::parse(required(params, "recordname")?)?;

        let request = match operation {
            Operation::Enroll => {
                let display_name = DisplayName::sanitize(required(params, "displayname")?)?;
                let identity_token = IdentityToken::parse(required(params, "uuid")?)?;

                let catalogs = match supplied_catalogs(params, config) {
                    Some(list) if !list.is_empty() => list,
                    _ => vec![config.default_catalog_name()?],
                };

                let slot_one = params
                    .get("manifest1")
                    .and_then(|raw| parse_ref(raw, 1));
                let mut included_refs = vec![match slot_one {
                    Some(r) => r,
                    None => config.default_inclusion_ref()?,
                }];
                included_refs
                    .extend(supplied_refs(params, 2..=MAX_INCLUDED_REFS).unwrap_or_default());
                reject_self_inclusion(&record_name, &included_refs)?;

                Self::Enroll(NewRecord {
                    record_name,
                    display_name,
                    identity_token,
                    catalogs,
                    included_refs,
                })
            }
            Operation::Update => {
                let display_name = params
                    .get("displayname")
                    .map(|raw| DisplayName::sanitize(raw))
                    .transpose()?;
                let identity_token = params
                    .get("uuid")
                    .map(|raw| IdentityToken::parse(raw))
                    .transpose()?;
                let catalogs = supplied_catalogs(params, config).filter(|list| !list.is_empty());
                let included_refs =
                    supplied_refs(params, 1..=MAX_INCLUDED_REFS).filter(|list| !list.is_empty());
                if let Some(refs) = &included_refs {
                    reject_self_inclusion(&record_name, refs)?;
                }

                Self::Update(UpdateRequest {
                    record_name,
                    patch: RecordPatch {
                        display_name,
                        identity_token,
                        catalogs,
                        included_refs,
                    },
                })
            }
            Operation::Checkin => Self::Checkin { record_name },
            Operation::Fetch => {
                let identity_token = IdentityToken::parse(required(params, "uuid")?)?;
                Self::Fetch {
                    record_name,
                    identity_token,
                }
            }
        };
        Ok(request)
    }
}

/// Why a parameter map could not become a request
///
/// Either the caller's input is invalid, or the engine's own defaults are.
#[derive(Debug, thiserror::Error)]
pub enum ParseFailure {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn required<'a>(params: &'a Params, name: &'static str) -> Result<&'a str, ValidationError> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or(ValidationError::Missing(name))
}

/// `Some` when any `catalogN` slot was supplied; invalid slots are dropped
fn supplied_catalogs(params: &Params, config: &EngineConfig) -> Option<Vec<CatalogName>> {
    let mut any_supplied = false;
    let mut catalogs = Vec::new();
    for slot in 1..=MAX_CATALOGS {
        let Some(raw) = params.get(&format!("catalog{slot}")) else {
            continue;
        };
        any_supplied = true;
        match CatalogName::parse(raw, &config.allowed_catalogs) {
            Ok(catalog) => catalogs.push(catalog),
            Err(e) => tracing::debug!("Dropping catalog{}: {}", slot, e),
        }
    }
    any_supplied.then_some(catalogs)
}

/// `Some` when any `manifestN` slot in `slots` was supplied; invalid slots are dropped
fn supplied_refs(
    params: &Params,
    slots: std::ops::RangeInclusive<usize>,
) -> Option<Vec<IncludedRef>> {
    let mut any_supplied = false;
    let mut refs = Vec::new();
    for slot in slots {
        let Some(raw) = params.get(&format!("manifest{slot}")) else {
            continue;
        };
        any_supplied = true;
        if let Some(r) = parse_ref(raw, slot) {
            refs.push(r);
        }
    }
    any_supplied.then_some(refs)
}

fn parse_ref(raw: &str, slot: usize) -> Option<IncludedRef> {
    match IncludedRef::parse(raw) {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::debug!("Dropping manifest{}: {}", slot, e);
            None
        }
    }
}

fn reject_self_inclusion(name: &RecordName, refs: &[IncludedRef]) -> Result<(), ValidationError> {
    if refs.iter().any(|r| r.refers_to(name)) {
        Err(ValidationError::SelfInclusion(name.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TOKEN: &str = "564D8E1A-2F3B-4C5D-9E8F-0A1B2C3D4E5F";

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn parse(pairs: &[(&str, &str)]) -> Result<ProtocolRequest, ParseFailure> {
        ProtocolRequest::from_params(&params(pairs), &EngineConfig::default())
    }

    fn invalid(pairs: &[(&str, &str)]) -> ValidationError {
        match parse(pairs) {
            Err(ParseFailure::Invalid(e)) => e,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn names<T: ToString>(items: &[T]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn function_defaults_to_enroll() {
        let req = parse(&[
            ("recordname", "C02TEST1"),
            ("displayname", "Test-Mac"),
            ("uuid", TOKEN),
        ])
        .unwrap();
        assert_eq!(req.operation(), Operation::Enroll);
        assert_eq!(req.record_name().as_str(), "C02TEST1");
    }

    #[test]
    fn unknown_function_rejected() {
        assert_eq!(
            invalid(&[("function", "delete"), ("recordname", "C02TEST1")]),
            ValidationError::UnknownFunction("delete".into())
        );
    }

    #[test]
    fn recordname_required_and_checked() {
        assert_eq!(
            invalid(&[("function", "checkin")]),
            ValidationError::Missing("recordname")
        );
        assert_eq!(
            invalid(&[("function", "checkin"), ("recordname", "../etc")]),
            ValidationError::InvalidRecordName
        );
        assert_eq!(
            invalid(&[("function", "checkin"), ("recordname", "")]),
            ValidationError::EmptyRecordName
        );
    }

    #[test]
    fn enroll_requires_displayname_and_uuid() {
        assert_eq!(
            invalid(&[("recordname", "C02TEST1"), ("uuid", TOKEN)]),
            ValidationError::Missing("displayname")
        );
        assert_eq!(
            invalid(&[("recordname", "C02TEST1"), ("displayname", "Mac")]),
            ValidationError::Missing("uuid")
        );
        assert_eq!(
            invalid(&[("recordname", "C02TEST1"), ("displayname", "Mac"), ("uuid", "nope")]),
            ValidationError::InvalidIdentityToken
        );
    }

    #[test]
    fn enroll_applies_defaults() {
        let ProtocolRequest::Enroll(req) = parse(&[
            ("recordname", "C02TEST1"),
            ("displayname", "Test-Mac"),
            ("uuid", TOKEN),
        ])
        .unwrap() else {
            panic!("expected enroll");
        };
        assert_eq!(names(&req.catalogs), vec!["production"]);
        assert_eq!(names(&req.included_refs), vec!["site_default"]);
    }

    #[test]
    fn enroll_drops_invalid_slots() {
        let ProtocolRequest::Enroll(req) = parse(&[
            ("recordname", "C02TEST1"),
            ("displayname", "Test-Mac"),
            ("uuid", TOKEN),
            ("catalog1", "bogus"),
            ("catalog2", "testing"),
            ("catalog3", "production"),
            ("manifest1", "../escape"),
            ("manifest2", "groups/lab"),
            ("manifest4", "groups/art"),
        ])
        .unwrap() else {
            panic!("expected enroll");
        };
        assert_eq!(names(&req.catalogs), vec!["testing", "production"]);
        assert_eq!(
            names(&req.included_refs),
            vec!["site_default", "groups/lab", "groups/art"]
        );
    }

    #[test]
    fn enroll_all_catalogs_dropped_uses_default() {
        let ProtocolRequest::Enroll(req) = parse(&[
            ("recordname", "C02TEST1"),
            ("displayname", "Test-Mac"),
            ("uuid", TOKEN),
            ("catalog1", "bogus"),
        ])
        .unwrap() else {
            panic!("expected enroll");
        };
        assert_eq!(names(&req.catalogs), vec!["production"]);
    }

    #[test]
    fn enroll_self_inclusion_rejected() {
        assert_eq!(
            invalid(&[
                ("recordname", "C02TEST1"),
                ("displayname", "Test-Mac"),
                ("uuid", TOKEN),
                ("manifest1", "C02TEST1"),
            ]),
            ValidationError::SelfInclusion("C02TEST1".into())
        );
    }

    #[test]
    fn update_distinguishes_omitted_from_supplied() {
        let ProtocolRequest::Update(req) = parse(&[
            ("function", "update"),
            ("recordname", "C02TEST1"),
            ("catalog1", "testing"),
        ])
        .unwrap() else {
            panic!("expected update");
        };
        assert!(req.patch.display_name.is_none());
        assert!(req.patch.identity_token.is_none());
        assert!(req.patch.included_refs.is_none());
        assert_eq!(names(req.patch.catalogs.as_deref().unwrap()), vec!["testing"]);
    }

    #[test]
    fn update_empty_display_name_is_invalid() {
        assert_eq!(
            invalid(&[("function", "update"), ("recordname", "C02TEST1"), ("displayname", "")]),
            ValidationError::EmptyDisplayName
        );
    }

    #[test]
    fn update_list_with_nothing_valid_is_omitted() {
        let ProtocolRequest::Update(req) = parse(&[
            ("function", "update"),
            ("recordname", "C02TEST1"),
            ("catalog1", "bogus"),
            ("manifest1", "/abs"),
        ])
        .unwrap() else {
            panic!("expected update");
        };
        assert!(req.patch.is_empty());
    }

    #[test]
    fn update_self_inclusion_rejected() {
        assert_eq!(
            invalid(&[
                ("function", "update"),
                ("recordname", "C02TEST1"),
                ("manifest3", "C02TEST1"),
            ]),
            ValidationError::SelfInclusion("C02TEST1".into())
        );
    }

    #[test]
    fn fetch_requires_uuid() {
        assert_eq!(
            invalid(&[("function", "fetch"), ("recordname", "C02TEST1")]),
            ValidationError::Missing("uuid")
        );
        let req = parse(&[
            ("function", "fetch"),
            ("recordname", "C02TEST1"),
            ("uuid", &TOKEN.to_lowercase()),
        ])
        .unwrap();
        assert_eq!(
            req,
            ProtocolRequest::Fetch {
                record_name: RecordName::parse("C02TEST1").unwrap(),
                identity_token: IdentityToken::parse(TOKEN).unwrap(),
            }
        );
    }

    #[test]
    fn checkin_ignores_other_fields() {
        let req = parse(&[
            ("function", "checkin"),
            ("recordname", "C02TEST1"),
            ("displayname", ""),
            ("uuid", "garbage"),
        ])
        .unwrap();
        assert_eq!(req.operation(), Operation::Checkin);
    }

    #[test]
    fn broken_default_is_a_config_failure() {
        let config = EngineConfig::default().with_default_inclusion("../x");
        let result = ProtocolRequest::from_params(
            &params(&[("recordname", "C02TEST1"), ("displayname", "Mac"), ("uuid", TOKEN)]),
            &config,
        );
        assert!(matches!(result, Err(ParseFailure::Config(_))));
    }
}
