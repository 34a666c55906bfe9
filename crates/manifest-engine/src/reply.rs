//! Turning an operation result into exactly one response
//!
//! ```text
//! Result<Outcome, EnrollError> ──Reply::from_result──▶ Reply { status, headers, body }
//! ```

use crate::error::EnrollError;
use manifest_model::{ManifestRecord, RecordField};
use manifest_store::WriteReceipt;
use serde::Serialize;
use serde_json::{json, Value};

/// Header carrying the verified identity token on fetch
pub const IDENTITY_HEADER: &str = "X-Manifest-Identity";

/// Header carrying the request id on every reply
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Successful operation result
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Enrolled {
        record: ManifestRecord,
        receipt: WriteReceipt,
    },
    Updated {
        record: ManifestRecord,
        receipt: WriteReceipt,
        changed: Vec<RecordField>,
    },
    CheckedIn {
        record: ManifestRecord,
        receipt: WriteReceipt,
    },
    Fetched {
        record: ManifestRecord,
        receipt: WriteReceipt,
        content_type: &'static str,
    },
}

impl Outcome {
    #[must_use]
    pub fn record(&self) -> &ManifestRecord {
        match self {
            Self::Enrolled { record, .. }
            | Self::Updated { record, .. }
            | Self::CheckedIn { record, .. }
            | Self::Fetched { record, .. } => record,
        }
    }

    #[must_use]
    pub fn receipt(&self) -> &WriteReceipt {
        match self {
            Self::Enrolled { receipt, .. }
            | Self::Updated { receipt, .. }
            | Self::CheckedIn { receipt, .. }
            | Self::Fetched { receipt, .. } => receipt,
        }
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Enrolled { .. } => 201,
            _ => 200,
        }
    }

    /// Short human summary, used in the envelope and the audit trail
    #[must_use]
    pub fn message(&self) -> String {
        let name = self.record().record_name();
        match self {
            Self::Enrolled { .. } => format!("client {name} enrolled"),
            Self::Updated { changed, .. } if changed.is_empty() => {
                format!("client {name} unchanged")
            }
            Self::Updated { changed, .. } => {
                let fields: Vec<_> = changed.iter().map(|f| f.as_str()).collect();
                format!("client {name} updated: {}", fields.join(", "))
            }
            Self::CheckedIn { .. } => format!("client {name} checked in"),
            Self::Fetched { .. } => format!("client {name} fetched"),
        }
    }
}

/// JSON status envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    #[must_use]
    pub fn success(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            data: None,
        }
    }
}

/// Transport-neutral response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    /// Build the reply for a finished request
    #[must_use]
    pub fn from_result(result: &Result<Outcome, EnrollError>) -> Self {
        match result {
            Ok(Outcome::Fetched {
                record,
                receipt,
                content_type,
            }) => {
                let mut headers = vec![("ETag", format!("\"{}\"", receipt.digest))];
                if let Some(token) = record.identity_token() {
                    headers.push((IDENTITY_HEADER, token.to_string()));
                }
                Self {
                    status: 200,
                    content_type: *content_type,
                    headers,
                    body: receipt.document.clone(),
                }
            }
            Ok(outcome) => {
                let envelope = Envelope::success(outcome.message(), Some(envelope_data(outcome)));
                Self::json(outcome.status_code(), &envelope)
            }
            Err(err) => Self::json(err.status_code(), &Envelope::error(err.public_message())),
        }
    }

    /// Error envelope for failures the transport detects before the engine runs
    #[must_use]
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, &Envelope::error(message))
    }

    fn json(status: u16, envelope: &Envelope) -> Self {
        let body = serde_json::to_vec(envelope).unwrap_or_else(|_| {
            br#"{"status":"error","message":"internal server error"}"#.to_vec()
        });
        Self {
            status,
            content_type: JSON_CONTENT_TYPE,
            headers: Vec::new(),
            body,
        }
    }

    /// Append a header
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// First value of a header, compared case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

fn envelope_data(outcome: &Outcome) -> Value {
    let record = outcome.record();
    match outcome {
        Outcome::CheckedIn { .. } => json!({
            "recordname": record.record_name().as_str(),
            "checkin_date": record.checked_in_at().human,
        }),
        _ => json!({
            "recordname": record.record_name().as_str(),
            "displayname": record.display_name().as_str(),
            "catalogs": record.catalogs().iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            "manifests": record.included_refs().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        }),
    }
}
