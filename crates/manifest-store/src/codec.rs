//! Record document codec
//!
//! The document format is opaque to the engine: it only needs bytes to
//! persist and a content type to serve them with.

use crate::error::StoreError;
use manifest_model::ManifestRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Serialization format of stored records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl DocumentFormat {
    /// Encode a record, newline-terminated
    ///
    /// # Errors
    /// Returns [`StoreError::Encode`] if serialization fails.
    pub fn encode(self, record: &ManifestRecord) -> Result<Vec<u8>, StoreError> {
        match self {
            Self::Json => {
                let mut bytes = serde_json::to_vec_pretty(record)
                    .map_err(|e| StoreError::Encode(e.to_string()))?;
                bytes.push(b'\n');
                Ok(bytes)
            }
            Self::Yaml => serde_yaml::to_string(record)
                .map(String::into_bytes)
                .map_err(|e| StoreError::Encode(e.to_string())),
        }
    }

    /// Decode a stored document; `path` is only used for error context
    ///
    /// # Errors
    /// Returns [`StoreError::Malformed`] for syntax errors and for documents
    /// that violate a record invariant.
    pub fn decode(self, bytes: &[u8], path: &Path) -> Result<ManifestRecord, StoreError> {
        match self {
            Self::Json => serde_json::from_slice(bytes)
                .map_err(|e| StoreError::malformed(path, e.to_string())),
            Self::Yaml => serde_yaml::from_slice(bytes)
                .map_err(|e| StoreError::malformed(path, e.to_string())),
        }
    }

    /// MIME type used when serving a raw document
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Yaml => "application/yaml",
        }
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(format!("unknown document format: {other}")),
        }
    }
}
