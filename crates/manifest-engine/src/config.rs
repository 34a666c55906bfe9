//! Engine configuration
//!
//! Passed to the engine at construction; nothing is read from process-wide
//! state at request time.

use manifest_model::{CatalogName, IncludedRef};
use manifest_store::StoreOptions;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected shape
    #[error("failed to parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Values parse but are inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Read a TOML file into any config shape
///
/// # Errors
/// [`ConfigError::Read`] or [`ConfigError::Parse`].
pub fn load_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Protocol engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one document per record
    pub store_root: PathBuf,
    /// Catalogs a caller may request
    pub allowed_catalogs: Vec<String>,
    /// Catalog used when enrollment supplies none that survive validation
    pub default_catalog: String,
    /// Included manifest used for slot 1 when enrollment omits it
    pub default_inclusion: String,
    /// Store format and file permissions
    pub store: StoreOptions,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With store root
    #[inline]
    #[must_use]
    pub fn with_store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store_root = root.into();
        self
    }

    /// With catalog allow-list
    #[inline]
    #[must_use]
    pub fn with_allowed_catalogs<I, S>(mut self, catalogs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_catalogs = catalogs.into_iter().map(Into::into).collect();
        self
    }

    /// With default catalog
    #[inline]
    #[must_use]
    pub fn with_default_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.default_catalog = catalog.into();
        self
    }

    /// With default inclusion
    #[inline]
    #[must_use]
    pub fn with_default_inclusion(mut self, inclusion: impl Into<String>) -> Self {
        self.default_inclusion = inclusion.into();
        self
    }

    /// With store options
    #[inline]
    #[must_use]
    pub fn with_store_options(mut self, store: StoreOptions) -> Self {
        self.store = store;
        self
    }

    /// Check the defaults against the validation rules they bypass
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] when the allow-list is empty, the default
    /// catalog is not allowed, or the default inclusion is not path-like.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_catalogs.is_empty() {
            return Err(ConfigError::Invalid("allowed_catalogs is empty".into()));
        }
        self.default_catalog_name()?;
        self.default_inclusion_ref()?;
        Ok(())
    }

    /// Default catalog as a validated name
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] if it is not in the allow-list.
    pub fn default_catalog_name(&self) -> Result<CatalogName, ConfigError> {
        CatalogName::parse(&self.default_catalog, &self.allowed_catalogs)
            .map_err(|e| ConfigError::Invalid(format!("default_catalog: {e}")))
    }

    /// Default inclusion as a validated reference
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] if it is not path-like.
    pub fn default_inclusion_ref(&self) -> Result<IncludedRef, ConfigError> {
        IncludedRef::parse(&self.default_inclusion)
            .map_err(|e| ConfigError::Invalid(format!("default_inclusion: {e}")))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("/var/lib/manifest-enroll/manifests"),
            allowed_catalogs: vec![
                "production".to_string(),
                "testing".to_string(),
                "development".to_string(),
            ],
            default_catalog: "production".to_string(),
            default_inclusion: "site_default".to_string(),
            store: StoreOptions::default(),
        }
    }
}
