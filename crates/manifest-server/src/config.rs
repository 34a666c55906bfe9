//! Server and application configuration

use manifest_engine::{load_toml, ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// HTTP endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Path of the single endpoint, without leading slash
    pub endpoint_path: String,
    /// Largest accepted form body
    pub max_body_bytes: u64,
    /// Header carrying the user authenticated by the fronting gate
    pub user_header: String,
}

impl ServerConfig {
    /// Endpoint path as matched against requests, with one leading slash
    #[must_use]
    pub fn route(&self) -> String {
        format!("/{}", self.endpoint_path.trim_matches('/'))
    }

    /// With bind address
    #[inline]
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// With endpoint path
    #[inline]
    #[must_use]
    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = path.into();
        self
    }

    /// With body limit
    #[inline]
    #[must_use]
    pub fn with_max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// With user header
    #[inline]
    #[must_use]
    pub fn with_user_header(mut self, header: impl Into<String>) -> Self {
        self.user_header = header.into();
        self
    }

    /// # Errors
    /// [`ConfigError::Invalid`] for an empty endpoint path, a zero body limit
    /// or a user header that is not a valid header name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_path.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid("endpoint_path is empty".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes is zero".into()));
        }
        warp::http::header::HeaderName::from_bytes(self.user_header.as_bytes()).map_err(|_| {
            ConfigError::Invalid(format!("user_header is not a header name: {}", self.user_header))
        })?;
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            endpoint_path: "enroll".to_string(),
            max_body_bytes: 16 * 1024,
            user_header: "x-remote-user".to_string(),
        }
    }
}

/// Whole configuration file
///
/// ```toml
/// [engine]
/// store_root = "/srv/munki/manifests"
/// allowed_catalogs = ["production", "testing"]
///
/// [engine.store]
/// format = "yaml"
///
/// [server]
/// bind = "0.0.0.0:8443"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load from a TOML file, or defaults when no file is given
    ///
    /// # Errors
    /// Read or parse failures from [`load_toml`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let config = load_toml(path)?;
                tracing::debug!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// # Errors
    /// The first engine or server setting that does not validate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.server.validate()
    }
}
