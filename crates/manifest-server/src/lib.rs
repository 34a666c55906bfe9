//! Manifest Enrollment Server
//!
//! Serves the protocol engine on a single HTTP endpoint and backs the
//! `manifest-enroll` binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use manifest_server::{serve, AppConfig};
//!
//! let config = AppConfig::load(Some(Path::new("/etc/manifest-enroll.toml")))?;
//! serve(config, shutdown_signal()).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod routes;

pub use config::{AppConfig, ServerConfig};
pub use routes::{into_response, routes};

use manifest_engine::{ConfigError, ProtocolEngine};
use manifest_store::{FsRecordStore, StoreError};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Startup failures
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open record store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: warp::Error,
    },
}

/// Open the store and build the engine described by `config`
///
/// # Errors
/// Invalid configuration or an unusable store root.
pub fn build_engine(config: &AppConfig) -> Result<ProtocolEngine<FsRecordStore>, ServerError> {
    config.validate()?;
    let store = FsRecordStore::open(&config.engine.store_root, config.engine.store.clone())?;
    Ok(ProtocolEngine::new(config.engine.clone(), store)?)
}

/// Serve until `shutdown` resolves
///
/// # Errors
/// Startup failures only; per-request failures become responses.
pub async fn serve(
    config: AppConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let engine = Arc::new(build_engine(&config)?);
    let filter = routes(engine, &config.server);

    let bind = config.server.bind;
    let (addr, server) = warp::serve(filter)
        .try_bind_with_graceful_shutdown(bind, shutdown)
        .map_err(|source| ServerError::Bind { addr: bind, source })?;

    tracing::info!(
        "Serving http://{}{} (store: {})",
        addr,
        config.server.route(),
        config.engine.store_root.display()
    );
    server.await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
