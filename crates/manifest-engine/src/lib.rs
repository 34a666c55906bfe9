//! Manifest Enrollment Protocol Engine
//!
//! Runs the four client operations against a [`RecordStore`]:
//!
//! | function  | transition         | identity gate | success |
//! |-----------|--------------------|---------------|---------|
//! | `enroll`  | Absent → Present   | no            | 201     |
//! | `update`  | Present → Present  | yes           | 200     |
//! | `checkin` | Present → Present  | no            | 200     |
//! | `fetch`   | Present → Present  | yes, required | 200     |
//!
//! # Example
//!
//! ```rust,ignore
//! use manifest_engine::prelude::*;
//!
//! let store = FsRecordStore::open(&config.store_root, config.store.clone())?;
//! let engine = ProtocolEngine::new(config, store)?;
//! let reply = engine.handle(&params, &RequestContext::new(caller));
//! ```
//!
//! [`RecordStore`]: manifest_store::RecordStore

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod audit;
mod caller;
mod clock;
mod config;
mod engine;
mod error;
mod reply;
mod request;

pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use caller::{CallerInfo, RequestContext};
pub use clock::{Clock, SystemClock};
pub use config::{load_toml, ConfigError, EngineConfig};
pub use engine::ProtocolEngine;
pub use error::{EnrollError, SecurityViolation, INTERNAL_ERROR_MESSAGE};
pub use reply::{Envelope, Outcome, Reply, IDENTITY_HEADER, REQUEST_ID_HEADER};
pub use request::{Operation, Params, ParseFailure, ProtocolRequest, UpdateRequest};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        CallerInfo, EngineConfig, EnrollError, Operation, Params, ProtocolEngine, Reply,
        RequestContext,
    };
    pub use manifest_model::{IdentityToken, ManifestRecord, RecordName};
    pub use manifest_store::{FsRecordStore, RecordStore, StoreOptions};
}
