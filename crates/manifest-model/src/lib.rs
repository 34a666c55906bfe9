//! Manifest Record Model
//!
//! Typed, validated building blocks of a client manifest.
//!
//! # Core Concepts
//!
//! - [`ManifestRecord`]: one client's manifest, keyed by [`RecordName`]
//! - [`NewRecord`] / [`RecordPatch`]: inputs to the enroll and update merge rules
//! - [`IdentityToken`]: write-once hardware identity locking a record to a device
//! - [`verify`]: the identity gate, yielding an [`IdentityVerdict`]
//!
//! # Example
//!
//! ```rust,ignore
//! use manifest_model::{ManifestRecord, NewRecord, RecordName, Timestamp};
//!
//! let record = ManifestRecord::enroll(new, &Timestamp::from_epoch(now), "ip=10.0.0.4")?;
//! let next = record.with_checkin(&Timestamp::from_epoch(now + 60));
//! assert_eq!(next.display_name(), record.display_name());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod identity;
mod name;
mod record;
mod timestamp;

pub use error::ValidationError;
pub use identity::{verify, IdentityToken, IdentityVerdict};
pub use name::{
    CatalogName, DisplayName, IncludedRef, RecordName, MAX_DISPLAY_NAME_LEN, MAX_RECORD_NAME_LEN,
    MAX_REF_LEN,
};
pub use record::{
    MalformedRecord, ManifestRecord, NewRecord, RecordField, RecordPatch, RecordUpdate,
    MAX_CATALOGS, MAX_INCLUDED_REFS,
};
pub use timestamp::Timestamp;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
