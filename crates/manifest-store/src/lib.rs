//! Manifest Record Store
//!
//! One document per record under a single root directory, written only
//! through temp-file-and-rename so a record is either absent or complete.
//!
//! # Core Concepts
//!
//! - [`RecordStore`]: persistence seam (`exists`, `load`, `create`, `save`)
//! - [`FsRecordStore`]: filesystem implementation
//! - [`StoreRoot`]: symlink-aware resolution of a record name to its path
//! - [`DocumentFormat`]: on-disk codec (JSON or YAML)
//!
//! # Example
//!
//! ```rust,ignore
//! use manifest_store::{FsRecordStore, RecordStore, StoreOptions};
//!
//! let store = FsRecordStore::open("/var/lib/manifests", StoreOptions::default())?;
//! let receipt = store.create(record.record_name(), &record)?;
//! println!("stored {} as {}", receipt.path.display(), receipt.digest);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod codec;
mod error;
mod path;
mod store;

pub use codec::DocumentFormat;
pub use error::StoreError;
pub use path::StoreRoot;
pub use store::{FsRecordStore, RecordStore, StoreOptions, WriteReceipt};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
