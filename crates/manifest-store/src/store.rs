//! Record persistence
//!
//! Writes never touch the final path directly. A record is written in full to
//! a uniquely named temp file in the store root, flushed, and only then
//! moved into place:
//!
//! ```text
//! encode ─▶ .XXXXXX.tmp ─▶ fsync ─┬─ persist_noclobber ─▶ <name>   (create)
//!                                 └─ persist (rename)  ─▶ <name>   (save)
//! ```
//!
//! Readers therefore see either the previous document or the new one, and
//! `create` succeeds for exactly one of any number of concurrent callers.

use crate::codec::DocumentFormat;
use crate::error::StoreError;
use crate::path::StoreRoot;
use manifest_model::{ManifestRecord, RecordName};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// What a successful write put on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Final record path
    pub path: PathBuf,
    /// Exact bytes now stored at `path`
    pub document: Vec<u8>,
    /// Lower-case hex SHA-256 of `document`
    pub digest: String,
}

impl WriteReceipt {
    fn new(path: PathBuf, document: Vec<u8>) -> Self {
        let digest = hex::encode(Sha256::digest(&document));
        Self {
            path,
            document,
            digest,
        }
    }

    /// Number of bytes written
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.document.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }
}

/// Persistence seam used by the protocol engine
pub trait RecordStore: Send + Sync {
    /// Whether a record is stored under `name`
    fn exists(&self, name: &RecordName) -> Result<bool, StoreError>;

    /// Load and decode a record
    ///
    /// A missing record is [`StoreError::NotFound`]; an undecodable one is
    /// [`StoreError::Malformed`].
    fn load(&self, name: &RecordName) -> Result<ManifestRecord, StoreError>;

    /// Atomically create a record if none exists
    ///
    /// Returns [`StoreError::AlreadyExists`] without touching the stored
    /// record if another writer got there first.
    fn create(&self, name: &RecordName, record: &ManifestRecord)
        -> Result<WriteReceipt, StoreError>;

    /// Atomically replace a record
    fn save(&self, name: &RecordName, record: &ManifestRecord) -> Result<WriteReceipt, StoreError>;

    /// Format documents are stored in
    fn format(&self) -> DocumentFormat;
}

/// Filesystem store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Document format for new writes and reads
    pub format: DocumentFormat,
    /// Mode applied to record files after a write (unix only)
    pub file_mode: Option<u32>,
    /// Owner uid applied after a write (unix only)
    pub owner_uid: Option<u32>,
    /// Owner gid applied after a write (unix only)
    pub owner_gid: Option<u32>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            format: DocumentFormat::Json,
            file_mode: Some(0o640),
            owner_uid: None,
            owner_gid: None,
        }
    }
}

/// One document per record under a single root directory
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    root: StoreRoot,
    options: StoreOptions,
}

impl FsRecordStore {
    /// Open a store on an existing directory
    ///
    /// # Errors
    /// Returns [`StoreError::Root`] if the directory is unusable.
    pub fn open(root: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let root = StoreRoot::open(root)?;
        tracing::debug!("Opened record store at {}", root.path().display());
        Ok(Self { root, options })
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &StoreRoot {
        &self.root
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Names of all records currently stored, sorted
    ///
    /// Temp files, symlinks and entries whose names are not valid record
    /// names are skipped.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the root cannot be read.
    pub fn list(&self) -> Result<Vec<RecordName>, StoreError> {
        let root = self.root.path();
        let entries = fs::read_dir(root).map_err(|e| StoreError::io_error(root, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io_error(root, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|s| RecordName::parse(s).ok())
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Encode into a flushed temp file next to the final path
    ///
    /// The temp name has a fixed length independent of the record name, so
    /// any valid record name stays within the filesystem name limit.
    fn stage(
        &self,
        record: &ManifestRecord,
    ) -> Result<(tempfile::NamedTempFile, Vec<u8>), StoreError> {
        let document = self.options.format.encode(record)?;
        let root = self.root.path();

        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(root)
            .map_err(|e| StoreError::io_error(root, e))?;
        tmp.write_all(&document)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io_error(tmp.path(), e))?;

        Ok((tmp, document))
    }

    /// Apply configured mode and ownership; failures are logged, not returned
    fn restrict(&self, path: &Path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            if let Some(mode) = self.options.file_mode {
                if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
                    tracing::warn!("Failed to set mode {:o} on {}: {}", mode, path.display(), e);
                }
            }
            if self.options.owner_uid.is_some() || self.options.owner_gid.is_some() {
                if let Err(e) =
                    std::os::unix::fs::chown(path, self.options.owner_uid, self.options.owner_gid)
                {
                    tracing::warn!("Failed to set owner on {}: {}", path.display(), e);
                }
            }
        }
        #[cfg(not(unix))]
        let _ = path;
    }

    fn sync_root(&self) {
        let root = self.root.path();
        if let Err(e) = File::open(root).and_then(|dir| dir.sync_all()) {
            tracing::debug!("Directory sync skipped for {}: {}", root.display(), e);
        }
    }
}

impl RecordStore for FsRecordStore {
    fn exists(&self, name: &RecordName) -> Result<bool, StoreError> {
        let path = self.root.resolve(name)?;
        path.try_exists().map_err(|e| StoreError::io_error(&path, e))
    }

    fn load(&self, name: &RecordName) -> Result<ManifestRecord, StoreError> {
        let path = self.root.resolve(name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.clone()))
            }
            Err(e) => return Err(StoreError::io_error(&path, e)),
        };
        let record = self.options.format.decode(&bytes, &path)?;
        if record.record_name() != name {
            return Err(StoreError::malformed(
                &path,
                format!("document names record '{}'", record.record_name()),
            ));
        }
        Ok(record)
    }

    fn create(
        &self,
        name: &RecordName,
        record: &ManifestRecord,
    ) -> Result<WriteReceipt, StoreError> {
        let path = self.root.resolve(name)?;
        let (tmp, document) = self.stage(record)?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {}
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(name.clone()))
            }
            Err(e) => return Err(StoreError::io_error(&path, e.error)),
        }
        self.sync_root();
        self.restrict(&path);

        tracing::debug!("Created {} ({} bytes)", path.display(), document.len());
        Ok(WriteReceipt::new(path, document))
    }

    fn save(&self, name: &RecordName, record: &ManifestRecord) -> Result<WriteReceipt, StoreError> {
        let path = self.root.resolve(name)?;
        let (tmp, document) = self.stage(record)?;

        tmp.persist(&path)
            .map_err(|e| StoreError::io_error(&path, e.error))?;
        self.sync_root();
        self.restrict(&path);

        tracing::debug!("Saved {} ({} bytes)", path.display(), document.len());
        Ok(WriteReceipt::new(path, document))
    }

    fn format(&self) -> DocumentFormat {
        self.options.format
    }
}
