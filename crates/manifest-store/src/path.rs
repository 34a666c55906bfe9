//! Store root and record path resolution
//!
//! Second half of the path safety gate. [`RecordName`] already guarantees a
//! single filename-safe component; [`StoreRoot::resolve`] additionally
//! resolves symlinks and requires the result to be exactly `<root>/<name>`.

use crate::error::StoreError;
use manifest_model::RecordName;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Canonical store root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRoot {
    root: PathBuf,
}

impl StoreRoot {
    /// Canonicalize and check the root directory
    ///
    /// # Errors
    /// Returns [`StoreError::Root`] if the path does not exist or is not a
    /// directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let root = fs::canonicalize(path).map_err(|e| StoreError::Root {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !root.is_dir() {
            return Err(StoreError::Root {
                path: root,
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self { root })
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a record name to its on-disk path
    ///
    /// An existing entry is resolved through symlinks; a missing one is
    /// resolved through its parent. Either way the result must equal
    /// `<root>/<name>`, so a symlink pointing outside the root or at another
    /// client's record is refused.
    ///
    /// # Errors
    /// [`StoreError::PathEscape`] when the resolved path differs, or
    /// [`StoreError::Io`] when resolution itself fails.
    pub fn resolve(&self, name: &RecordName) -> Result<PathBuf, StoreError> {
        let expected = self.root.join(name.as_str());
        let resolved = match fs::canonicalize(&expected) {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let parent = expected.parent().unwrap_or(&self.root);
                let parent = fs::canonicalize(parent)
                    .map_err(|e| StoreError::io_error(parent, e))?;
                parent.join(name.as_str())
            }
            Err(e) => return Err(StoreError::io_error(&expected, e)),
        };

        if resolved.parent() != Some(self.root.as_path()) || resolved != expected {
            return Err(StoreError::PathEscape { path: resolved });
        }
        Ok(expected)
    }
}
