//! Testing utilities for the manifest enroll workspace
//!
//! Shared stores, clocks and parameter builders.

#![allow(missing_docs)]

use manifest_engine::{EngineConfig, Params, ProtocolEngine};
use manifest_model::{ManifestRecord, RecordName, Timestamp};
use manifest_store::{
    DocumentFormat, FsRecordStore, RecordStore, StoreError, StoreOptions, WriteReceipt,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

pub use manifest_engine::{Clock, MemoryAuditSink};

/// A well-formed identity token
pub const TOKEN_A: &str = "564D8E1A-2F3B-4C5D-9E8F-0A1B2C3D4E5F";

/// A second well-formed token, distinct from [`TOKEN_A`]
pub const TOKEN_B: &str = "00000000-0000-4000-8000-000000000001";

/// Epoch every [`FixedClock::default`] starts at
pub const START_EPOCH: i64 = 1_700_000_000;

/// Filesystem store in a throwaway directory
pub struct TempStore {
    dir: tempfile::TempDir,
    store: FsRecordStore,
}

impl TempStore {
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    pub fn with_options(options: StoreOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::open(dir.path(), options).unwrap();
        Self { dir, store }
    }

    pub fn path(&self) -> &Path {
        self.store.root().path()
    }

    pub fn store(&self) -> FsRecordStore {
        self.store.clone()
    }

    /// Raw bytes of a stored record, if the file exists
    pub fn read_raw(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.path().join(name)).ok()
    }

    /// Decoded record
    pub fn load(&self, name: &str) -> ManifestRecord {
        self.store.load(&RecordName::parse(name).unwrap()).unwrap()
    }

    /// Every entry in the store root, including temp files
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    epoch: Mutex<i64>,
}

impl FixedClock {
    pub fn new(epoch: i64) -> Self {
        Self {
            epoch: Mutex::new(epoch),
        }
    }

    pub fn set(&self, epoch: i64) {
        *self.epoch.lock() = epoch;
    }

    pub fn advance(&self, seconds: i64) {
        *self.epoch.lock() += seconds;
    }

    pub fn epoch(&self) -> i64 {
        *self.epoch.lock()
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(START_EPOCH)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_epoch(self.epoch())
    }
}

/// Which store calls a [`FailingStore`] breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    /// `load` and `exists`
    Reads,
    /// `create` and `save`
    Writes,
}

/// Store that wraps a real one and fails selected calls with an I/O error
#[derive(Debug, Clone)]
pub struct FailingStore {
    inner: FsRecordStore,
    fail_on: FailOn,
}

impl FailingStore {
    pub fn new(inner: FsRecordStore, fail_on: FailOn) -> Self {
        Self { inner, fail_on }
    }

    fn failure(&self, name: &RecordName) -> StoreError {
        StoreError::io_error(
            self.inner.root().path().join(name.as_str()),
            std::io::Error::new(std::io::ErrorKind::Other, "injected failure: no space left"),
        )
    }
}

impl RecordStore for FailingStore {
    fn exists(&self, name: &RecordName) -> Result<bool, StoreError> {
        match self.fail_on {
            FailOn::Reads => Err(self.failure(name)),
            FailOn::Writes => self.inner.exists(name),
        }
    }

    fn load(&self, name: &RecordName) -> Result<ManifestRecord, StoreError> {
        match self.fail_on {
            FailOn::Reads => Err(self.failure(name)),
            FailOn::Writes => self.inner.load(name),
        }
    }

    fn create(
        &self,
        name: &RecordName,
        record: &ManifestRecord,
    ) -> Result<WriteReceipt, StoreError> {
        match self.fail_on {
            FailOn::Writes => Err(self.failure(name)),
            FailOn::Reads => self.inner.create(name, record),
        }
    }

    fn save(
        &self,
        name: &RecordName,
        record: &ManifestRecord,
    ) -> Result<WriteReceipt, StoreError> {
        match self.fail_on {
            FailOn::Writes => Err(self.failure(name)),
            FailOn::Reads => self.inner.save(name, record),
        }
    }

    fn format(&self) -> DocumentFormat {
        self.inner.format()
    }
}

/// Engine over a [`TempStore`] with a [`FixedClock`] and a [`MemoryAuditSink`]
pub struct TestEngine {
    pub engine: ProtocolEngine<FsRecordStore>,
    pub store: TempStore,
    pub clock: Arc<FixedClock>,
    pub audit: Arc<MemoryAuditSink>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = TempStore::new();
        let clock = Arc::new(FixedClock::default());
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = ProtocolEngine::new(config.with_store_root(store.path()), store.store())
            .unwrap()
            .with_clock(clock.clone())
            .with_audit(audit.clone());
        Self {
            engine,
            store,
            clock,
            audit,
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for raw endpoint parameters
#[derive(Debug, Clone, Default)]
pub struct ParamsBuilder {
    params: Params,
}

impl ParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `function=enroll`, name, display name and token
    pub fn enroll(record_name: &str, display_name: &str, token: &str) -> Self {
        Self::new()
            .function("enroll")
            .record_name(record_name)
            .display_name(display_name)
            .uuid(token)
    }

    pub fn update(record_name: &str) -> Self {
        Self::new().function("update").record_name(record_name)
    }

    pub fn checkin(record_name: &str) -> Self {
        Self::new().function("checkin").record_name(record_name)
    }

    pub fn fetch(record_name: &str, token: &str) -> Self {
        Self::new()
            .function("fetch")
            .record_name(record_name)
            .uuid(token)
    }

    pub fn function(self, function: &str) -> Self {
        self.set("function", function)
    }

    pub fn record_name(self, name: &str) -> Self {
        self.set("recordname", name)
    }

    pub fn display_name(self, name: &str) -> Self {
        self.set("displayname", name)
    }

    pub fn uuid(self, token: &str) -> Self {
        self.set("uuid", token)
    }

    /// `catalogN`, slot starting at 1
    pub fn catalog(self, slot: usize, catalog: &str) -> Self {
        self.set(&format!("catalog{slot}"), catalog)
    }

    /// `manifestN`, slot starting at 1
    pub fn manifest(self, slot: usize, reference: &str) -> Self {
        self.set(&format!("manifest{slot}"), reference)
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.params.remove(key);
        self
    }

    pub fn build(self) -> Params {
        self.params
    }

    /// `application/x-www-form-urlencoded` rendering, keys sorted
    pub fn to_query(&self) -> String {
        let mut pairs: Vec<_> = self.params.iter().collect();
        pairs.sort();
        serde_urlencoded::to_string(&pairs).unwrap()
    }
}
