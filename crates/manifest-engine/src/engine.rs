//! Protocol engine
//!
//! Each request runs one guarded transition as a single unit:
//!
//! ```text
//!            enroll (create-if-absent)
//! Absent ───────────────────────────────▶ Present ◀──┐ update  (identity gate)
//!                                           │        │ checkin
//!                                           └────────┘ fetch   (identity gate)
//! ```
//!
//! Validation finishes before the store is touched. A loaded record is never
//! mutated: the operation computes a new value and hands it to an atomic
//! store write.

use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::caller::RequestContext;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, EngineConfig};
use crate::error::{EnrollError, SecurityViolation};
use crate::reply::{Outcome, Reply, REQUEST_ID_HEADER};
use crate::request::{Operation, Params, ProtocolRequest, UpdateRequest};
use manifest_model::{
    verify, IdentityToken, IdentityVerdict, ManifestRecord, NewRecord, RecordName, Timestamp,
};
use manifest_store::RecordStore;
use std::sync::Arc;

/// Runs protocol operations against a record store
pub struct ProtocolEngine<S> {
    config: EngineConfig,
    store: S,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl<S: RecordStore> ProtocolEngine<S> {
    /// Create an engine with the tracing audit sink and the system clock
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] if the configured defaults do not validate.
    pub fn new(config: EngineConfig, store: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
        })
    }

    /// With audit sink
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// With clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Parse, execute, audit and render one request
    pub fn handle(&self, params: &Params, ctx: &RequestContext) -> Reply {
        let span = tracing::info_span!("request", request_id = %ctx.request_id);
        let _enter = span.enter();

        let result = ProtocolRequest::from_params(params, &self.config)
            .map_err(EnrollError::from)
            .and_then(|request| self.execute(request, ctx));

        let operation = match params.get("function") {
            Some(raw) => raw.parse::<Operation>().ok(),
            None => Some(Operation::default()),
        };
        let record_name = params.get("recordname").cloned();
        self.report(operation, record_name, &result, ctx);

        Reply::from_result(&result).with_header(REQUEST_ID_HEADER, ctx.request_id.to_string())
    }

    /// Execute an already validated request
    ///
    /// # Errors
    /// Any [`EnrollError`]; nothing is written when an error is returned.
    pub fn execute(
        &self,
        request: ProtocolRequest,
        ctx: &RequestContext,
    ) -> Result<Outcome, EnrollError> {
        match request {
            ProtocolRequest::Enroll(new) => self.enroll(new, ctx),
            ProtocolRequest::Update(update) => self.update(update, ctx),
            ProtocolRequest::Checkin { record_name } => self.checkin(&record_name),
            ProtocolRequest::Fetch {
                record_name,
                identity_token,
            } => self.fetch(&record_name, &identity_token),
        }
    }

    fn enroll(&self, new: NewRecord, ctx: &RequestContext) -> Result<Outcome, EnrollError> {
        let now = self.clock.now();
        let record = ManifestRecord::enroll(new, &now, &ctx.caller.audit_string())?;
        let receipt = self.store.create(record.record_name(), &record)?;
        Ok(Outcome::Enrolled { record, receipt })
    }

    fn update(&self, update: UpdateRequest, ctx: &RequestContext) -> Result<Outcome, EnrollError> {
        let UpdateRequest { record_name, patch } = update;
        let stored = self.store.load(&record_name)?;

        let verdict = verify(stored.identity_token(), patch.identity_token.as_ref());
        tracing::debug!("Identity gate for {}: {:?}", record_name, verdict);
        if !verdict.permits_write() {
            return Err(SecurityViolation::IdentityMismatch.into());
        }

        let now = self.now_after(&stored);
        let merged = stored.apply_update(patch, &now, &ctx.caller.audit_string())?;
        let receipt = self.store.save(&record_name, &merged.record)?;
        Ok(Outcome::Updated {
            record: merged.record,
            receipt,
            changed: merged.changed,
        })
    }

    fn checkin(&self, record_name: &RecordName) -> Result<Outcome, EnrollError> {
        let stored = self.store.load(record_name)?;
        let record = stored.with_checkin(&self.now_after(&stored));
        let receipt = self.store.save(record_name, &record)?;
        Ok(Outcome::CheckedIn { record, receipt })
    }

    fn fetch(
        &self,
        record_name: &RecordName,
        token: &IdentityToken,
    ) -> Result<Outcome, EnrollError> {
        let stored = self.store.load(record_name)?;

        match verify(stored.identity_token(), Some(token)) {
            IdentityVerdict::Match => {}
            IdentityVerdict::Adopt | IdentityVerdict::NoCheckNeeded => {
                return Err(SecurityViolation::MissingIdentity.into())
            }
            IdentityVerdict::Mismatch => return Err(SecurityViolation::IdentityMismatch.into()),
        }

        let record = stored.with_checkin(&self.now_after(&stored));
        let receipt = self.store.save(record_name, &record)?;
        Ok(Outcome::Fetched {
            record,
            receipt,
            content_type: self.store.format().content_type(),
        })
    }

    /// Current time, never earlier than the record's last check-in
    fn now_after(&self, stored: &ManifestRecord) -> Timestamp {
        let now = self.clock.now();
        if now < *stored.checked_in_at() {
            stored.checked_in_at().clone()
        } else {
            now
        }
    }

    fn report(
        &self,
        operation: Option<Operation>,
        record_name: Option<String>,
        result: &Result<Outcome, EnrollError>,
        ctx: &RequestContext,
    ) {
        let name = record_name.as_deref().unwrap_or("-");
        let (status, detail, digest) = match result {
            Ok(outcome) => {
                let message = outcome.message();
                tracing::info!("{}", message);
                (
                    outcome.status_code(),
                    message,
                    Some(outcome.receipt().digest.clone()),
                )
            }
            Err(err) => {
                let op = op_name(operation);
                match err {
                    EnrollError::Server(_) => {
                        tracing::error!("{} failed for {}: {}", op, name, err);
                    }
                    EnrollError::Security(_) => {
                        tracing::warn!("{} rejected for {}: {}", op, name, err);
                    }
                    _ => tracing::info!("{} refused for {}: {}", op, name, err),
                }
                (err.status_code(), err.to_string(), None)
            }
        };

        self.audit.record(&AuditEvent {
            request_id: ctx.request_id,
            at: self.clock.now(),
            operation,
            record_name,
            status,
            caller: ctx.caller.audit_string(),
            detail,
            digest,
        });
    }
}

fn op_name(operation: Option<Operation>) -> &'static str {
    operation.map_or("request", Operation::as_str)
}

impl<S> std::fmt::Debug for ProtocolEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
