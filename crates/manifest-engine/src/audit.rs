//! Audit trail
//!
//! One [`AuditEvent`] per request, emitted after the outcome is known. Full
//! server-side error detail goes here and never into a response body.

use crate::request::Operation;
use manifest_model::Timestamp;
use parking_lot::Mutex;
use serde::Serialize;
use ulid::Ulid;

/// Audit tuple for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub request_id: Ulid,
    pub at: Timestamp,
    /// `None` when the `function` parameter itself was invalid
    pub operation: Option<Operation>,
    /// Raw `recordname` as supplied, so rejected names are still traceable
    pub record_name: Option<String>,
    /// HTTP status the request resolved to
    pub status: u16,
    /// Caller audit string
    pub caller: String,
    /// Outcome summary or full internal error text
    pub detail: String,
    /// Digest of the document written, if any
    pub digest: Option<String>,
}

impl AuditEvent {
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Emits each event as a structured `tracing` event on target `manifest_audit`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let operation = event.operation.map_or("-", Operation::as_str);
        let record_name = event.record_name.as_deref().unwrap_or("-");
        let digest = event.digest.as_deref().unwrap_or("-");

        if event.is_success() {
            tracing::info!(
                target: "manifest_audit",
                request_id = %event.request_id,
                at = event.at.epoch,
                operation,
                record_name,
                status = event.status,
                caller = %event.caller,
                digest,
                "{}",
                event.detail
            );
        } else {
            tracing::warn!(
                target: "manifest_audit",
                request_id = %event.request_id,
                at = event.at.epoch,
                operation,
                record_name,
                status = event.status,
                caller = %event.caller,
                "{}",
                event.detail
            );
        }
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    inner: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far
    pub fn events(&self) -> Vec<AuditEvent> {
        self.inner.lock().clone()
    }

    /// Most recent event
    pub fn last(&self) -> Option<AuditEvent> {
        self.inner.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.inner.lock().push(event.clone());
    }
}
