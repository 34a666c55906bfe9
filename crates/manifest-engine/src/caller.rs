//! Caller metadata attached to records and audit tuples

use serde::{Deserialize, Serialize};
use ulid::Ulid;

const MAX_PART_LEN: usize = 200;

/// What the transport knows about who sent a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    /// Peer address of the connection
    pub remote_addr: Option<String>,
    /// `X-Forwarded-For` as received
    pub forwarded_for: Option<String>,
    /// User authenticated by the fronting gate
    pub user: Option<String>,
    /// `User-Agent` as received
    pub agent: Option<String>,
}

impl CallerInfo {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_forwarded_for(mut self, xff: impl Into<String>) -> Self {
        self.forwarded_for = Some(xff.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// `ip=<addr> xff=<...> user=<...> agent=<...>`, `-` for absent parts
    ///
    /// Parts are stripped of control characters and capped at 200 characters.
    #[must_use]
    pub fn audit_string(&self) -> String {
        format!(
            "ip={} xff={} user={} agent={}",
            clean(self.remote_addr.as_deref()),
            clean(self.forwarded_for.as_deref()),
            clean(self.user.as_deref()),
            clean(self.agent.as_deref()),
        )
    }
}

fn clean(part: Option<&str>) -> String {
    let cleaned: String = part
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_PART_LEN)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "-".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Per-request context: correlation id plus caller metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Ulid,
    pub caller: CallerInfo,
}

impl RequestContext {
    /// New context with a fresh request id
    #[must_use]
    pub fn new(caller: CallerInfo) -> Self {
        Self {
            request_id: Ulid::new(),
            caller,
        }
    }
}
