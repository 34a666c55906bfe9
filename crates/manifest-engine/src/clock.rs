//! Time source for record timestamps

use chrono::Utc;
use manifest_model::Timestamp;

/// Source of "now" for the engine
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock, UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_datetime(Utc::now())
    }
}
