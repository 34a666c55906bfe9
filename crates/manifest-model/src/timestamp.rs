//! Record timestamps: epoch seconds plus a human-readable rendering

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

const HUMAN_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Point in time as stored in a record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch, never negative
    pub epoch: i64,
    /// `YYYY-MM-DD HH:MM:SS UTC`
    pub human: String,
}

impl Timestamp {
    /// Build from a UTC instant; pre-epoch instants clamp to 0
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::from_epoch(at.timestamp())
    }

    /// Build from epoch seconds; negative values clamp to 0
    #[must_use]
    pub fn from_epoch(epoch: i64) -> Self {
        let epoch = epoch.max(0);
        let human = Utc
            .timestamp_opt(epoch, 0)
            .single()
            .map(|dt| dt.format(HUMAN_FORMAT).to_string())
            .unwrap_or_default();
        Self { epoch, human }
    }

    /// Unix epoch
    #[must_use]
    pub fn zero() -> Self {
        Self::from_epoch(0)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.human)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_rendering() {
        let ts = Timestamp::from_epoch(1_700_000_000);
        assert_eq!(ts.human, "2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn negative_clamps_to_epoch() {
        assert_eq!(Timestamp::from_epoch(-5), Timestamp::zero());
        assert_eq!(Timestamp::zero().human, "1970-01-01 00:00:00 UTC");
    }

    #[test]
    fn ordering_follows_epoch() {
        assert!(Timestamp::from_epoch(10) < Timestamp::from_epoch(11));
    }
}
