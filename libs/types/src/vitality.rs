//! Vitality readings: transient freshness snapshots for a mission.

use crate::identifiers::MissionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution floor: below this score a dispatch must be refused.
pub const EXECUTION_FLOOR: f64 = 20.0;

/// Freshness band of a vitality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VitalityStatus {
    Fresh,
    Valid,
    Aging,
    Expired,
}

impl VitalityStatus {
    /// Band thresholds: FRESH >= 80, VALID >= 50, AGING >= 20, EXPIRED < 20.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            VitalityStatus::Fresh
        } else if score >= 50.0 {
            VitalityStatus::Valid
        } else if score >= EXECUTION_FLOOR {
            VitalityStatus::Aging
        } else {
            VitalityStatus::Expired
        }
    }

    pub fn allows_execution(&self) -> bool {
        *self != VitalityStatus::Expired
    }
}

impl fmt::Display for VitalityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VitalityStatus::Fresh => "FRESH",
            VitalityStatus::Valid => "VALID",
            VitalityStatus::Aging => "AGING",
            VitalityStatus::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

/// A freshness snapshot for one mission. Recomputed on demand, cached at
/// most 30 seconds, never persisted; always derivable from the original
/// signal plus live market state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalityReading {
    pub mission_id: MissionId,
    /// 0-100; higher is fresher.
    pub score: f64,
    pub status: VitalityStatus,
    /// Levels re-anchored to the current price, preserving the original
    /// stop/target distances (and therefore the original risk:reward).
    pub adjusted_entry: f64,
    pub adjusted_stop: f64,
    pub adjusted_target: f64,
    /// Human-readable degradation notes for operators; empty when FRESH.
    pub reasons: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl VitalityReading {
    pub fn allows_execution(&self) -> bool {
        self.score >= EXECUTION_FLOOR
    }

    /// Age of this reading against a cache time-to-live.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        (now - self.computed_at).num_seconds() >= ttl_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_thresholds() {
        assert_eq!(VitalityStatus::from_score(95.0), VitalityStatus::Fresh);
        assert_eq!(VitalityStatus::from_score(80.0), VitalityStatus::Fresh);
        assert_eq!(VitalityStatus::from_score(79.99), VitalityStatus::Valid);
        assert_eq!(VitalityStatus::from_score(50.0), VitalityStatus::Valid);
        assert_eq!(VitalityStatus::from_score(49.99), VitalityStatus::Aging);
        assert_eq!(VitalityStatus::from_score(20.0), VitalityStatus::Aging);
        assert_eq!(VitalityStatus::from_score(19.99), VitalityStatus::Expired);
    }

    #[test]
    fn execution_floor_is_exactly_twenty() {
        assert!(VitalityStatus::from_score(20.0).allows_execution());
        assert!(!VitalityStatus::from_score(19.99).allows_execution());
    }
}
