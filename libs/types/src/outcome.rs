//! Terminal outcome records: the append-only system of record.

use crate::identifiers::{OrderId, UserId};
use crate::signal::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a filled order ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeResult {
    Win,
    Loss,
    Breakeven,
    /// Quote feed was silent past the configured ceiling; flagged for manual
    /// reconciliation, never guessed.
    Unresolved,
}

impl fmt::Display for OutcomeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutcomeResult::Win => "WIN",
            OutcomeResult::Loss => "LOSS",
            OutcomeResult::Breakeven => "BREAKEVEN",
            OutcomeResult::Unresolved => "UNRESOLVED",
        };
        f.write_str(name)
    }
}

/// Post-mortem classification of the fill's entry timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryQuality {
    /// Adverse excursion stayed under 5 pips.
    Perfect,
    /// Adverse excursion stayed under 10 pips.
    Good,
    /// Swept beyond 10 pips but recovered to a win; entered too soon.
    Early,
    /// Captured less than half the theoretical best entry's move.
    Late,
    /// Adverse excursion with no recovery, ending in loss.
    Trapped,
}

/// Terminal record of how a filled order ended. Written exactly once per
/// order_id to the append-only ledger, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: String,
    pub direction: Direction,
    pub pattern: String,
    pub result: OutcomeResult,
    /// Exit price at resolution; `None` for unresolved outcomes.
    pub exit_price: Option<f64>,
    /// Signed pips from fill to exit; positive is profit.
    pub pips: f64,
    pub duration_secs: i64,
    /// Worst unrealized drawdown before resolution, in pips (>= 0).
    pub max_adverse_excursion: f64,
    /// Best unrealized gain before resolution, in pips (>= 0).
    pub max_favorable_excursion: f64,
    /// Absent for unresolved outcomes.
    pub entry_quality: Option<EntryQuality>,
    pub resolved_at: DateTime<Utc>,
}

impl Outcome {
    pub fn is_resolved(&self) -> bool {
        self.result != OutcomeResult::Unresolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_to_single_json_line() {
        let outcome = Outcome {
            order_id: OrderId::new(),
            user_id: UserId::new("user-1"),
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            pattern: "momentum-break".into(),
            result: OutcomeResult::Win,
            exit_price: Some(1.0903),
            pips: 50.0,
            duration_secs: 1840,
            max_adverse_excursion: 3.2,
            max_favorable_excursion: 50.0,
            entry_quality: Some(EntryQuality::Perfect),
            resolved_at: Utc::now(),
        };
        let line = serde_json::to_string(&outcome).unwrap();
        assert!(!line.contains('\n'));
        let back: Outcome = serde_json::from_str(&line).unwrap();
        assert_eq!(back, outcome);
    }
}
