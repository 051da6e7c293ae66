//! # Mission Lifecycle State Machine
//!
//! ## Purpose
//! A Mission is the per-user instantiation of a Signal, carrying lifecycle
//! state from creation through dispatch to a terminal record. The legal
//! transition graph lives here so every service applies identical rules.
//!
//! ## State Graph
//! ```text
//! PENDING ─→ VALIDATED ─→ FIRED ─→ CONFIRMED ─→ CLOSED_WIN
//!    │           │          │          │      └→ CLOSED_LOSS
//!    │           │          │          │      └→ CLOSED_BE
//!    └→ REJECTED └→ REJECTED└→ REJECTED│
//!    └→ EXPIRED  └→ EXPIRED  (timeout / remote reject)
//! ```
//!
//! A mission reaches at most one terminal state; illegal transitions are
//! rejected with [`StateError`] rather than silently coerced.

use crate::identifiers::{MissionId, UserId};
use crate::profile::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionState {
    Pending,
    Validated,
    Fired,
    Confirmed,
    ClosedWin,
    ClosedLoss,
    ClosedBreakeven,
    Rejected,
    Expired,
}

impl MissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionState::ClosedWin
                | MissionState::ClosedLoss
                | MissionState::ClosedBreakeven
                | MissionState::Rejected
                | MissionState::Expired
        )
    }

    /// Whether the state machine permits `self → next`.
    pub fn can_transition_to(&self, next: MissionState) -> bool {
        use MissionState::*;
        matches!(
            (*self, next),
            (Pending, Validated)
                | (Pending, Rejected)
                | (Pending, Expired)
                | (Validated, Fired)
                | (Validated, Rejected)
                | (Validated, Expired)
                | (Fired, Confirmed)
                | (Fired, Rejected)
                | (Confirmed, ClosedWin)
                | (Confirmed, ClosedLoss)
                | (Confirmed, ClosedBreakeven)
        )
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissionState::Pending => "PENDING",
            MissionState::Validated => "VALIDATED",
            MissionState::Fired => "FIRED",
            MissionState::Confirmed => "CONFIRMED",
            MissionState::ClosedWin => "CLOSED_WIN",
            MissionState::ClosedLoss => "CLOSED_LOSS",
            MissionState::ClosedBreakeven => "CLOSED_BE",
            MissionState::Rejected => "REJECTED",
            MissionState::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

/// Why a mission was rejected. Codes are stable and user-visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Tier does not admit this pattern or confidence band.
    TierDenied,
    /// Confidence below the user's floor.
    ConfidenceBelowFloor,
    /// All concurrent slots in use.
    SlotsExhausted,
    /// User is inside a post-fire cooldown window.
    CooldownActive,
    /// Vitality collapsed below the execution floor.
    StaleSignal,
    /// Sizer refused to build an order.
    Sizing,
    /// Daily drawdown circuit breaker tripped; fatal for the day.
    DrawdownLimit,
    /// Fire channel marked DEGRADED; dispatch precondition failed.
    TransportDegraded,
    /// No confirmation arrived inside the dispatch timeout.
    DispatchTimeout,
    /// The remote terminal rejected the order.
    TerminalRejected,
    /// Cancelled by user override before firing.
    Cancelled,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::TierDenied => "TIER_DENIED",
            RejectReason::ConfidenceBelowFloor => "CONFIDENCE_FLOOR",
            RejectReason::SlotsExhausted => "SLOTS_EXHAUSTED",
            RejectReason::CooldownActive => "COOLDOWN_ACTIVE",
            RejectReason::StaleSignal => "STALE_SIGNAL",
            RejectReason::Sizing => "SIZING_ERROR",
            RejectReason::DrawdownLimit => "DRAWDOWN_LIMIT",
            RejectReason::TransportDegraded => "TRANSPORT_DEGRADED",
            RejectReason::DispatchTimeout => "DISPATCH_TIMEOUT",
            RejectReason::TerminalRejected => "TERMINAL_REJECTED",
            RejectReason::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// State machine violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        from: MissionState,
        to: MissionState,
    },

    #[error("mission {0} already terminal")]
    AlreadyTerminal(MissionId),
}

/// Per-user instantiation of a Signal carrying lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub mission_id: MissionId,
    pub signal_id: String,
    pub user_id: UserId,
    pub tier: Tier,
    pub state: MissionState,
    /// Set when `state` is `Rejected`; `None` otherwise.
    pub reject_reason: Option<RejectReason>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state_changed_at: DateTime<Utc>,
}

impl Mission {
    pub fn new(
        signal_id: impl Into<String>,
        user_id: UserId,
        tier: Tier,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            mission_id: MissionId::new(),
            signal_id: signal_id.into(),
            user_id,
            tier,
            state: MissionState::Pending,
            reject_reason: None,
            created_at: now,
            expires_at,
            state_changed_at: now,
        }
    }

    /// Apply a state transition, enforcing the legal graph.
    pub fn transition(&mut self, next: MissionState) -> Result<(), StateError> {
        if self.state.is_terminal() {
            return Err(StateError::AlreadyTerminal(self.mission_id));
        }
        if !self.state.can_transition_to(next) {
            return Err(StateError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.state_changed_at = Utc::now();
        Ok(())
    }

    /// Reject with a reason code. Same legality rules as [`transition`].
    pub fn reject(&mut self, reason: RejectReason) -> Result<(), StateError> {
        self.transition(MissionState::Rejected)?;
        self.reject_reason = Some(reason);
        Ok(())
    }

    /// Cancellation is only possible before firing; once FIRED the system
    /// must handle whatever confirmation eventually arrives.
    pub fn can_cancel(&self) -> bool {
        matches!(self.state, MissionState::Pending | MissionState::Validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mission() -> Mission {
        Mission::new(
            "sig-1",
            UserId::new("user-1"),
            Tier::Gold,
            Utc::now() + Duration::minutes(30),
        )
    }

    #[test]
    fn happy_path_transitions() {
        let mut m = mission();
        m.transition(MissionState::Validated).unwrap();
        m.transition(MissionState::Fired).unwrap();
        m.transition(MissionState::Confirmed).unwrap();
        m.transition(MissionState::ClosedWin).unwrap();
        assert!(m.state.is_terminal());
    }

    #[test]
    fn no_second_terminal_state() {
        let mut m = mission();
        m.reject(RejectReason::SlotsExhausted).unwrap();
        assert_eq!(
            m.transition(MissionState::Expired),
            Err(StateError::AlreadyTerminal(m.mission_id))
        );
        assert_eq!(m.reject_reason, Some(RejectReason::SlotsExhausted));
    }

    #[test]
    fn cannot_skip_validation() {
        let mut m = mission();
        assert!(matches!(
            m.transition(MissionState::Fired),
            Err(StateError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn confirmed_cannot_expire() {
        let mut m = mission();
        m.transition(MissionState::Validated).unwrap();
        m.transition(MissionState::Fired).unwrap();
        m.transition(MissionState::Confirmed).unwrap();
        assert!(matches!(
            m.transition(MissionState::Expired),
            Err(StateError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn cancel_window_closes_at_fired() {
        let mut m = mission();
        assert!(m.can_cancel());
        m.transition(MissionState::Validated).unwrap();
        assert!(m.can_cancel());
        m.transition(MissionState::Fired).unwrap();
        assert!(!m.can_cancel());
    }
}
