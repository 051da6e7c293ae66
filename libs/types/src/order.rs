//! Fire orders and terminal confirmations.

use crate::identifiers::{MissionId, OrderId, UserId};
use crate::signal::Direction;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The concrete instruction dispatched to the remote execution terminal.
/// Immutable after dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireOrder {
    pub order_id: OrderId,
    pub mission_id: MissionId,
    pub symbol: String,
    pub direction: Direction,
    /// Volume in lots, already clamped and lot-step aligned.
    pub volume: f64,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    /// Effective risk percent the sizer used (may be halved by the breaker).
    pub risk_percent_used: Decimal,
    pub dispatched_at: DateTime<Utc>,
}

/// Terminal acknowledgment status for a fire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    Filled,
    Rejected,
}

/// The remote terminal's acknowledgment of a fire order.
///
/// Delivered at-least-once; consumers must treat duplicates as no-ops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub order_id: OrderId,
    pub status: ConfirmationStatus,
    /// Broker-side ticket for filled orders.
    pub broker_ticket: Option<i64>,
    /// Actual fill price; present only when `status` is `Filled`.
    pub fill_price: Option<f64>,
    /// Account balance snapshot reported by the terminal.
    pub account_balance: Option<Decimal>,
    pub received_at: DateTime<Utc>,
}

impl Confirmation {
    pub fn is_filled(&self) -> bool {
        self.status == ConfirmationStatus::Filled
    }
}

/// A filled order as broadcast on the event hub for downstream trackers.
///
/// Carries enough context that the outcome ledger can be written without a
/// second lookup against router state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedFill {
    pub mission_id: MissionId,
    pub user_id: UserId,
    pub pattern: String,
    pub order: FireOrder,
    pub confirmation: Confirmation,
}

impl ConfirmedFill {
    /// The price the position actually opened at; falls back to the order's
    /// adjusted entry when the terminal omitted a fill price.
    pub fn fill_price(&self) -> f64 {
        self.confirmation.fill_price.unwrap_or(self.order.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fill_price_falls_back_to_order_entry() {
        let order = FireOrder {
            order_id: OrderId::new(),
            mission_id: MissionId::new(),
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            volume: 0.10,
            entry: 1.0853,
            stop: 1.0828,
            target: 1.0903,
            risk_percent_used: dec!(1.0),
            dispatched_at: Utc::now(),
        };
        let fill = ConfirmedFill {
            mission_id: order.mission_id,
            user_id: UserId::new("user-1"),
            pattern: "momentum-break".into(),
            order: order.clone(),
            confirmation: Confirmation {
                order_id: order.order_id,
                status: ConfirmationStatus::Filled,
                broker_ticket: Some(99123),
                fill_price: None,
                account_balance: Some(dec!(10_000)),
                received_at: Utc::now(),
            },
        };
        assert_eq!(fill.fill_price(), 1.0853);
    }
}
