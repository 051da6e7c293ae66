//! Per-user risk policy, owned by the external policy engine.
//!
//! Profiles are read-only inside this core: validation consults them, the
//! drawdown book tracks against them, nothing here mutates them.

use crate::identifiers::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription tier. Determines confidence floor, slot count, and the fixed
/// per-trade risk percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Bronze => "BRONZE",
            Tier::Silver => "SILVER",
            Tier::Gold => "GOLD",
            Tier::Platinum => "PLATINUM",
        };
        f.write_str(name)
    }
}

/// Per-user risk and policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRiskProfile {
    pub user_id: UserId,
    pub tier: Tier,
    /// Concurrent open-position allowance.
    pub max_concurrent_slots: u32,
    /// Fixed per-trade risk percent for the tier (1.0 means 1%). Never
    /// user-adjustable.
    pub risk_percent_per_trade: Decimal,
    /// Minimum detector confidence this user receives.
    pub confidence_floor: u8,
    /// Consecutive losses today after which risk is halved.
    pub consecutive_loss_soft_limit: u32,
    /// Total losses today after which firing is refused outright.
    pub daily_loss_cap: u32,
    /// Seconds a user must wait between fires.
    pub cooldown_secs: u64,
}

impl UserRiskProfile {
    /// Policy-engine defaults per tier; real deployments load profiles from
    /// the policy service's export file.
    pub fn for_tier(user_id: UserId, tier: Tier) -> Self {
        let (slots, risk_bp, floor) = match tier {
            Tier::Bronze => (1, 100, 85),
            Tier::Silver => (2, 150, 75),
            Tier::Gold => (3, 200, 70),
            Tier::Platinum => (5, 200, 60),
        };
        Self {
            user_id,
            tier,
            max_concurrent_slots: slots,
            risk_percent_per_trade: Decimal::new(risk_bp, 2),
            confidence_floor: floor,
            consecutive_loss_soft_limit: 4,
            daily_loss_cap: 6,
            cooldown_secs: 120,
        }
    }

    /// Whether the tier admits a signal of this confidence at all.
    pub fn admits_confidence(&self, confidence: u8) -> bool {
        confidence >= self.confidence_floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tier_defaults_scale_with_level() {
        let bronze = UserRiskProfile::for_tier(UserId::new("a"), Tier::Bronze);
        let platinum = UserRiskProfile::for_tier(UserId::new("b"), Tier::Platinum);
        assert!(bronze.max_concurrent_slots < platinum.max_concurrent_slots);
        assert!(bronze.confidence_floor > platinum.confidence_floor);
        assert_eq!(bronze.risk_percent_per_trade, dec!(1.00));
        assert_eq!(platinum.risk_percent_per_trade, dec!(2.00));
    }

    #[test]
    fn confidence_floor_is_inclusive() {
        let profile = UserRiskProfile::for_tier(UserId::new("a"), Tier::Gold);
        assert!(profile.admits_confidence(70));
        assert!(!profile.admits_confidence(69));
    }
}
