//! Daily drawdown circuit breaker.
//!
//! Tracks per-user loss counts for the current trading day. At the
//! consecutive-loss soft limit the effective risk percent is halved; at the
//! absolute daily cap firing is refused for the rest of the day.

use crate::SizingError;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};
use types::{OutcomeResult, UserId, UserRiskProfile};

#[derive(Debug, Clone)]
struct DayRecord {
    day: NaiveDate,
    consecutive_losses: u32,
    total_losses: u32,
}

/// Per-user loss ledger for the current day.
#[derive(Default)]
pub struct DailyLossBook {
    records: DashMap<UserId, DayRecord>,
}

impl DailyLossBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a resolved outcome into the user's daily record.
    pub fn record_result(&self, user: &UserId, result: OutcomeResult) {
        self.record_result_on(user, result, Utc::now().date_naive());
    }

    pub fn record_result_on(&self, user: &UserId, result: OutcomeResult, day: NaiveDate) {
        let mut entry = self.records.entry(user.clone()).or_insert(DayRecord {
            day,
            consecutive_losses: 0,
            total_losses: 0,
        });
        if entry.day != day {
            entry.day = day;
            entry.consecutive_losses = 0;
            entry.total_losses = 0;
        }

        match result {
            OutcomeResult::Loss => {
                entry.consecutive_losses += 1;
                entry.total_losses += 1;
            }
            OutcomeResult::Win | OutcomeResult::Breakeven => {
                entry.consecutive_losses = 0;
            }
            // An unresolved outcome proves nothing either way.
            OutcomeResult::Unresolved => {}
        }
    }

    /// The risk percent this user may actually use right now: the tier's
    /// fixed percent, halved past the soft limit, refused past the cap.
    pub fn effective_risk(&self, profile: &UserRiskProfile) -> Result<Decimal, SizingError> {
        self.effective_risk_on(profile, Utc::now().date_naive())
    }

    pub fn effective_risk_on(
        &self,
        profile: &UserRiskProfile,
        day: NaiveDate,
    ) -> Result<Decimal, SizingError> {
        let (consecutive, total) = match self.records.get(&profile.user_id) {
            Some(record) if record.day == day => (record.consecutive_losses, record.total_losses),
            _ => (0, 0),
        };

        if total >= profile.daily_loss_cap {
            warn!(
                user = %profile.user_id,
                losses = total,
                cap = profile.daily_loss_cap,
                "daily drawdown cap reached, refusing to size"
            );
            return Err(SizingError::DrawdownLimit {
                losses: total,
                cap: profile.daily_loss_cap,
            });
        }

        if consecutive >= profile.consecutive_loss_soft_limit {
            let halved = profile.risk_percent_per_trade / dec!(2);
            info!(
                user = %profile.user_id,
                consecutive,
                "consecutive-loss soft limit hit, halving risk"
            );
            return Ok(halved);
        }

        Ok(profile.risk_percent_per_trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Tier;

    fn profile() -> UserRiskProfile {
        // Soft limit 4, cap 6, risk 2.00%.
        UserRiskProfile::for_tier(UserId::new("user-1"), Tier::Gold)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn four_consecutive_losses_halve_the_fifth_order() {
        let book = DailyLossBook::new();
        let profile = profile();
        for _ in 0..4 {
            book.record_result_on(&profile.user_id, OutcomeResult::Loss, day());
        }
        assert_eq!(
            book.effective_risk_on(&profile, day()).unwrap(),
            dec!(1.00)
        );
    }

    #[test]
    fn cap_blocks_outright() {
        let book = DailyLossBook::new();
        let profile = profile();
        for _ in 0..6 {
            book.record_result_on(&profile.user_id, OutcomeResult::Loss, day());
        }
        let err = book.effective_risk_on(&profile, day()).unwrap_err();
        assert!(err.is_drawdown());
        assert_eq!(
            err,
            SizingError::DrawdownLimit {
                losses: 6,
                cap: 6
            }
        );
    }

    #[test]
    fn win_resets_the_consecutive_count_but_not_the_total() {
        let book = DailyLossBook::new();
        let profile = profile();
        for _ in 0..3 {
            book.record_result_on(&profile.user_id, OutcomeResult::Loss, day());
        }
        book.record_result_on(&profile.user_id, OutcomeResult::Win, day());
        for _ in 0..2 {
            book.record_result_on(&profile.user_id, OutcomeResult::Loss, day());
        }
        // 5 total losses, 2 consecutive: full risk still available.
        assert_eq!(
            book.effective_risk_on(&profile, day()).unwrap(),
            dec!(2.00)
        );
        // One more loss reaches the cap of 6.
        book.record_result_on(&profile.user_id, OutcomeResult::Loss, day());
        assert!(book.effective_risk_on(&profile, day()).is_err());
    }

    #[test]
    fn a_new_day_resets_everything() {
        let book = DailyLossBook::new();
        let profile = profile();
        for _ in 0..6 {
            book.record_result_on(&profile.user_id, OutcomeResult::Loss, day());
        }
        let tomorrow = day().succ_opt().unwrap();
        book.record_result_on(&profile.user_id, OutcomeResult::Loss, tomorrow);
        // One loss so far today; full risk.
        assert_eq!(
            book.effective_risk_on(&profile, tomorrow).unwrap(),
            dec!(2.00)
        );
    }

    #[test]
    fn unresolved_outcomes_change_nothing() {
        let book = DailyLossBook::new();
        let profile = profile();
        for _ in 0..3 {
            book.record_result_on(&profile.user_id, OutcomeResult::Loss, day());
        }
        book.record_result_on(&profile.user_id, OutcomeResult::Unresolved, day());
        book.record_result_on(&profile.user_id, OutcomeResult::Loss, day());
        // 4 consecutive now; halved.
        assert_eq!(
            book.effective_risk_on(&profile, day()).unwrap(),
            dec!(1.00)
        );
    }
}
