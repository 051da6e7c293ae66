//! The position sizer: vitality-adjusted levels in, complete fire order out.

use crate::{DailyLossBook, SizingError};
use chrono::Utc;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;
use types::{
    FireOrder, Mission, OrderId, Signal, SymbolSpec, UserRiskProfile, VitalityReading,
};

/// Sizer tunables.
#[derive(Debug, Clone)]
pub struct SizerConfig {
    /// Stops are floored at ATR x this multiplier when ATR is available, so
    /// no stop sits inside current noise.
    pub atr_multiplier: f64,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self { atr_multiplier: 1.5 }
    }
}

/// Account snapshot at sizing time, as last reported by the terminal.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub balance: Option<Decimal>,
    /// Average true range for the symbol, in price units, when a volatility
    /// window is available.
    pub atr: Option<f64>,
}

/// Converts validated missions into concrete orders.
pub struct PositionSizer {
    config: SizerConfig,
    loss_book: DailyLossBook,
}

impl PositionSizer {
    pub fn new(config: SizerConfig) -> Self {
        Self {
            config,
            loss_book: DailyLossBook::new(),
        }
    }

    pub fn loss_book(&self) -> &DailyLossBook {
        &self.loss_book
    }

    /// Build the order for a validated mission, or refuse with a specific
    /// error. Never returns a partially built order.
    pub fn build_order(
        &self,
        mission: &Mission,
        signal: &Signal,
        vitality: &VitalityReading,
        profile: &UserRiskProfile,
        account: &AccountState,
        spec: &SymbolSpec,
    ) -> Result<FireOrder, SizingError> {
        let balance = account.balance.ok_or(SizingError::MissingBalance)?;
        let risk_percent = self.loss_book.effective_risk(profile)?;
        let risk_amount = balance * risk_percent / dec!(100);

        let sign = signal.direction.sign();
        let mut stop_distance = (vitality.adjusted_entry - vitality.adjusted_stop) * sign;
        if let Some(atr) = account.atr {
            let floor = atr * self.config.atr_multiplier;
            if floor > stop_distance {
                debug!(
                    mission = %mission.mission_id,
                    stop_distance,
                    floor,
                    "widening stop to the ATR noise floor"
                );
                stop_distance = floor;
            }
        }
        if stop_distance <= 0.0 {
            return Err(SizingError::InvalidStopDistance(stop_distance));
        }

        let stop_pips = Decimal::from_f64(spec.price_to_pips(stop_distance))
            .filter(|p| p.is_sign_positive() && !p.is_zero())
            .ok_or(SizingError::InvalidStopDistance(stop_distance))?;

        // volume = risk / (stop in pips x pip value), clamped to the broker's
        // envelope and floored to the lot step.
        let raw_volume = risk_amount / (stop_pips * spec.pip_value_per_lot);
        let step = Decimal::from_f64(spec.volume_step)
            .filter(|s| !s.is_zero())
            .ok_or(SizingError::InvalidStopDistance(spec.volume_step))?;
        let max = Decimal::from_f64(spec.volume_max).unwrap_or(Decimal::MAX);
        let clamped = raw_volume.min(max);
        let volume = (clamped / step).floor() * step;

        let minimum = Decimal::from_f64(spec.volume_min).unwrap_or(Decimal::ZERO);
        if volume < minimum {
            return Err(SizingError::VolumeBelowMinimum {
                computed: volume.to_f64().unwrap_or(0.0),
                minimum: spec.volume_min,
            });
        }

        let entry = vitality.adjusted_entry;
        Ok(FireOrder {
            order_id: OrderId::new(),
            mission_id: mission.mission_id,
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            volume: volume.to_f64().unwrap_or(spec.volume_min),
            entry,
            stop: entry - sign * stop_distance,
            target: vitality.adjusted_target,
            risk_percent_used: risk_percent,
            dispatched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use types::{
        Direction, OutcomeResult, Tier, UserId, VitalityStatus,
    };

    fn signal() -> Signal {
        Signal {
            signal_id: "sig-1".into(),
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            entry: 1.0850,
            stop: 1.0825,
            target: 1.0900,
            confidence: 85,
            pattern: "momentum-break".into(),
            generated_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(30),
        }
    }

    fn mission() -> Mission {
        Mission::new(
            "sig-1",
            UserId::new("user-1"),
            Tier::Bronze,
            Utc::now() + Duration::minutes(30),
        )
    }

    fn reading(entry: f64, stop: f64, target: f64) -> VitalityReading {
        VitalityReading {
            mission_id: mission().mission_id,
            score: 96.0,
            status: VitalityStatus::Fresh,
            adjusted_entry: entry,
            adjusted_stop: stop,
            adjusted_target: target,
            reasons: vec![],
            computed_at: Utc::now(),
        }
    }

    fn bronze() -> UserRiskProfile {
        // 1.00% risk per trade.
        UserRiskProfile::for_tier(UserId::new("user-1"), Tier::Bronze)
    }

    fn account(balance: i64) -> AccountState {
        AccountState {
            balance: Some(Decimal::new(balance, 0)),
            atr: None,
        }
    }

    #[test]
    fn one_percent_of_ten_thousand_over_25_pips() {
        let sizer = PositionSizer::new(SizerConfig::default());
        // 25-pip stop, $10/pip/lot: risk $100 -> 0.40 lots.
        let order = sizer
            .build_order(
                &mission(),
                &signal(),
                &reading(1.0853, 1.0828, 1.0903),
                &bronze(),
                &account(10_000),
                &SymbolSpec::forex_default("EURUSD"),
            )
            .unwrap();
        assert!((order.volume - 0.40).abs() < 1e-9);
        assert_eq!(order.risk_percent_used, dec!(1.00));
        assert!((order.entry - 1.0853).abs() < 1e-9);
        assert!((order.stop - 1.0828).abs() < 1e-9);
        assert!((order.target - 1.0903).abs() < 1e-9);
    }

    #[test]
    fn volume_floors_to_the_lot_step() {
        let sizer = PositionSizer::new(SizerConfig::default());
        // 23-pip stop: 100 / 230 = 0.43478... -> 0.43.
        let order = sizer
            .build_order(
                &mission(),
                &signal(),
                &reading(1.0851, 1.0828, 1.0903),
                &bronze(),
                &account(10_000),
                &SymbolSpec::forex_default("EURUSD"),
            )
            .unwrap();
        assert!((order.volume - 0.43).abs() < 1e-9);
    }

    #[test]
    fn atr_floor_widens_tight_stops() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let mut account = account(10_000);
        // 10-pip adjusted stop against 20-pip ATR: floor = 30 pips.
        account.atr = Some(0.0020);
        let order = sizer
            .build_order(
                &mission(),
                &signal(),
                &reading(1.0850, 1.0840, 1.0900),
                &bronze(),
                &account,
                &SymbolSpec::forex_default("EURUSD"),
            )
            .unwrap();
        assert!((order.stop - 1.0820).abs() < 1e-9);
        // Volume sized against the widened 30-pip stop: 100/300 -> 0.33.
        assert!((order.volume - 0.33).abs() < 1e-9);
    }

    #[test]
    fn tiny_accounts_cannot_meet_the_minimum() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let err = sizer
            .build_order(
                &mission(),
                &signal(),
                &reading(1.0853, 1.0828, 1.0903),
                &bronze(),
                &account(100),
                &SymbolSpec::forex_default("EURUSD"),
            )
            .unwrap_err();
        assert!(matches!(err, SizingError::VolumeBelowMinimum { .. }));
    }

    #[test]
    fn missing_balance_is_refused() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let err = sizer
            .build_order(
                &mission(),
                &signal(),
                &reading(1.0853, 1.0828, 1.0903),
                &bronze(),
                &AccountState {
                    balance: None,
                    atr: None,
                },
                &SymbolSpec::forex_default("EURUSD"),
            )
            .unwrap_err();
        assert_eq!(err, SizingError::MissingBalance);
    }

    #[test]
    fn zero_stop_distance_is_refused() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let err = sizer
            .build_order(
                &mission(),
                &signal(),
                &reading(1.0850, 1.0850, 1.0900),
                &bronze(),
                &account(10_000),
                &SymbolSpec::forex_default("EURUSD"),
            )
            .unwrap_err();
        assert!(matches!(err, SizingError::InvalidStopDistance(_)));
    }

    #[test]
    fn breaker_halves_risk_after_consecutive_losses() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let profile = bronze();
        for _ in 0..4 {
            sizer
                .loss_book()
                .record_result(&profile.user_id, OutcomeResult::Loss);
        }
        let order = sizer
            .build_order(
                &mission(),
                &signal(),
                &reading(1.0853, 1.0828, 1.0903),
                &profile,
                &account(10_000),
                &SymbolSpec::forex_default("EURUSD"),
            )
            .unwrap();
        assert_eq!(order.risk_percent_used, dec!(0.50));
        assert!((order.volume - 0.20).abs() < 1e-9);
    }

    #[test]
    fn breaker_refuses_past_the_daily_cap() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let profile = bronze();
        for _ in 0..6 {
            sizer
                .loss_book()
                .record_result(&profile.user_id, OutcomeResult::Loss);
        }
        let err = sizer
            .build_order(
                &mission(),
                &signal(),
                &reading(1.0853, 1.0828, 1.0903),
                &profile,
                &account(10_000),
                &SymbolSpec::forex_default("EURUSD"),
            )
            .unwrap_err();
        assert!(err.is_drawdown());
    }
}
