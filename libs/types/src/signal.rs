//! Trade signals as published by the external pattern detector.
//!
//! Signals are immutable once published: this core validates, freshens, and
//! routes them but never rewrites the detector's levels.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// +1.0 for long, -1.0 for short. Lets level arithmetic stay branch-free.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }

    /// The side of the book a new position enters at.
    pub fn entry_price(&self, bid: f64, ask: f64) -> f64 {
        match self {
            Direction::Buy => ask,
            Direction::Sell => bid,
        }
    }

    /// The side of the book an open position exits at.
    pub fn exit_price(&self, bid: f64, ask: f64) -> f64 {
        match self {
            Direction::Buy => bid,
            Direction::Sell => ask,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("BUY"),
            Direction::Sell => f.write_str("SELL"),
        }
    }
}

/// Execution tempo of a signal, derived from its pattern tag.
///
/// The fast/patient mix is a monitored distribution target, never a gate:
/// classification feeds metrics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalMode {
    Fast,
    Patient,
}

impl SignalMode {
    /// Classify a pattern tag against the configured fast-pattern prefixes.
    pub fn classify(pattern: &str, fast_prefixes: &[String]) -> Self {
        let lowered = pattern.to_ascii_lowercase();
        if fast_prefixes
            .iter()
            .any(|p| lowered.starts_with(&p.to_ascii_lowercase()))
        {
            SignalMode::Fast
        } else {
            SignalMode::Patient
        }
    }
}

/// A candidate trade opportunity produced by the external detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Detector-minted id; opaque to this core.
    pub signal_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    /// Detector confidence, 0-100.
    pub confidence: u8,
    /// Pattern tag, e.g. "momentum-break" or "range-fade".
    pub pattern: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Signal {
    /// Distance from entry to stop, always positive for a well-formed signal.
    pub fn stop_distance(&self) -> f64 {
        (self.entry - self.stop) * self.direction.sign()
    }

    /// Distance from entry to target, always positive for a well-formed signal.
    pub fn target_distance(&self) -> f64 {
        (self.target - self.entry) * self.direction.sign()
    }

    /// Reward-to-risk ratio of the raw levels.
    pub fn risk_reward(&self) -> f64 {
        let risk = self.stop_distance();
        if risk <= 0.0 {
            return 0.0;
        }
        self.target_distance() / risk
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.generated_at
    }

    /// Full window the detector considered the signal live for.
    pub fn nominal_lifetime(&self) -> Duration {
        self.expires_at - self.generated_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eurusd_long() -> Signal {
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

    #[test]
    fn distances_and_risk_reward() {
        let sig = eurusd_long();
        assert!((sig.stop_distance() - 0.0025).abs() < 1e-9);
        assert!((sig.target_distance() - 0.0050).abs() < 1e-9);
        assert!((sig.risk_reward() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn distances_flip_for_shorts() {
        let mut sig = eurusd_long();
        sig.direction = Direction::Sell;
        sig.stop = 1.0875;
        sig.target = 1.0800;
        assert!((sig.stop_distance() - 0.0025).abs() < 1e-9);
        assert!((sig.target_distance() - 0.0050).abs() < 1e-9);
    }

    #[test]
    fn mode_classification_uses_prefixes() {
        let fast = vec!["momentum".to_string(), "scalp".to_string()];
        assert_eq!(
            SignalMode::classify("momentum-break", &fast),
            SignalMode::Fast
        );
        assert_eq!(SignalMode::classify("range-fade", &fast), SignalMode::Patient);
        assert_eq!(SignalMode::classify("SCALP-LON", &fast), SignalMode::Fast);
    }
}
