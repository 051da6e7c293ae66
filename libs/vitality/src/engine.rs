//! The vitality scoring engine.

use crate::window::{MarketWindowCache, WindowSnapshot};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use types::{MissionId, Signal, SymbolSpec, VitalityReading, VitalityStatus};

/// Scoring parameters. Defaults implement the canonical curve; deployments
/// rarely need to touch these.
#[derive(Debug, Clone)]
pub struct VitalityConfig {
    /// Readings younger than this are reused instead of recomputed.
    pub cache_ttl_secs: i64,
    /// Drift below this many pips costs nothing.
    pub drift_free_pips: f64,
    /// Drift at or beyond this invalidates the signal premise outright.
    pub drift_max_pips: f64,
    /// Spread at or below this multiple of the rolling average costs nothing.
    pub spread_free_ratio: f64,
    /// Spread at this multiple costs 0.5; the slope continues to 1.0.
    pub spread_half_ratio: f64,
    /// Volume at or above this fraction of the rolling average costs nothing.
    pub volume_free_ratio: f64,
    /// Volume at this fraction costs 0.4.
    pub volume_mid_ratio: f64,
    /// Volume at or below this fraction costs the full 1.0 (illiquid).
    pub volume_floor_ratio: f64,
}

impl Default for VitalityConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 30,
            drift_free_pips: 5.0,
            drift_max_pips: 15.0,
            spread_free_ratio: 1.5,
            spread_half_ratio: 2.5,
            volume_free_ratio: 0.70,
            volume_mid_ratio: 0.40,
            volume_floor_ratio: 0.10,
        }
    }
}

impl VitalityConfig {
    /// Price drift penalty in [0, 1].
    pub fn drift_penalty(&self, drift_pips: f64) -> f64 {
        let span = self.drift_max_pips - self.drift_free_pips;
        ((drift_pips - self.drift_free_pips) / span).clamp(0.0, 1.0)
    }

    /// Spread penalty in [0, 1]: free below 1.5x average, 0.5 at 2.5x, and
    /// the same slope up to the 1.0 cap.
    pub fn spread_penalty(&self, spread_ratio: f64) -> f64 {
        if spread_ratio <= self.spread_free_ratio {
            return 0.0;
        }
        let slope = 0.5 / (self.spread_half_ratio - self.spread_free_ratio);
        ((spread_ratio - self.spread_free_ratio) * slope).min(1.0)
    }

    /// Volume penalty in [0, 1]: free above 70% of average, 0.4 at 40%,
    /// full penalty at or below the illiquidity floor.
    pub fn volume_penalty(&self, volume_ratio: f64) -> f64 {
        if volume_ratio >= self.volume_free_ratio {
            0.0
        } else if volume_ratio >= self.volume_mid_ratio {
            let span = self.volume_free_ratio - self.volume_mid_ratio;
            (self.volume_free_ratio - volume_ratio) / span * 0.4
        } else if volume_ratio > self.volume_floor_ratio {
            let span = self.volume_mid_ratio - self.volume_floor_ratio;
            0.4 + (self.volume_mid_ratio - volume_ratio) / span * 0.6
        } else {
            1.0
        }
    }
}

/// Combine component penalties into a 0-100 score.
pub(crate) fn weighted_score(drift: f64, spread: f64, volume: f64) -> f64 {
    let weighted = 0.5 * drift + 0.3 * spread + 0.2 * volume;
    (100.0 * (1.0 - weighted)).clamp(0.0, 100.0)
}

/// Freshness scoring over the shared market window cache.
pub struct VitalityEngine {
    cache: Arc<MarketWindowCache>,
    specs: DashMap<String, SymbolSpec>,
    readings: DashMap<MissionId, VitalityReading>,
    config: VitalityConfig,
}

impl VitalityEngine {
    pub fn new(cache: Arc<MarketWindowCache>, config: VitalityConfig) -> Self {
        Self {
            cache,
            specs: DashMap::new(),
            readings: DashMap::new(),
            config,
        }
    }

    pub fn register_spec(&self, spec: SymbolSpec) {
        self.specs.insert(spec.symbol.clone(), spec);
    }

    fn spec_for(&self, symbol: &str) -> SymbolSpec {
        self.specs
            .get(symbol)
            .map(|s| s.clone())
            .unwrap_or_else(|| SymbolSpec::forex_default(symbol))
    }

    /// Cached lookup: reuse a reading younger than the TTL, otherwise
    /// recompute from live state.
    pub fn reading_for(&self, mission_id: MissionId, signal: &Signal) -> VitalityReading {
        let now = Utc::now();
        if let Some(cached) = self.readings.get(&mission_id) {
            if !cached.is_stale(now, self.config.cache_ttl_secs) {
                return cached.clone();
            }
        }
        let reading = self.compute(mission_id, signal, now);
        self.readings.insert(mission_id, reading.clone());
        reading
    }

    /// Drop a mission's cached reading (terminal state housekeeping).
    pub fn invalidate(&self, mission_id: &MissionId) {
        self.readings.remove(mission_id);
    }

    /// Score a signal against live market state, falling back to pure time
    /// decay when the feed has never quoted the symbol.
    pub fn compute(
        &self,
        mission_id: MissionId,
        signal: &Signal,
        now: DateTime<Utc>,
    ) -> VitalityReading {
        match self.cache.snapshot(&signal.symbol) {
            Some(snapshot) => self.score_against_market(mission_id, signal, &snapshot, now),
            None => self.time_decay(mission_id, signal, now),
        }
    }

    fn score_against_market(
        &self,
        mission_id: MissionId,
        signal: &Signal,
        snapshot: &WindowSnapshot,
        now: DateTime<Utc>,
    ) -> VitalityReading {
        let spec = self.spec_for(&signal.symbol);
        let drift_pips = (snapshot.last.mid() - signal.entry).abs() / spec.pip_size;
        let spread_ratio = if snapshot.avg_spread > 0.0 {
            snapshot.last.spread() / snapshot.avg_spread
        } else {
            1.0
        };
        let volume_ratio = if snapshot.avg_volume > 0.0 {
            snapshot.last.volume / snapshot.avg_volume
        } else {
            1.0
        };

        let drift = self.config.drift_penalty(drift_pips);
        let spread = self.config.spread_penalty(spread_ratio);
        let volume = self.config.volume_penalty(volume_ratio);

        let mut reasons = Vec::new();
        let score = if drift >= 1.0 {
            // The market left the level behind; no spread or volume reading
            // can rescue a premise that no longer exists.
            reasons.push(format!(
                "price drifted {:.1} pips from signal entry, beyond the {:.0}-pip ceiling",
                drift_pips, self.config.drift_max_pips
            ));
            0.0
        } else {
            if drift > 0.0 {
                reasons.push(format!(
                    "price drifted {:.1} pips from signal entry",
                    drift_pips
                ));
            }
            if spread > 0.0 {
                reasons.push(format!(
                    "spread at {:.1}x rolling average",
                    spread_ratio
                ));
            }
            if volume > 0.0 {
                reasons.push(format!(
                    "volume at {:.0}% of rolling average",
                    volume_ratio * 100.0
                ));
            }
            weighted_score(drift, spread, volume)
        };

        let status = VitalityStatus::from_score(score);
        if status == VitalityStatus::Fresh {
            reasons.clear();
        }

        // Re-anchor levels to the live book, preserving the original stop
        // and target distances and therefore the detector's risk:reward.
        let (adjusted_entry, adjusted_stop, adjusted_target) = if status.allows_execution() {
            let entry = signal
                .direction
                .entry_price(snapshot.last.bid, snapshot.last.ask);
            let sign = signal.direction.sign();
            (
                entry,
                entry - sign * signal.stop_distance(),
                entry + sign * signal.target_distance(),
            )
        } else {
            (signal.entry, signal.stop, signal.target)
        };

        debug!(
            %mission_id,
            score,
            %status,
            drift_pips,
            "vitality computed from live market"
        );

        VitalityReading {
            mission_id,
            score,
            status,
            adjusted_entry,
            adjusted_stop,
            adjusted_target,
            reasons,
            computed_at: now,
        }
    }

    fn time_decay(
        &self,
        mission_id: MissionId,
        signal: &Signal,
        now: DateTime<Utc>,
    ) -> VitalityReading {
        let lifetime = signal.nominal_lifetime().num_seconds().max(1) as f64;
        let age = signal.age(now).num_seconds().max(0) as f64;
        let score = (100.0 * (1.0 - age / lifetime)).clamp(0.0, 100.0);
        let status = VitalityStatus::from_score(score);

        debug!(%mission_id, score, %status, "vitality from time decay (no live quote)");

        VitalityReading {
            mission_id,
            score,
            status,
            adjusted_entry: signal.entry,
            adjusted_stop: signal.stop,
            adjusted_target: signal.target,
            reasons: vec![format!(
                "no live quote for {}; scored by time decay",
                signal.symbol
            )],
            computed_at: now,
        }
    }
}
