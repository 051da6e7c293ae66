//! # Position Monitor - Stop/Target Resolution
//!
//! ## Purpose
//! Watches every confirmed fill against the live quote stream until its stop
//! or target is crossed, accumulating the excursion metrics that feed the
//! post-mortem entry-quality classification.
//!
//! ## Resolution Rules
//! - Exits are evaluated on the position's exit side of the book (bid for
//!   longs, ask for shorts).
//! - The first level crossed decides the result. If a single tick's range
//!   spans both levels, the stop is assumed hit first: the ledger never
//!   credits a win that depended on intra-tick ordering we cannot observe.
//! - A stop within epsilon pips of the fill resolves BREAKEVEN.
//! - Positions whose symbol goes quiet past the quote-gap ceiling resolve
//!   UNRESOLVED and are flagged for manual reconciliation.
//!
//! Per-symbol multiplexing: all open positions on a symbol share one entry in
//! the symbol table, so a thousand EURUSD missions cost one subscription.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use types::{
    ConfirmedFill, Direction, EntryQuality, MarketTick, Outcome, OutcomeResult, SymbolSpec,
};

/// One open position under watch.
#[derive(Debug, Clone)]
struct ActivePosition {
    fill: ConfirmedFill,
    entry: f64,
    opened_at: DateTime<Utc>,
    /// Worst exit-side price movement against the position, in pips (>= 0).
    mae_pips: f64,
    /// Best exit-side price movement in favor, in pips (>= 0).
    mfe_pips: f64,
    last_quote_at: DateTime<Utc>,
}

/// Monitor tunables, lifted from the tracker config.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub quote_gap_ceiling: Duration,
    pub breakeven_epsilon_pips: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            quote_gap_ceiling: Duration::from_secs(4 * 3600),
            breakeven_epsilon_pips: 0.1,
        }
    }
}

/// Per-symbol multiplexed position tracking.
pub struct PositionMonitor {
    by_symbol: DashMap<String, Vec<ActivePosition>>,
    specs: DashMap<String, SymbolSpec>,
    config: MonitorConfig,
}

impl PositionMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            by_symbol: DashMap::new(),
            specs: DashMap::new(),
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

    /// Start watching a confirmed fill. Idempotent per order id.
    pub fn track(&self, fill: ConfirmedFill) -> bool {
        let entry = fill.fill_price();
        let symbol = fill.order.symbol.clone();
        let order_id = fill.order.order_id;

        let mut positions = self.by_symbol.entry(symbol.clone()).or_default();
        if positions.iter().any(|p| p.fill.order.order_id == order_id) {
            debug!(order = %order_id, "already tracking; duplicate fill ignored");
            return false;
        }

        let now = Utc::now();
        positions.push(ActivePosition {
            fill,
            entry,
            opened_at: now,
            mae_pips: 0.0,
            mfe_pips: 0.0,
            last_quote_at: now,
        });
        info!(order = %order_id, symbol = symbol.as_str(), entry, "tracking position");
        true
    }

    pub fn open_positions(&self) -> usize {
        self.by_symbol.iter().map(|e| e.len()).sum()
    }

    /// Evaluate one tick against every open position on its symbol.
    /// Returns the outcomes it resolved.
    pub fn on_tick(&self, tick: &MarketTick) -> Vec<Outcome> {
        let Some(mut positions) = self.by_symbol.get_mut(&tick.symbol) else {
            return Vec::new();
        };
        let spec = self.spec_for(&tick.symbol);
        let now = Utc::now();

        let mut resolved = Vec::new();
        positions.retain_mut(|position| {
            position.last_quote_at = now;

            let exit = position.fill.order.direction.exit_price(tick.bid, tick.ask);
            let sign = position.fill.order.direction.sign();
            let move_pips = spec.price_to_pips((exit - position.entry) * sign);
            position.mae_pips = position.mae_pips.max(-move_pips);
            position.mfe_pips = position.mfe_pips.max(move_pips);

            let stop = position.fill.order.stop;
            let target = position.fill.order.target;
            let stop_hit = (exit - stop) * sign <= 0.0;
            let target_hit = (exit - target) * sign >= 0.0;

            // Stop-first when the tick spans both levels.
            let result = if stop_hit {
                let stop_from_entry =
                    spec.price_to_pips((position.entry - stop) * sign).abs();
                if stop_from_entry <= self.config.breakeven_epsilon_pips {
                    Some((OutcomeResult::Breakeven, stop))
                } else {
                    Some((OutcomeResult::Loss, stop))
                }
            } else if target_hit {
                Some((OutcomeResult::Win, target))
            } else {
                None
            };

            match result {
                Some((result, exit_level)) => {
                    resolved.push(build_outcome(position, result, Some(exit_level), &spec, now));
                    false
                }
                None => true,
            }
        });
        resolved
    }

    /// Flag positions whose quote stream has been silent past the ceiling.
    pub fn sweep_quote_gaps(&self) -> Vec<Outcome> {
        let now = Utc::now();
        let ceiling = chrono::Duration::from_std(self.config.quote_gap_ceiling)
            .unwrap_or_else(|_| chrono::Duration::hours(4));

        let mut flagged = Vec::new();
        for mut entry in self.by_symbol.iter_mut() {
            let symbol = entry.key().clone();
            let spec = self.spec_for(&symbol);
            entry.retain_mut(|position| {
                if now - position.last_quote_at < ceiling {
                    return true;
                }
                warn!(
                    order = %position.fill.order.order_id,
                    symbol = symbol.as_str(),
                    "quote stream silent past ceiling; flagging UNRESOLVED"
                );
                flagged.push(build_outcome(
                    position,
                    OutcomeResult::Unresolved,
                    None,
                    &spec,
                    now,
                ));
                false
            });
        }
        flagged
    }
}

fn build_outcome(
    position: &ActivePosition,
    result: OutcomeResult,
    exit_level: Option<f64>,
    spec: &SymbolSpec,
    now: DateTime<Utc>,
) -> Outcome {
    let sign = position.fill.order.direction.sign();
    let pips = exit_level
        .map(|exit| spec.price_to_pips((exit - position.entry) * sign))
        .unwrap_or(0.0);
    let entry_quality = match result {
        OutcomeResult::Unresolved => None,
        _ => Some(classify_entry(
            result,
            pips,
            position.mae_pips,
        )),
    };

    Outcome {
        order_id: position.fill.order.order_id,
        user_id: position.fill.user_id.clone(),
        symbol: position.fill.order.symbol.clone(),
        direction: position.fill.order.direction,
        pattern: position.fill.pattern.clone(),
        result,
        exit_price: exit_level,
        pips,
        duration_secs: (now - position.opened_at).num_seconds(),
        max_adverse_excursion: position.mae_pips,
        max_favorable_excursion: position.mfe_pips.max(pips.max(0.0)),
        entry_quality,
        resolved_at: now,
    }
}

/// Post-mortem entry timing classification.
///
/// Losses are TRAPPED by definition (the adverse excursion never recovered).
/// Wins swept beyond 10 pips before recovering are EARLY. A win that kept
/// less than half of the move available from its own worst point is LATE.
/// Otherwise the adverse bands decide PERFECT (<5) and GOOD (<10).
fn classify_entry(result: OutcomeResult, pips: f64, mae_pips: f64) -> EntryQuality {
    match result {
        OutcomeResult::Loss => EntryQuality::Trapped,
        OutcomeResult::Win => {
            if mae_pips >= 10.0 {
                EntryQuality::Early
            } else if entry_efficiency(pips, mae_pips) < 0.5 {
                EntryQuality::Late
            } else if mae_pips < 5.0 {
                EntryQuality::Perfect
            } else {
                EntryQuality::Good
            }
        }
        OutcomeResult::Breakeven => {
            if mae_pips < 5.0 {
                EntryQuality::Perfect
            } else if mae_pips < 10.0 {
                EntryQuality::Good
            } else {
                EntryQuality::Late
            }
        }
        OutcomeResult::Unresolved => EntryQuality::Late, // unreachable; callers skip
    }
}

/// Share of the theoretically available move (from the position's own worst
/// point to the exit) that the actual entry captured.
fn entry_efficiency(pips: f64, mae_pips: f64) -> f64 {
    let theoretical = pips + mae_pips;
    if theoretical <= 0.0 {
        return 1.0;
    }
    (pips / theoretical).max(0.0)
}
