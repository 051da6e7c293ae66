//! Per-symbol rolling market windows.
//!
//! Bounded memory: one ring buffer of recent samples per symbol. Writes come
//! from the single market-ingest loop (single-writer-per-symbol discipline);
//! reads are lock-cheap snapshots taken by the vitality engine.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use types::MarketTick;

/// Samples kept per symbol.
pub const WINDOW_CAPACITY: usize = 20;

#[derive(Debug, Clone)]
struct Sample {
    mid: f64,
    spread: f64,
    volume: f64,
}

#[derive(Debug)]
struct SymbolWindow {
    samples: VecDeque<Sample>,
    last: MarketTick,
}

impl SymbolWindow {
    fn new(tick: &MarketTick) -> Self {
        let mut samples = VecDeque::with_capacity(WINDOW_CAPACITY);
        samples.push_back(Sample {
            mid: tick.mid(),
            spread: tick.spread(),
            volume: tick.volume,
        });
        Self {
            samples,
            last: tick.clone(),
        }
    }

    fn push(&mut self, tick: &MarketTick) {
        if self.samples.len() == WINDOW_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            mid: tick.mid(),
            spread: tick.spread(),
            volume: tick.volume,
        });
        self.last = tick.clone();
    }

    fn avg_spread(&self) -> f64 {
        self.samples.iter().map(|s| s.spread).sum::<f64>() / self.samples.len() as f64
    }

    fn avg_volume(&self) -> f64 {
        self.samples.iter().map(|s| s.volume).sum::<f64>() / self.samples.len() as f64
    }

    /// Mean absolute mid-price change across the window. A tick-level stand-in
    /// for average true range; `None` until two samples exist.
    fn approx_atr(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let deltas: f64 = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .map(|(a, b)| (b.mid - a.mid).abs())
            .sum();
        Some(deltas / (self.samples.len() - 1) as f64)
    }
}

/// A read-only view of one symbol's window at a point in time.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub last: MarketTick,
    pub avg_spread: f64,
    pub avg_volume: f64,
    /// Tick-level average true range approximation, when enough samples exist.
    pub atr: Option<f64>,
    pub samples: usize,
}

/// Concurrent map of per-symbol windows.
#[derive(Default)]
pub struct MarketWindowCache {
    windows: DashMap<String, RwLock<SymbolWindow>>,
}

impl MarketWindowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick into its symbol's window.
    pub fn apply_tick(&self, tick: &MarketTick) {
        match self.windows.get(&tick.symbol) {
            Some(window) => window.write().push(tick),
            None => {
                self.windows
                    .insert(tick.symbol.clone(), RwLock::new(SymbolWindow::new(tick)));
            }
        }
    }

    /// Snapshot a symbol's rolling state; `None` when the feed has never
    /// delivered a quote for it.
    pub fn snapshot(&self, symbol: &str) -> Option<WindowSnapshot> {
        self.windows.get(symbol).map(|window| {
            let w = window.read();
            WindowSnapshot {
                last: w.last.clone(),
                avg_spread: w.avg_spread(),
                avg_volume: w.avg_volume(),
                atr: w.approx_atr(),
                samples: w.samples.len(),
            }
        })
    }

    pub fn tracked_symbols(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tick(symbol: &str, bid: f64, ask: f64, volume: f64) -> MarketTick {
        MarketTick {
            symbol: symbol.into(),
            bid,
            ask,
            volume,
            ts: Utc::now(),
        }
    }

    #[test]
    fn window_is_bounded() {
        let cache = MarketWindowCache::new();
        for i in 0..50 {
            cache.apply_tick(&tick("EURUSD", 1.0850, 1.0852, 100.0 + i as f64));
        }
        let snap = cache.snapshot("EURUSD").unwrap();
        assert_eq!(snap.samples, WINDOW_CAPACITY);
        // Average covers only the surviving samples (volumes 130..149).
        assert!((snap.avg_volume - 139.5).abs() < 1e-9);
    }

    #[test]
    fn rolling_averages_track_recent_state() {
        let cache = MarketWindowCache::new();
        cache.apply_tick(&tick("GBPUSD", 1.2500, 1.2502, 80.0));
        cache.apply_tick(&tick("GBPUSD", 1.2501, 1.2505, 120.0));
        let snap = cache.snapshot("GBPUSD").unwrap();
        assert!((snap.avg_spread - 0.0003).abs() < 1e-9);
        assert!((snap.avg_volume - 100.0).abs() < 1e-9);
        assert_eq!(snap.last.bid, 1.2501);
    }

    #[test]
    fn unknown_symbol_has_no_snapshot() {
        let cache = MarketWindowCache::new();
        assert!(cache.snapshot("USDJPY").is_none());
    }

    #[test]
    fn atr_needs_two_samples_and_averages_mid_moves() {
        let cache = MarketWindowCache::new();
        cache.apply_tick(&tick("EURUSD", 1.0850, 1.0852, 100.0));
        assert!(cache.snapshot("EURUSD").unwrap().atr.is_none());

        // Mids: 1.0851 -> 1.0856 -> 1.0853; moves of 5 and 3 pips.
        cache.apply_tick(&tick("EURUSD", 1.0855, 1.0857, 100.0));
        cache.apply_tick(&tick("EURUSD", 1.0852, 1.0854, 100.0));
        let atr = cache.snapshot("EURUSD").unwrap().atr.unwrap();
        assert!((atr - 0.0004).abs() < 1e-9);
    }
}
