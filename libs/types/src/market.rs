//! Market data primitives: live ticks and per-symbol trading specs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single best-effort quote from a market data producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// Tick volume reported by the feed for the current sampling period.
    pub volume: f64,
    pub ts: DateTime<Utc>,
}

impl MarketTick {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Broker-facing contract parameters for a symbol.
///
/// Pip geometry is price arithmetic (f64); pip value is money and stays in
/// [`Decimal`] so position sizing never accumulates float error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub symbol: String,
    /// Price increment of one pip (0.0001 for most pairs, 0.01 for JPY quotes).
    pub pip_size: f64,
    /// Account-currency value of one pip for one standard lot.
    pub pip_value_per_lot: Decimal,
    /// Smallest volume the broker accepts, in lots.
    pub volume_min: f64,
    /// Largest volume the broker accepts, in lots.
    pub volume_max: f64,
    /// Broker lot step; computed volumes round down to a multiple of this.
    pub volume_step: f64,
}

impl SymbolSpec {
    /// Sensible defaults for a major forex pair. JPY-quoted pairs use the
    /// two-decimal pip convention.
    pub fn forex_default(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let pip_size = if symbol.to_uppercase().ends_with("JPY") {
            0.01
        } else {
            0.0001
        };
        Self {
            symbol,
            pip_size,
            pip_value_per_lot: Decimal::new(10, 0),
            volume_min: 0.01,
            volume_max: 50.0,
            volume_step: 0.01,
        }
    }

    /// Convert a price distance into pips for this symbol.
    pub fn price_to_pips(&self, distance: f64) -> f64 {
        distance / self.pip_size
    }

    /// Convert a pip count into a price distance for this symbol.
    pub fn pips_to_price(&self, pips: f64) -> f64 {
        pips * self.pip_size
    }
}
