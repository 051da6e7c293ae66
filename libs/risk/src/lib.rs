//! # Risk & Position Sizing
//!
//! ## Purpose
//! Pure computation from account state + signal + vitality to concrete order
//! parameters, plus the daily drawdown circuit breaker. Money stays in
//! `Decimal` end to end; only price geometry (pips, levels) is `f64`.
//!
//! The sizer either returns a complete [`types::FireOrder`] or an error,
//! never a partially built order.

pub mod drawdown;
pub mod sizer;

pub use drawdown::DailyLossBook;
pub use sizer::{AccountState, PositionSizer, SizerConfig};

/// Sizing failures. `DrawdownLimit` is surfaced distinctly so operators can
/// tell a risk-breaker trip from routine filtering.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SizingError {
    #[error("account balance unavailable")]
    MissingBalance,

    #[error("stop distance {0} is not positive")]
    InvalidStopDistance(f64),

    #[error("computed volume {computed} below symbol minimum {minimum}")]
    VolumeBelowMinimum { computed: f64, minimum: f64 },

    #[error("daily drawdown limit reached: {losses} losses against cap {cap}")]
    DrawdownLimit { losses: u32, cap: u32 },
}

impl SizingError {
    /// Whether this error is the fatal-for-the-day breaker rather than an
    /// ordinary sizing failure.
    pub fn is_drawdown(&self) -> bool {
        matches!(self, SizingError::DrawdownLimit { .. })
    }
}
