//! # Vitality Engine
//!
//! ## Purpose
//! Scores how much of a signal's validity remains, given what the market has
//! done since the detector published it. The Fire Router refuses any dispatch
//! whose vitality has collapsed below the execution floor, and re-anchors
//! entry/stop/target for everything it does dispatch.
//!
//! ## Scoring
//! ```text
//! score = 100 x (1 - weighted_penalty)
//! weighted_penalty = 0.5 x price_drift + 0.3 x spread + 0.2 x volume
//! ```
//! Each penalty is in [0, 1] and derived from the per-symbol rolling window
//! (last 20 samples, ring buffer). Drift saturation (15+ pips) invalidates
//! the signal premise outright. With no live quote at all the engine falls
//! back to pure time decay instead of failing closed.

pub mod engine;
pub mod window;

pub use engine::{VitalityConfig, VitalityEngine};
pub use window::{MarketWindowCache, WindowSnapshot};
