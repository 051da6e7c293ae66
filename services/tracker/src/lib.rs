//! # Outcome Tracker
//!
//! ## Purpose
//! The truth-tracking service. Subscribes to the router's event hub for
//! confirmed fills and live quotes, watches every open position until its
//! stop or target is crossed, computes post-mortem quality metrics, and
//! writes exactly one record per order to the append-only outcome ledger,
//! the sole source of truth for win-rate and pattern-performance reporting.
//!
//! ## Architecture Role
//! ```text
//! event-out (tick.* / fill.confirmed) ─→ [monitor] ─→ Outcome
//!                                            │           │
//!                                     quote-gap sweep    ├─→ ledger (JSONL)
//!                                                        └─→ confirm-in (report to router)
//! ```
//!
//! A position whose quote stream goes silent past the configured ceiling is
//! flagged UNRESOLVED for manual reconciliation, never guessed.

pub mod config;
pub mod consumer;
pub mod ledger;
pub mod monitor;

pub use config::TrackerConfig;
pub use consumer::TrackerConsumer;
pub use ledger::{LedgerError, LedgerStats, OutcomeLedger};
pub use monitor::PositionMonitor;
