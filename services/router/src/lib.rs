//! # Fire Router
//!
//! ## Purpose
//! The orchestrator service. Consumes detector signals, instantiates per-user
//! missions, enforces tier/risk policy, freshens levels through the vitality
//! engine, sizes orders, dispatches them to the remote terminal, and
//! reconciles the asynchronous confirmations and outcome reports that flow
//! back.
//!
//! ## Architecture Role
//! ```text
//! signal-in ──→ [validate] ─→ [size] ─→ [dispatch] ─→ fire-out
//!                   │                        │
//! market-data-in ─→ windows            timer wheel (confirm timeout)
//!                   │                        │
//! confirm-in ──→ [listener] ─→ missions ─→ event-out (fill.confirmed)
//! ```
//!
//! All shared state lives in [`router::RouterCore`]: the mission registry,
//! the per-user slot counters, the cooldown book, and the metrics. Each
//! channel drains on its own tokio task so a burst on one can never block
//! another.

pub mod config;
pub mod confirm;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod slots;
pub mod timer;

pub use config::RouterConfig;
pub use metrics::RouterMetrics;
pub use router::RouterCore;
