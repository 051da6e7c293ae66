//! # Firegrid Type System
//!
//! ## Purpose
//! Central type crate for the Firegrid signal routing system. Defines the
//! data model shared by every service (signals, missions, fire orders,
//! confirmations, outcomes, risk profiles) plus the tagged wire envelope
//! validated at the transport boundary.
//!
//! ## Architecture Role
//! ```text
//! Detector → Signal → [Fire Router] → FireOrder → Remote Terminal
//!                          ↓                           ↓
//!                       Mission ←──── Confirmation ────┘
//!                          ↓
//!                       Outcome → Ledger
//! ```
//!
//! Every message crossing a channel is a [`ChannelMessage`] variant; business
//! logic never sees raw bytes or untyped payloads.

pub mod envelope;
pub mod identifiers;
pub mod market;
pub mod mission;
pub mod order;
pub mod outcome;
pub mod profile;
pub mod signal;
pub mod vitality;

pub use envelope::{
    tick_topic, ChannelMessage, ConsumerRegistration, EventBody, EventFrame, Heartbeat,
    FILL_TOPIC, TICK_TOPIC_PREFIX,
};
pub use identifiers::{MissionId, OrderId, UserId};
pub use market::{MarketTick, SymbolSpec};
pub use mission::{Mission, MissionState, RejectReason, StateError};
pub use order::{Confirmation, ConfirmationStatus, ConfirmedFill, FireOrder};
pub use outcome::{EntryQuality, Outcome, OutcomeResult};
pub use profile::{Tier, UserRiskProfile};
pub use signal::{Direction, Signal, SignalMode};
pub use vitality::{VitalityReading, VitalityStatus};
