//! # Firegrid Transport Layer
//!
//! ## Purpose
//! Socket abstraction over the six logical channels connecting the Firegrid
//! services: market-data ingest, signal ingest, fire dispatch, confirmation
//! ingest, the topic-filtered event hub, and heartbeats. Each channel is an
//! independent bound/connect socket pair so failure of one can never block
//! another.
//!
//! ## Architecture Role
//! ```text
//! feeds ──→ market-data-in ─┐
//! detector ─→ signal-in ────┤→ [Fire Router] ─→ fire-out ─→ terminal
//! terminal ─→ confirm-in ───┤        │                         │
//! tracker ──→ confirm-in ───┘        └─→ event-out ─→ tracker  │
//! peers ←──── heartbeat ←────────────────────────── heartbeats ┘
//! ```
//!
//! ## Delivery Semantics
//! - Ingest channels run a dedicated accept + per-connection drain loop
//!   feeding a bounded queue; a slow consumer cannot starve the socket.
//! - Fire dispatch is non-blocking: an unreachable terminal yields a
//!   delivery-uncertain result immediately, never a hang.
//! - The event hub fans out topic-matched frames and cleans up dead
//!   consumers without affecting the rest.
//! - Every inbound frame is validated against the channel's accepted
//!   envelope variants before it reaches business logic.

pub mod channel;
pub mod client;
pub mod fire;
pub mod frame;
pub mod heartbeat;
pub mod hub;
pub mod ingest;

pub use channel::{ChannelKind, ChannelPaths};
pub use client::{PushClient, ReconnectPolicy};
pub use fire::{DispatchOutcome, FireDispatcher};
pub use frame::{FramedConnection, DEFAULT_MAX_FRAME};
pub use heartbeat::{HeartbeatEmitter, HeartbeatMonitor};
pub use hub::{EventHub, EventPublisher, HubMetrics, TopicMatcher};
pub use ingest::{IngestListener, IngestMetrics};

use std::time::Duration;

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("not connected to {0}")]
    NotConnected(String),

    #[error("{channel} channel does not accept {kind} frames")]
    ChannelViolation {
        channel: &'static str,
        kind: &'static str,
    },

    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("gave up connecting to {path} after {attempts} attempts")]
    ConnectExhausted { path: String, attempts: u32 },
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
