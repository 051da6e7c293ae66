//! # Channel Message Envelopes
//!
//! ## Purpose
//! One tagged union per wire frame. Every socket in the system carries
//! exactly these shapes; the transport layer validates the variant against
//! the channel it arrived on before anything reaches business logic, so a
//! confirmation can never masquerade as a tick.
//!
//! ## Wire Format
//! Frames are a u32 little-endian length prefix followed by the bincode
//! encoding of [`ChannelMessage`]. Oversized or undecodable frames are
//! dropped and counted at the transport boundary.

use crate::market::MarketTick;
use crate::order::{Confirmation, ConfirmedFill, FireOrder};
use crate::outcome::Outcome;
use crate::signal::Signal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Topic prefix for per-symbol tick events on the event hub.
pub const TICK_TOPIC_PREFIX: &str = "tick.";

/// Topic for confirmed-fill events on the event hub.
pub const FILL_TOPIC: &str = "fill.confirmed";

/// Build the hub topic for a symbol's ticks, e.g. `tick.EURUSD`.
pub fn tick_topic(symbol: &str) -> String {
    format!("{}{}", TICK_TOPIC_PREFIX, symbol.to_ascii_uppercase())
}

/// Periodic liveness beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub node_id: String,
    pub ts: DateTime<Utc>,
}

/// Subscription request a consumer sends after connecting to the event hub.
///
/// Topic patterns support exact match, `*`, and `prefix.*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerRegistration {
    pub consumer_id: String,
    pub topics: Vec<String>,
}

/// Payload of a hub event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventBody {
    Tick(MarketTick),
    FillConfirmed(ConfirmedFill),
}

/// A topic-routed event as fanned out by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub topic: String,
    pub body: EventBody,
}

/// The single wire envelope. One variant per channel payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelMessage {
    /// market-data-in: best-effort quote stream.
    Tick(MarketTick),
    /// signal-in: detector broadcast.
    Signal(Signal),
    /// fire-out: order dispatch to the remote terminal.
    Fire(FireOrder),
    /// confirm-in: terminal acknowledgment, at-least-once.
    Confirmation(Confirmation),
    /// confirm-in: tracker outcome report, at-least-once.
    OutcomeReport(Outcome),
    /// heartbeat: bidirectional liveness.
    Heartbeat(Heartbeat),
    /// event-out, inbound: consumer subscription.
    Register(ConsumerRegistration),
    /// event-out, outbound: topic-routed fan-out.
    Event(EventFrame),
}

impl ChannelMessage {
    /// Short name for logs and rejection counters.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelMessage::Tick(_) => "tick",
            ChannelMessage::Signal(_) => "signal",
            ChannelMessage::Fire(_) => "fire",
            ChannelMessage::Confirmation(_) => "confirmation",
            ChannelMessage::OutcomeReport(_) => "outcome_report",
            ChannelMessage::Heartbeat(_) => "heartbeat",
            ChannelMessage::Register(_) => "register",
            ChannelMessage::Event(_) => "event",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_topic_is_uppercased() {
        assert_eq!(tick_topic("eurusd"), "tick.EURUSD");
    }

    #[test]
    fn envelope_bincode_round_trip() {
        let msg = ChannelMessage::Heartbeat(Heartbeat {
            node_id: "terminal-1".into(),
            ts: Utc::now(),
        });
        let bytes = bincode::serialize(&msg).unwrap();
        let back: ChannelMessage = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, msg);
    }
}
