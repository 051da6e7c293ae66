//! Logical channel definitions and socket path layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use types::ChannelMessage;

/// The six logical channels of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Many producers push quotes to the core. Best-effort, lossy-tolerant.
    MarketData,
    /// The detector pushes signals to the core. Broadcast, non-durable.
    Signal,
    /// The core dispatches orders to the remote terminal. At-most-once per
    /// attempt, non-blocking.
    Fire,
    /// The terminal (and the tracker) push acknowledgments to the core.
    /// At-least-once; the receiving side is idempotent.
    Confirm,
    /// The core fans out topic-filtered events to subscribers.
    Event,
    /// Bidirectional liveness. Lowest priority.
    Heartbeat,
}

impl ChannelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::MarketData => "market-data",
            ChannelKind::Signal => "signal",
            ChannelKind::Fire => "fire",
            ChannelKind::Confirm => "confirm",
            ChannelKind::Event => "event",
            ChannelKind::Heartbeat => "heartbeat",
        }
    }

    /// Envelope validation at the transport boundary. Heartbeats are accepted
    /// on every channel so any peer can prove liveness in-band.
    pub fn accepts(&self, msg: &ChannelMessage) -> bool {
        if matches!(msg, ChannelMessage::Heartbeat(_)) {
            return true;
        }
        match self {
            ChannelKind::MarketData => matches!(msg, ChannelMessage::Tick(_)),
            ChannelKind::Signal => matches!(msg, ChannelMessage::Signal(_)),
            ChannelKind::Fire => matches!(msg, ChannelMessage::Fire(_)),
            ChannelKind::Confirm => matches!(
                msg,
                ChannelMessage::Confirmation(_) | ChannelMessage::OutcomeReport(_)
            ),
            ChannelKind::Event => {
                matches!(msg, ChannelMessage::Register(_) | ChannelMessage::Event(_))
            }
            ChannelKind::Heartbeat => false, // heartbeats already accepted above
        }
    }
}

/// Socket paths for every channel. One file per channel under a common root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPaths {
    pub market_data: PathBuf,
    pub signal: PathBuf,
    pub fire: PathBuf,
    pub confirm: PathBuf,
    pub event: PathBuf,
    pub heartbeat: PathBuf,
}

impl ChannelPaths {
    /// Lay out all six sockets under a root directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            market_data: root.join("market_data.sock"),
            signal: root.join("signal.sock"),
            fire: root.join("fire.sock"),
            confirm: root.join("confirm.sock"),
            event: root.join("event.sock"),
            heartbeat: root.join("heartbeat.sock"),
        }
    }

    pub fn path(&self, kind: ChannelKind) -> &Path {
        match kind {
            ChannelKind::MarketData => &self.market_data,
            ChannelKind::Signal => &self.signal,
            ChannelKind::Fire => &self.fire,
            ChannelKind::Confirm => &self.confirm,
            ChannelKind::Event => &self.event,
            ChannelKind::Heartbeat => &self.heartbeat,
        }
    }
}

impl Default for ChannelPaths {
    fn default() -> Self {
        Self::under("/tmp/firegrid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use types::{Heartbeat, MarketTick};

    fn tick() -> ChannelMessage {
        ChannelMessage::Tick(MarketTick {
            symbol: "EURUSD".into(),
            bid: 1.0850,
            ask: 1.0852,
            volume: 100.0,
            ts: Utc::now(),
        })
    }

    #[test]
    fn market_data_accepts_only_ticks_and_heartbeats() {
        let hb = ChannelMessage::Heartbeat(Heartbeat {
            node_id: "feed-1".into(),
            ts: Utc::now(),
        });
        assert!(ChannelKind::MarketData.accepts(&tick()));
        assert!(ChannelKind::MarketData.accepts(&hb));
        assert!(!ChannelKind::Confirm.accepts(&tick()));
        assert!(!ChannelKind::Signal.accepts(&tick()));
    }

    #[test]
    fn paths_share_the_root() {
        let paths = ChannelPaths::under("/tmp/fg-test");
        assert_eq!(
            paths.path(ChannelKind::Fire),
            Path::new("/tmp/fg-test/fire.sock")
        );
        assert_eq!(
            paths.path(ChannelKind::Event),
            Path::new("/tmp/fg-test/event.sock")
        );
    }
}
