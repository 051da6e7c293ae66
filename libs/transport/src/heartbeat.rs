//! Heartbeat tracking and emission.
//!
//! Every peer proves liveness by sending `{node_id, ts}` beacons. The monitor
//! keeps last-seen instants per node; a node silent past the window is
//! DEGRADED, which the router treats as a dispatch precondition failure.

use crate::client::PushClient;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use types::{ChannelMessage, Heartbeat};

/// Tracks last-seen liveness per node id.
pub struct HeartbeatMonitor {
    last_seen: DashMap<String, Instant>,
    window: Duration,
}

impl HeartbeatMonitor {
    /// `window` is how long a node may stay silent before it is DEGRADED.
    pub fn new(window: Duration) -> Self {
        Self {
            last_seen: DashMap::new(),
            window,
        }
    }

    /// Record a liveness proof. Confirmations and data frames count too;
    /// callers record on any sign of life, not just heartbeat frames.
    pub fn record(&self, node_id: &str) {
        self.last_seen.insert(node_id.to_string(), Instant::now());
    }

    /// A node that has never been seen is degraded by definition.
    pub fn is_degraded(&self, node_id: &str) -> bool {
        match self.last_seen.get(node_id) {
            Some(seen) => seen.elapsed() > self.window,
            None => true,
        }
    }

    pub fn degraded_nodes(&self) -> Vec<String> {
        self.last_seen
            .iter()
            .filter(|entry| entry.value().elapsed() > self.window)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

/// Periodically pushes this node's beacon to a peer's heartbeat socket.
pub struct HeartbeatEmitter {
    node_id: String,
    client: PushClient,
    interval: Duration,
}

impl HeartbeatEmitter {
    pub fn new(node_id: impl Into<String>, client: PushClient, interval: Duration) -> Self {
        Self {
            node_id: node_id.into(),
            client,
            interval,
        }
    }

    /// Emit forever. Send failures are logged and retried on the next tick;
    /// heartbeats are lowest priority and never escalate.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            let beacon = ChannelMessage::Heartbeat(Heartbeat {
                node_id: self.node_id.clone(),
                ts: chrono::Utc::now(),
            });
            match self.client.send(&beacon).await {
                Ok(()) => debug!(node = self.node_id.as_str(), "heartbeat sent"),
                Err(e) => warn!(node = self.node_id.as_str(), error = %e, "heartbeat failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_nodes_are_degraded() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(60));
        assert!(monitor.is_degraded("terminal-1"));
        monitor.record("terminal-1");
        assert!(!monitor.is_degraded("terminal-1"));
    }

    #[tokio::test]
    async fn silence_past_the_window_degrades() {
        let monitor = HeartbeatMonitor::new(Duration::from_millis(20));
        monitor.record("feed-1");
        assert!(!monitor.is_degraded("feed-1"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(monitor.is_degraded("feed-1"));
        assert_eq!(monitor.degraded_nodes(), vec!["feed-1".to_string()]);
    }
}
