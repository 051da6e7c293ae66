//! # Fire Dispatch - Non-Blocking Order Delivery
//!
//! ## Purpose
//! Delivers fire orders to the remote execution terminal with at-most-once
//! semantics per attempt. The dispatcher never blocks the router: an
//! unreachable or slow terminal yields [`DispatchOutcome::Uncertain`]
//! immediately, and reconciliation happens later via confirmation or
//! dispatch timeout.
//!
//! There is deliberately no retry and no simulated-success path here. A
//! terminal that cannot be reached fails loudly; nothing ever pretends an
//! order was delivered.

use crate::frame::FramedConnection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};
use types::{ChannelMessage, FireOrder, Heartbeat};

/// Result of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The frame left this process. Delivery is still not guaranteed until a
    /// confirmation arrives.
    Sent,
    /// The frame may or may not have left; the reason says why we cannot
    /// know. Resolved only by a later confirmation or the dispatch timeout.
    Uncertain(String),
}

/// Connect-side dispatcher for the fire channel.
pub struct FireDispatcher {
    path: PathBuf,
    connect_timeout: Duration,
    send_timeout: Duration,
    conn: Mutex<Option<FramedConnection>>,
    pub sent: AtomicU64,
    pub uncertain: AtomicU64,
}

impl FireDispatcher {
    pub fn new(path: impl AsRef<Path>, connect_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            connect_timeout,
            send_timeout,
            conn: Mutex::new(None),
            sent: AtomicU64::new(0),
            uncertain: AtomicU64::new(0),
        }
    }

    /// Dispatch one order. Returns within `connect_timeout + send_timeout`
    /// in the worst case; never retries on its own (at-most-once per
    /// attempt).
    pub async fn dispatch(&self, order: &FireOrder) -> DispatchOutcome {
        let msg = ChannelMessage::Fire(order.clone());
        match self.try_send(&msg).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                debug!(order_id = %order.order_id, "fire order dispatched");
                DispatchOutcome::Sent
            }
            Err(reason) => {
                self.uncertain.fetch_add(1, Ordering::Relaxed);
                warn!(order_id = %order.order_id, %reason, "dispatch delivery-uncertain");
                DispatchOutcome::Uncertain(reason)
            }
        }
    }

    /// Best-effort liveness beacon to the terminal over the fire socket.
    /// Failures are expected while the terminal is away and are not errors.
    pub async fn send_heartbeat(&self, node_id: &str) {
        let msg = ChannelMessage::Heartbeat(Heartbeat {
            node_id: node_id.to_string(),
            ts: chrono::Utc::now(),
        });
        if let Err(reason) = self.try_send(&msg).await {
            debug!(%reason, "fire-channel heartbeat skipped");
        }
    }

    async fn try_send(&self, msg: &ChannelMessage) -> std::result::Result<(), String> {
        let mut guard = self.conn.lock().await;

        if guard.is_none() {
            match timeout(self.connect_timeout, FramedConnection::connect(&self.path)).await {
                Ok(Ok(conn)) => *guard = Some(conn),
                Ok(Err(e)) => return Err(format!("terminal unreachable: {}", e)),
                Err(_) => {
                    return Err(format!(
                        "terminal connect timed out after {:?}",
                        self.connect_timeout
                    ))
                }
            }
        }

        let Some(conn) = guard.as_mut() else {
            return Err("terminal connection unavailable".to_string());
        };
        match timeout(self.send_timeout, conn.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                *guard = None;
                Err(format!("send failed: {}", e))
            }
            Err(_) => {
                *guard = None;
                Err(format!("send timed out after {:?}", self.send_timeout))
            }
        }
    }

    /// Drop any cached connection; the next dispatch reconnects.
    pub async fn reset(&self) {
        let mut guard = self.conn.lock().await;
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::tempdir;
    use tokio::net::UnixListener;
    use types::{Direction, MissionId, OrderId};

    fn order() -> FireOrder {
        FireOrder {
            order_id: OrderId::new(),
            mission_id: MissionId::new(),
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            volume: 0.10,
            entry: 1.0853,
            stop: 1.0828,
            target: 1.0903,
            risk_percent_used: Decimal::ONE,
            dispatched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unreachable_terminal_is_uncertain_not_an_error() {
        let dir = tempdir().unwrap();
        let dispatcher = FireDispatcher::new(
            dir.path().join("no-terminal.sock"),
            Duration::from_millis(100),
            Duration::from_millis(100),
        );
        match dispatcher.dispatch(&order()).await {
            DispatchOutcome::Uncertain(reason) => {
                assert!(reason.contains("unreachable") || reason.contains("timed out"))
            }
            DispatchOutcome::Sent => panic!("dispatch cannot succeed with no terminal"),
        }
        assert_eq!(dispatcher.uncertain.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn reachable_terminal_receives_the_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("terminal.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = FramedConnection::new(stream);
            conn.recv().await.unwrap()
        });

        let dispatcher = FireDispatcher::new(
            &path,
            Duration::from_millis(500),
            Duration::from_millis(500),
        );
        let fire = order();
        assert_eq!(dispatcher.dispatch(&fire).await, DispatchOutcome::Sent);

        match server.await.unwrap() {
            ChannelMessage::Fire(received) => assert_eq!(received.order_id, fire.order_id),
            other => panic!("terminal expected a fire frame, got {:?}", other),
        }
    }
}
