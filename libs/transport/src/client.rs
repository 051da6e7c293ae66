//! Push clients: connect-side producers with bounded reconnection.
//!
//! Used by market data feeds, the detector, the remote terminal, and the
//! tracker's outcome reports. Reconnection is transparent to callers and
//! bounded; there are no unbounded retry loops anywhere in the transport.

use crate::frame::FramedConnection;
use crate::{ChannelKind, Result, TransportError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use types::ChannelMessage;

/// Bounded reconnect behavior.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

/// A connect-side producer for one channel.
pub struct PushClient {
    kind: ChannelKind,
    path: PathBuf,
    policy: ReconnectPolicy,
    conn: Option<FramedConnection>,
}

impl PushClient {
    pub fn new(kind: ChannelKind, path: impl AsRef<Path>) -> Self {
        Self::with_policy(kind, path, ReconnectPolicy::default())
    }

    pub fn with_policy(
        kind: ChannelKind,
        path: impl AsRef<Path>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            kind,
            path: path.as_ref().to_path_buf(),
            policy,
            conn: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Establish the connection, retrying up to the policy's bound.
    pub async fn connect(&mut self) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match FramedConnection::connect(&self.path).await {
                Ok(conn) => {
                    info!(
                        channel = self.kind.name(),
                        path = %self.path.display(),
                        "connected"
                    );
                    self.conn = Some(conn);
                    return Ok(());
                }
                Err(e) if attempt < self.policy.max_attempts => {
                    debug!(
                        channel = self.kind.name(),
                        attempt,
                        error = %e,
                        "connect failed, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(_) => {
                    return Err(TransportError::ConnectExhausted {
                        path: self.path.display().to_string(),
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Send one frame, transparently reconnecting once if the connection
    /// dropped underneath us.
    pub async fn send(&mut self, msg: &ChannelMessage) -> Result<()> {
        if !self.kind.accepts(msg) {
            return Err(TransportError::ChannelViolation {
                channel: self.kind.name(),
                kind: msg.kind(),
            });
        }
        if self.conn.is_none() {
            self.connect().await?;
        }

        // Borrow check: take the connection, put it back on success.
        let mut conn = self.conn.take().ok_or_else(|| {
            TransportError::NotConnected(self.path.display().to_string())
        })?;
        match conn.send(msg).await {
            Ok(()) => {
                self.conn = Some(conn);
                Ok(())
            }
            Err(e) => {
                warn!(
                    channel = self.kind.name(),
                    error = %e,
                    "send failed, reconnecting once"
                );
                drop(conn);
                self.connect().await?;
                let conn = self
                    .conn
                    .as_mut()
                    .ok_or_else(|| TransportError::NotConnected(self.path.display().to_string()))?;
                conn.send(msg).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::IngestListener;
    use chrono::Utc;
    use tempfile::tempdir;
    use types::Heartbeat;

    #[tokio::test]
    async fn exhausts_bounded_attempts_when_nothing_listens() {
        let dir = tempdir().unwrap();
        let mut client = PushClient::with_policy(
            ChannelKind::Heartbeat,
            dir.path().join("absent.sock"),
            ReconnectPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(10),
            },
        );
        match client.connect().await {
            Err(TransportError::ConnectExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected ConnectExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn refuses_frames_the_channel_does_not_carry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hb.sock");
        let (listener, _rx) =
            IngestListener::bind(ChannelKind::Heartbeat, &path, 4, false).unwrap();
        tokio::spawn(listener.run());

        let mut client = PushClient::new(ChannelKind::Heartbeat, &path);
        let tick = ChannelMessage::Tick(types::MarketTick {
            symbol: "EURUSD".into(),
            bid: 1.0,
            ask: 1.0,
            volume: 0.0,
            ts: Utc::now(),
        });
        match client.send(&tick).await {
            Err(TransportError::ChannelViolation { .. }) => {}
            other => panic!("expected ChannelViolation, got {:?}", other),
        }

        // Valid frames still flow.
        client
            .send(&ChannelMessage::Heartbeat(Heartbeat {
                node_id: "n".into(),
                ts: Utc::now(),
            }))
            .await
            .unwrap();
    }
}
