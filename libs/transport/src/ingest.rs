//! Ingest listeners: bound sockets draining producer connections into a
//! bounded in-process queue.
//!
//! One listener per ingest channel (market data, signals, confirmations,
//! heartbeats). Each accepted producer gets its own drain task, so one stalled
//! or chatty producer cannot starve the others, and the consumer reads from a
//! single bounded mpsc queue. Lossy channels drop on a full queue; reliable
//! channels apply backpressure to the producing socket instead.

use crate::frame::FramedConnection;
use crate::{ChannelKind, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::ChannelMessage;

/// Counters for one ingest channel.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    pub connections_accepted: AtomicU64,
    pub frames_in: AtomicU64,
    /// Frames whose envelope variant the channel does not accept.
    pub frames_rejected: AtomicU64,
    /// Frames discarded because the queue was full (lossy channels only).
    pub frames_dropped: AtomicU64,
}

impl IngestMetrics {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.connections_accepted.load(Ordering::Relaxed),
            self.frames_in.load(Ordering::Relaxed),
            self.frames_rejected.load(Ordering::Relaxed),
            self.frames_dropped.load(Ordering::Relaxed),
        )
    }
}

/// A bound ingest socket for one channel.
pub struct IngestListener {
    kind: ChannelKind,
    path: PathBuf,
    listener: UnixListener,
    tx: mpsc::Sender<ChannelMessage>,
    lossy: bool,
    metrics: Arc<IngestMetrics>,
}

impl IngestListener {
    /// Bind the channel socket and return the listener plus the consumer end
    /// of its queue. `lossy` selects drop-on-full (market data) versus
    /// backpressure (confirmations).
    pub fn bind(
        kind: ChannelKind,
        path: impl AsRef<Path>,
        capacity: usize,
        lossy: bool,
    ) -> Result<(Self, mpsc::Receiver<ChannelMessage>)> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&path)?;
        info!(channel = kind.name(), path = %path.display(), "ingest listening");

        let (tx, rx) = mpsc::channel(capacity);
        Ok((
            Self {
                kind,
                path,
                listener,
                tx,
                lossy,
                metrics: Arc::new(IngestMetrics::default()),
            },
            rx,
        ))
    }

    pub fn metrics(&self) -> Arc<IngestMetrics> {
        self.metrics.clone()
    }

    /// Accept loop. Runs until the process shuts down; each producer
    /// connection drains on its own task.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    self.metrics
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(channel = self.kind.name(), "producer connected");

                    let conn = FramedConnection::new(stream);
                    let tx = self.tx.clone();
                    let kind = self.kind;
                    let lossy = self.lossy;
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        drain_connection(conn, kind, tx, lossy, metrics).await;
                    });
                }
                Err(e) => {
                    warn!(channel = self.kind.name(), error = %e, "accept failed");
                }
            }
        }
    }
}

impl Drop for IngestListener {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn drain_connection(
    mut conn: FramedConnection,
    kind: ChannelKind,
    tx: mpsc::Sender<ChannelMessage>,
    lossy: bool,
    metrics: Arc<IngestMetrics>,
) {
    loop {
        let msg = match conn.recv().await {
            Ok(msg) => msg,
            Err(crate::TransportError::ConnectionClosed) => {
                debug!(channel = kind.name(), "producer disconnected");
                return;
            }
            Err(e) => {
                warn!(channel = kind.name(), error = %e, "producer read failed");
                return;
            }
        };

        metrics.frames_in.fetch_add(1, Ordering::Relaxed);
        if !kind.accepts(&msg) {
            metrics.frames_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                channel = kind.name(),
                kind = msg.kind(),
                "rejected frame not valid for channel"
            );
            continue;
        }

        if lossy {
            if tx.try_send(msg).is_err() {
                metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        } else if tx.send(msg).await.is_err() {
            // Consumer side is gone; nothing left to drain for.
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;
    use types::{Heartbeat, MarketTick, Signal};

    fn tick(symbol: &str) -> ChannelMessage {
        ChannelMessage::Tick(MarketTick {
            symbol: symbol.into(),
            bid: 1.0850,
            ask: 1.0852,
            volume: 50.0,
            ts: Utc::now(),
        })
    }

    #[tokio::test]
    async fn delivers_valid_frames_and_rejects_wrong_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("market.sock");
        let (listener, mut rx) =
            IngestListener::bind(ChannelKind::MarketData, &path, 16, true).unwrap();
        let metrics = listener.metrics();
        tokio::spawn(listener.run());

        let mut producer = FramedConnection::connect(&path).await.unwrap();
        producer.send(&tick("EURUSD")).await.unwrap();
        // A signal on the market data channel must be rejected at the boundary.
        producer
            .send(&ChannelMessage::Signal(Signal {
                signal_id: "sig-x".into(),
                symbol: "EURUSD".into(),
                direction: types::Direction::Buy,
                entry: 1.0,
                stop: 0.99,
                target: 1.02,
                confidence: 80,
                pattern: "momentum-break".into(),
                generated_at: Utc::now(),
                expires_at: Utc::now(),
            }))
            .await
            .unwrap();
        producer.send(&tick("GBPUSD")).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind(), "tick");
        assert_eq!(second.kind(), "tick");
        assert_eq!(metrics.frames_rejected.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn heartbeats_pass_on_any_ingest_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("confirm.sock");
        let (listener, mut rx) =
            IngestListener::bind(ChannelKind::Confirm, &path, 16, false).unwrap();
        tokio::spawn(listener.run());

        let mut producer = FramedConnection::connect(&path).await.unwrap();
        producer
            .send(&ChannelMessage::Heartbeat(Heartbeat {
                node_id: "terminal-1".into(),
                ts: Utc::now(),
            }))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().kind(), "heartbeat");
    }
}
