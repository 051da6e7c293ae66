//! # Event Hub - Topic-Filtered Fan-Out
//!
//! ## Purpose
//! The core's outbound pub/sub channel. Consumers connect, send a
//! [`ConsumerRegistration`] with topic patterns, and receive every event
//! whose topic matches. The router publishes per-symbol ticks
//! (`tick.EURUSD`) and confirmed fills (`fill.confirmed`); the outcome
//! tracker is the primary subscriber.
//!
//! ## Behavior
//! - Registration is the first frame on a new connection; anything else
//!   closes it.
//! - Broadcast failures mark the consumer dead; it is removed without
//!   affecting the others.
//! - Topic patterns: exact (`fill.confirmed`), wildcard (`*`), and prefix
//!   (`tick.*`).

use crate::frame::{FrameWriter, FramedConnection};
use crate::{Result, TransportError};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use types::{ChannelMessage, EventBody, EventFrame};

/// Matches event topics against consumer filter patterns.
pub struct TopicMatcher;

impl TopicMatcher {
    /// Exact match, `*` for everything, `prefix.*` for a family.
    pub fn matches(filters: &[String], topic: &str) -> bool {
        filters.iter().any(|filter| {
            if filter == "*" {
                true
            } else if let Some(prefix) = filter.strip_suffix('*') {
                topic.starts_with(prefix)
            } else {
                filter == topic
            }
        })
    }
}

/// Counters for hub observability.
#[derive(Debug, Default)]
pub struct HubMetrics {
    pub consumers_registered: AtomicU64,
    pub active_consumers: AtomicU64,
    pub events_broadcast: AtomicU64,
    pub broadcast_errors: AtomicU64,
}

impl fmt::Display for HubMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HubMetrics {{ active: {}, registered: {}, broadcast: {}, errors: {} }}",
            self.active_consumers.load(Ordering::Relaxed),
            self.consumers_registered.load(Ordering::Relaxed),
            self.events_broadcast.load(Ordering::Relaxed),
            self.broadcast_errors.load(Ordering::Relaxed),
        )
    }
}

struct ConsumerHandle {
    topics: Vec<String>,
    writer: FrameWriter,
}

type ConsumerMap = Arc<RwLock<HashMap<String, ConsumerHandle>>>;

/// Publishing handle, cloneable and independent of the accept loop.
#[derive(Clone)]
pub struct EventPublisher {
    consumers: ConsumerMap,
    metrics: Arc<HubMetrics>,
}

impl EventPublisher {
    /// Fan an event out to every consumer whose filters match. Dead
    /// consumers are pruned as they fail.
    pub async fn broadcast(&self, topic: &str, body: EventBody) {
        let frame = ChannelMessage::Event(EventFrame {
            topic: topic.to_string(),
            body,
        });

        let mut dead = Vec::new();
        {
            let mut consumers = self.consumers.write().await;
            for (id, handle) in consumers.iter_mut() {
                if !TopicMatcher::matches(&handle.topics, topic) {
                    continue;
                }
                match handle.writer.send(&frame).await {
                    Ok(()) => {
                        self.metrics.events_broadcast.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.metrics.broadcast_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(consumer = id.as_str(), error = %e, "consumer send failed");
                        dead.push(id.clone());
                    }
                }
            }
            for id in &dead {
                consumers.remove(id);
                self.metrics.active_consumers.fetch_sub(1, Ordering::Relaxed);
            }
        }
        if !dead.is_empty() {
            info!(count = dead.len(), "pruned dead event consumers");
        }
    }

    pub fn metrics(&self) -> Arc<HubMetrics> {
        self.metrics.clone()
    }
}

/// The bound event socket plus its consumer registry.
pub struct EventHub {
    path: PathBuf,
    listener: UnixListener,
    consumers: ConsumerMap,
    metrics: Arc<HubMetrics>,
    registration_timeout: Duration,
}

impl EventHub {
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&path)?;
        info!(path = %path.display(), "event hub listening");

        Ok(Self {
            path,
            listener,
            consumers: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(HubMetrics::default()),
            registration_timeout: Duration::from_secs(10),
        })
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            consumers: self.consumers.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Accept loop: one registration handshake per connection, then a watch
    /// task that removes the consumer when its socket closes.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let conn = FramedConnection::new(stream);
                    let consumers = self.consumers.clone();
                    let metrics = self.metrics.clone();
                    let reg_timeout = self.registration_timeout;
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_consumer(conn, consumers, metrics, reg_timeout).await
                        {
                            debug!(error = %e, "event consumer closed");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "event hub accept failed");
                }
            }
        }
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn handle_consumer(
    conn: FramedConnection,
    consumers: ConsumerMap,
    metrics: Arc<HubMetrics>,
    registration_timeout: Duration,
) -> Result<()> {
    let (mut reader, writer) = conn.into_split();

    // First frame must register the consumer.
    let registration = match timeout(registration_timeout, reader.recv()).await {
        Ok(Ok(ChannelMessage::Register(reg))) => reg,
        Ok(Ok(other)) => {
            warn!(kind = other.kind(), "expected registration as first frame");
            return Err(TransportError::ChannelViolation {
                channel: "event",
                kind: "unregistered",
            });
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            warn!("consumer never registered; dropping connection");
            return Err(TransportError::SendTimeout(registration_timeout));
        }
    };

    let consumer_id = registration.consumer_id.clone();
    info!(
        consumer = consumer_id.as_str(),
        topics = ?registration.topics,
        "event consumer registered"
    );
    {
        let mut map = consumers.write().await;
        map.insert(
            consumer_id.clone(),
            ConsumerHandle {
                topics: registration.topics,
                writer,
            },
        );
    }
    metrics.consumers_registered.fetch_add(1, Ordering::Relaxed);
    metrics.active_consumers.fetch_add(1, Ordering::Relaxed);

    // Stay on the read half to notice disconnects; inbound heartbeats are
    // tolerated, anything else is ignored.
    loop {
        match reader.recv().await {
            Ok(ChannelMessage::Heartbeat(_)) => continue,
            Ok(other) => {
                debug!(
                    consumer = consumer_id.as_str(),
                    kind = other.kind(),
                    "ignoring unexpected frame from consumer"
                );
            }
            Err(_) => break,
        }
    }

    let mut map = consumers.write().await;
    if map.remove(&consumer_id).is_some() {
        metrics.active_consumers.fetch_sub(1, Ordering::Relaxed);
        info!(consumer = consumer_id.as_str(), "event consumer disconnected");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;
    use types::{tick_topic, ConsumerRegistration, MarketTick};

    #[test]
    fn topic_matcher_semantics() {
        assert!(TopicMatcher::matches(&["*".to_string()], "anything.at.all"));
        assert!(TopicMatcher::matches(&["tick.*".to_string()], "tick.EURUSD"));
        assert!(!TopicMatcher::matches(&["tick.*".to_string()], "fill.confirmed"));
        assert!(TopicMatcher::matches(
            &["fill.confirmed".to_string()],
            "fill.confirmed"
        ));
        assert!(!TopicMatcher::matches(
            &["fill.confirmed".to_string()],
            "fill.confirmed.extra"
        ));
    }

    fn tick(symbol: &str) -> MarketTick {
        MarketTick {
            symbol: symbol.into(),
            bid: 1.0850,
            ask: 1.0852,
            volume: 10.0,
            ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn consumers_receive_only_matching_topics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event.sock");
        let hub = EventHub::bind(&path).unwrap();
        let publisher = hub.publisher();
        tokio::spawn(hub.run());

        // Subscribe to EURUSD ticks only.
        let mut consumer = FramedConnection::connect(&path).await.unwrap();
        consumer
            .send(&ChannelMessage::Register(ConsumerRegistration {
                consumer_id: "test-consumer".into(),
                topics: vec![tick_topic("EURUSD")],
            }))
            .await
            .unwrap();

        // Give the hub a moment to index the registration.
        tokio::time::sleep(Duration::from_millis(50)).await;

        publisher
            .broadcast(&tick_topic("GBPUSD"), EventBody::Tick(tick("GBPUSD")))
            .await;
        publisher
            .broadcast(&tick_topic("EURUSD"), EventBody::Tick(tick("EURUSD")))
            .await;

        match consumer.recv().await.unwrap() {
            ChannelMessage::Event(frame) => {
                assert_eq!(frame.topic, "tick.EURUSD");
                match frame.body {
                    EventBody::Tick(t) => assert_eq!(t.symbol, "EURUSD"),
                    other => panic!("expected tick body, got {:?}", other),
                }
            }
            other => panic!("expected event frame, got {:?}", other),
        }
    }
}
