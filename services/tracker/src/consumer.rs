//! Event hub consumer: drains ticks and confirmed fills, finalizes outcomes.
//!
//! Maintains a persistent connection to the router's event hub with automatic
//! reconnection, and pushes every finalized outcome back to the router over
//! the confirm channel. Reports are at-least-once: failures park the outcome
//! in a pending set retried on an interval, and the router side is
//! idempotent.

use crate::config::TrackerConfig;
use crate::ledger::OutcomeLedger;
use crate::monitor::PositionMonitor;
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use transport::{ChannelKind, FramedConnection, PushClient, ReconnectPolicy};
use types::{
    ChannelMessage, ConfirmedFill, ConsumerRegistration, EventBody, Outcome, OutcomeResult,
    OrderId, FILL_TOPIC,
};

/// Tracker observability counters.
#[derive(Debug, Default)]
pub struct TrackerMetrics {
    pub fills_tracked: AtomicU64,
    pub duplicate_fills: AtomicU64,
    pub outcomes_written: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub unresolved_flagged: AtomicU64,
    pub ledger_failures: AtomicU64,
    pub reports_sent: AtomicU64,
    pub report_failures: AtomicU64,
}

impl fmt::Display for TrackerMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrackerMetrics {{ tracked: {}, written: {}, unresolved: {}, reports: {}/{} failed, \
             dup fills: {}, dup outcomes: {} }}",
            self.fills_tracked.load(Ordering::Relaxed),
            self.outcomes_written.load(Ordering::Relaxed),
            self.unresolved_flagged.load(Ordering::Relaxed),
            self.reports_sent.load(Ordering::Relaxed),
            self.report_failures.load(Ordering::Relaxed),
            self.duplicate_fills.load(Ordering::Relaxed),
            self.duplicates_skipped.load(Ordering::Relaxed),
        )
    }
}

/// The tracker's connection to the rest of the system.
pub struct TrackerConsumer {
    config: TrackerConfig,
    monitor: Arc<PositionMonitor>,
    ledger: Arc<OutcomeLedger>,
    metrics: Arc<TrackerMetrics>,
    reporter: Mutex<PushClient>,
    pending_reports: DashMap<OrderId, Outcome>,
}

impl TrackerConsumer {
    pub fn new(
        config: TrackerConfig,
        monitor: Arc<PositionMonitor>,
        ledger: Arc<OutcomeLedger>,
    ) -> Self {
        let paths = config.channel_paths();
        // Short reconnect policy: a failed report parks in the pending set
        // rather than stalling tick processing.
        let reporter = PushClient::with_policy(
            ChannelKind::Confirm,
            &paths.confirm,
            ReconnectPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(250),
            },
        );
        Self {
            config,
            monitor,
            ledger,
            metrics: Arc::new(TrackerMetrics::default()),
            reporter: Mutex::new(reporter),
            pending_reports: DashMap::new(),
        }
    }

    pub fn metrics(&self) -> Arc<TrackerMetrics> {
        self.metrics.clone()
    }

    pub fn pending_report_count(&self) -> usize {
        self.pending_reports.len()
    }

    /// Consume forever, reconnecting with a delay after any hub failure.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.connect_and_consume().await {
                Ok(()) => {
                    warn!("event hub connection closed; reconnecting");
                }
                Err(e) => {
                    warn!(error = %e, "event hub consumer failed; reconnecting");
                }
            }
            tokio::time::sleep(Duration::from_secs(
                self.config.network.reconnect_delay_secs,
            ))
            .await;
        }
    }

    async fn connect_and_consume(&self) -> Result<()> {
        let paths = self.config.channel_paths();
        let mut conn = FramedConnection::connect(&paths.event)
            .await
            .context("connecting to event hub")?;
        conn.send(&ChannelMessage::Register(ConsumerRegistration {
            consumer_id: self.config.network.consumer_id.clone(),
            topics: vec!["tick.*".to_string(), FILL_TOPIC.to_string()],
        }))
        .await
        .context("registering with event hub")?;
        info!(
            consumer = self.config.network.consumer_id.as_str(),
            "registered with event hub"
        );

        loop {
            let msg = conn.recv().await?;
            self.handle_frame(msg).await;
        }
    }

    pub async fn handle_frame(&self, msg: ChannelMessage) {
        match msg {
            ChannelMessage::Event(frame) => match frame.body {
                EventBody::Tick(tick) => {
                    for outcome in self.monitor.on_tick(&tick) {
                        self.finalize(outcome).await;
                    }
                }
                EventBody::FillConfirmed(fill) => self.handle_fill(fill),
            },
            ChannelMessage::Heartbeat(_) => {}
            other => debug!(kind = other.kind(), "ignoring unexpected hub frame"),
        }
    }

    fn handle_fill(&self, fill: ConfirmedFill) {
        let order_id = fill.order.order_id;
        if self.ledger.contains(order_id) {
            // Redelivered fill for an order this (or a prior) incarnation
            // already judged.
            self.metrics.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
            debug!(order = %order_id, "fill for already-judged order ignored");
            return;
        }
        if self.monitor.track(fill) {
            self.metrics.fills_tracked.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.duplicate_fills.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Ledger first, then the report back to the router. The ledger is the
    /// system of record: if it cannot be written, nothing is reported and
    /// the mission stays CONFIRMED for manual reconciliation.
    pub async fn finalize(&self, outcome: Outcome) {
        if outcome.result == OutcomeResult::Unresolved {
            self.metrics.unresolved_flagged.fetch_add(1, Ordering::Relaxed);
        }

        match self.ledger.append(&outcome) {
            Ok(true) => {
                self.metrics.outcomes_written.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {
                self.metrics.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.metrics.ledger_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    order = %outcome.order_id,
                    error = %e,
                    "outcome ledger append failed; not reporting"
                );
                return;
            }
        }

        self.send_report(outcome).await;
    }

    async fn send_report(&self, outcome: Outcome) {
        let order_id = outcome.order_id;
        let msg = ChannelMessage::OutcomeReport(outcome.clone());
        let mut reporter = self.reporter.lock().await;
        match reporter.send(&msg).await {
            Ok(()) => {
                self.metrics.reports_sent.fetch_add(1, Ordering::Relaxed);
                self.pending_reports.remove(&order_id);
                debug!(order = %order_id, "outcome reported to router");
            }
            Err(e) => {
                self.metrics.report_failures.fetch_add(1, Ordering::Relaxed);
                warn!(order = %order_id, error = %e, "outcome report failed; will retry");
                self.pending_reports.insert(order_id, outcome);
            }
        }
    }

    /// Retry parked reports. Run on an interval by the service.
    pub async fn flush_pending_reports(&self) {
        let parked: Vec<Outcome> = self
            .pending_reports
            .iter()
            .map(|e| e.value().clone())
            .collect();
        for outcome in parked {
            self.send_report(outcome).await;
        }
    }

    /// Run the quote-gap sweep and finalize anything it flags.
    pub async fn sweep_quote_gaps(&self) {
        for outcome in self.monitor.sweep_quote_gaps() {
            self.finalize(outcome).await;
        }
    }
}
