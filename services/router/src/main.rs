//! Fire router service binary.

use anyhow::{Context, Result};
use clap::Parser;
use fire_router::config::RouterConfig;
use fire_router::router::RouterCore;
use fire_router::timer::timer_wheel;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use transport::{
    ChannelKind, EventHub, FireDispatcher, HeartbeatMonitor, IngestListener,
};
use types::ChannelMessage;
use vitality::{MarketWindowCache, VitalityEngine};

#[derive(Parser, Debug)]
#[command(name = "fire_router")]
#[command(about = "Firegrid fire router service")]
#[command(version)]
struct Args {
    /// Path to JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("🚀 Starting Fire Router...");

    let config = match &args.config {
        Some(path) => RouterConfig::from_file(path)?,
        None => RouterConfig::from_env(),
    };
    config.validate().context("invalid configuration")?;
    let profiles = config.load_profiles().context("loading risk profiles")?;
    if profiles.is_empty() {
        warn!("no user risk profiles configured; signals will route to nobody");
    }

    let paths = config.channel_paths();

    // One bound socket per ingest channel, each with its own drain loop.
    let (market_listener, mut market_rx) = IngestListener::bind(
        ChannelKind::MarketData,
        &paths.market_data,
        config.network.market_queue,
        true,
    )?;
    let (signal_listener, mut signal_rx) = IngestListener::bind(
        ChannelKind::Signal,
        &paths.signal,
        config.network.signal_queue,
        false,
    )?;
    let (confirm_listener, mut confirm_rx) = IngestListener::bind(
        ChannelKind::Confirm,
        &paths.confirm,
        config.network.confirm_queue,
        false,
    )?;
    let (heartbeat_listener, mut heartbeat_rx) = IngestListener::bind(
        ChannelKind::Heartbeat,
        &paths.heartbeat,
        config.network.heartbeat_queue,
        true,
    )?;
    let hub = EventHub::bind(&paths.event)?;
    let publisher = hub.publisher();

    let windows = Arc::new(MarketWindowCache::new());
    let vitality = Arc::new(VitalityEngine::new(windows.clone(), Default::default()));
    let dispatcher = Arc::new(FireDispatcher::new(
        &paths.fire,
        Duration::from_millis(config.dispatch.connect_timeout_ms),
        Duration::from_millis(config.dispatch.send_timeout_ms),
    ));
    let heartbeats = Arc::new(HeartbeatMonitor::new(Duration::from_secs(
        config.network.heartbeat_window_secs,
    )));
    let (timer_handle, timer_wheel_task) = timer_wheel();

    let core = Arc::new(RouterCore::new(
        config.clone(),
        profiles,
        windows,
        vitality,
        dispatcher.clone(),
        publisher,
        heartbeats.clone(),
        timer_handle,
    ));

    info!("✅ Fire router initialized; starting channel loops");

    tokio::spawn(market_listener.run());
    tokio::spawn(signal_listener.run());
    tokio::spawn(confirm_listener.run());
    tokio::spawn(heartbeat_listener.run());
    tokio::spawn(hub.run());

    let (timer_tx, mut timer_rx) = mpsc::channel(256);
    tokio::spawn(timer_wheel_task.run(timer_tx));

    // Market data loop: windows + tick re-broadcast.
    {
        let core = core.clone();
        let heartbeats = heartbeats.clone();
        tokio::spawn(async move {
            while let Some(msg) = market_rx.recv().await {
                match msg {
                    ChannelMessage::Tick(tick) => core.handle_tick(tick).await,
                    ChannelMessage::Heartbeat(hb) => heartbeats.record(&hb.node_id),
                    _ => {}
                }
            }
        });
    }

    // Signal loop: mission creation, validation, dispatch.
    {
        let core = core.clone();
        let heartbeats = heartbeats.clone();
        tokio::spawn(async move {
            while let Some(msg) = signal_rx.recv().await {
                match msg {
                    ChannelMessage::Signal(signal) => core.handle_signal(signal).await,
                    ChannelMessage::Heartbeat(hb) => heartbeats.record(&hb.node_id),
                    _ => {}
                }
            }
        });
    }

    // Confirmation loop: terminal acks and tracker outcome reports.
    {
        let core = core.clone();
        let heartbeats = heartbeats.clone();
        tokio::spawn(async move {
            while let Some(msg) = confirm_rx.recv().await {
                match msg {
                    ChannelMessage::Confirmation(conf) => core.handle_confirmation(conf).await,
                    ChannelMessage::OutcomeReport(outcome) => core.handle_outcome(outcome),
                    ChannelMessage::Heartbeat(hb) => heartbeats.record(&hb.node_id),
                    _ => {}
                }
            }
        });
    }

    // Heartbeat loop.
    {
        let heartbeats = heartbeats.clone();
        tokio::spawn(async move {
            while let Some(msg) = heartbeat_rx.recv().await {
                if let ChannelMessage::Heartbeat(hb) = msg {
                    heartbeats.record(&hb.node_id);
                }
            }
        });
    }

    // Timer wheel sink.
    {
        let core = core.clone();
        tokio::spawn(async move {
            while let Some(event) = timer_rx.recv().await {
                core.handle_timer(event);
            }
        });
    }

    // Registry hygiene: evict terminal missions past retention.
    {
        let core = core.clone();
        let retention = Duration::from_secs(config.policy.retention_hours * 3600);
        let mut ticker =
            tokio::time::interval(Duration::from_secs(config.policy.cleanup_interval_secs));
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let evicted = core.registry.cleanup(retention);
                if evicted > 0 {
                    info!(evicted, "evicted terminal missions past retention");
                }
            }
        });
    }

    // Metrics reporting and mode-mix monitoring.
    {
        let core = core.clone();
        let target = config.policy.mode_target_fast_share;
        let tolerance = config.policy.mode_warn_tolerance;
        let mut ticker =
            tokio::time::interval(Duration::from_secs(config.policy.metrics_interval_secs));
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                info!("{}", core.metrics);
                core.metrics.check_mode_mix(target, tolerance);
            }
        });
    }

    // Our own beacon toward the terminal over the fire socket.
    {
        let dispatcher = dispatcher.clone();
        let mut ticker = tokio::time::interval(Duration::from_secs(
            config.network.heartbeat_interval_secs,
        ));
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                dispatcher.send_heartbeat("fire-router").await;
            }
        });
    }

    info!("📡 Fire router running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");
    Ok(())
}

fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}
