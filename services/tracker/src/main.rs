//! Outcome tracker service binary.

use anyhow::{Context, Result};
use clap::Parser;
use outcome_tracker::config::TrackerConfig;
use outcome_tracker::consumer::TrackerConsumer;
use outcome_tracker::ledger::OutcomeLedger;
use outcome_tracker::monitor::{MonitorConfig, PositionMonitor};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "outcome_tracker")]
#[command(about = "Firegrid outcome tracker service")]
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

    info!("🚀 Starting Outcome Tracker...");

    let config = match &args.config {
        Some(path) => TrackerConfig::from_file(path)?,
        None => TrackerConfig::from_env(),
    };
    config.validate().context("invalid configuration")?;

    let ledger = Arc::new(
        OutcomeLedger::open(&config.ledger_path).context("opening outcome ledger")?,
    );
    info!(path = %config.ledger_path.display(), "{}", ledger.stats());

    let monitor = Arc::new(PositionMonitor::new(MonitorConfig {
        quote_gap_ceiling: Duration::from_secs(config.tracking.quote_gap_ceiling_secs),
        breakeven_epsilon_pips: config.tracking.breakeven_epsilon_pips,
    }));
    for spec in &config.symbols {
        monitor.register_spec(spec.clone());
    }

    let consumer = Arc::new(TrackerConsumer::new(
        config.clone(),
        monitor.clone(),
        ledger.clone(),
    ));

    // Quote-gap sweep.
    {
        let consumer = consumer.clone();
        let mut ticker = tokio::time::interval(Duration::from_secs(
            config.tracking.sweep_interval_secs,
        ));
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                consumer.sweep_quote_gaps().await;
            }
        });
    }

    // Report retry for at-least-once delivery toward the router.
    {
        let consumer = consumer.clone();
        let mut ticker = tokio::time::interval(Duration::from_secs(
            config.network.report_retry_secs,
        ));
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                consumer.flush_pending_reports().await;
            }
        });
    }

    // Metrics reporting.
    {
        let consumer = consumer.clone();
        let ledger = ledger.clone();
        let monitor = monitor.clone();
        let mut ticker =
            tokio::time::interval(Duration::from_secs(config.metrics_interval_secs));
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                info!(
                    open_positions = monitor.open_positions(),
                    "{} | {}",
                    consumer.metrics(),
                    ledger.stats()
                );
            }
        });
    }

    // Liveness beacon toward the router's heartbeat channel.
    {
        let paths = config.channel_paths();
        let emitter = transport::HeartbeatEmitter::new(
            config.network.consumer_id.clone(),
            transport::PushClient::new(transport::ChannelKind::Heartbeat, &paths.heartbeat),
            Duration::from_secs(15),
        );
        tokio::spawn(emitter.run());
    }

    // Hub consumer runs until shutdown.
    {
        let consumer = consumer.clone();
        tokio::spawn(async move {
            consumer.run().await;
        });
    }

    info!("📡 Outcome tracker running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");
    info!("final ledger state: {}", ledger.stats());
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
