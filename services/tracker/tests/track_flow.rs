//! End-to-end tracker flow over real sockets: fill event in, ticks to
//! resolution, ledger record out, outcome report back to the router channel.

use chrono::Utc;
use outcome_tracker::config::TrackerConfig;
use outcome_tracker::consumer::TrackerConsumer;
use outcome_tracker::ledger::OutcomeLedger;
use outcome_tracker::monitor::{MonitorConfig, PositionMonitor};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use transport::{ChannelKind, EventHub, IngestListener};
use types::{
    tick_topic, ChannelMessage, Confirmation, ConfirmationStatus, ConfirmedFill, Direction,
    EventBody, FireOrder, MarketTick, MissionId, OrderId, OutcomeResult, UserId,
};

fn fill(entry: f64, stop: f64, target: f64) -> ConfirmedFill {
    let order = FireOrder {
        order_id: OrderId::new(),
        mission_id: MissionId::new(),
        symbol: "EURUSD".into(),
        direction: Direction::Buy,
        volume: 0.10,
        entry,
        stop,
        target,
        risk_percent_used: dec!(1.0),
        dispatched_at: Utc::now(),
    };
    ConfirmedFill {
        mission_id: order.mission_id,
        user_id: UserId::new("user-1"),
        pattern: "momentum-break".into(),
        order: order.clone(),
        confirmation: Confirmation {
            order_id: order.order_id,
            status: ConfirmationStatus::Filled,
            broker_ticket: Some(555),
            fill_price: Some(entry),
            account_balance: Some(dec!(10_000)),
            received_at: Utc::now(),
        },
    }
}

fn tick(bid: f64, ask: f64) -> MarketTick {
    MarketTick {
        symbol: "EURUSD".into(),
        bid,
        ask,
        volume: 100.0,
        ts: Utc::now(),
    }
}

fn build(dir: &TempDir) -> (TrackerConfig, Arc<TrackerConsumer>, Arc<OutcomeLedger>) {
    let mut config = TrackerConfig::default();
    config.network.socket_root = dir.path().to_path_buf();
    config.ledger_path = dir.path().join("outcomes.jsonl");
    config.network.reconnect_delay_secs = 1;

    let ledger = Arc::new(OutcomeLedger::open(&config.ledger_path).unwrap());
    let monitor = Arc::new(PositionMonitor::new(MonitorConfig::default()));
    let consumer = Arc::new(TrackerConsumer::new(
        config.clone(),
        monitor,
        ledger.clone(),
    ));
    (config, consumer, ledger)
}

#[tokio::test]
async fn fill_resolves_to_ledger_record_and_router_report() {
    let dir = TempDir::new().unwrap();
    let (config, consumer, ledger) = build(&dir);
    let paths = config.channel_paths();

    // Router-side infrastructure: the event hub and the confirm ingest the
    // tracker reports back into.
    let hub = EventHub::bind(&paths.event).unwrap();
    let publisher = hub.publisher();
    tokio::spawn(hub.run());
    let (confirm_listener, mut confirm_rx) =
        IngestListener::bind(ChannelKind::Confirm, &paths.confirm, 16, false).unwrap();
    tokio::spawn(confirm_listener.run());

    tokio::spawn(consumer.clone().run());
    // Let the consumer register with the hub.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let fill = fill(1.0853, 1.0828, 1.0903);
    let order_id = fill.order.order_id;
    publisher
        .broadcast("fill.confirmed", EventBody::FillConfirmed(fill))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A dip, then through the target.
    publisher
        .broadcast(&tick_topic("EURUSD"), EventBody::Tick(tick(1.0850, 1.0852)))
        .await;
    publisher
        .broadcast(&tick_topic("EURUSD"), EventBody::Tick(tick(1.0904, 1.0906)))
        .await;

    // The outcome report lands on the confirm channel.
    let report = tokio::time::timeout(Duration::from_secs(5), confirm_rx.recv())
        .await
        .expect("outcome report should arrive")
        .unwrap();
    match report {
        ChannelMessage::OutcomeReport(outcome) => {
            assert_eq!(outcome.order_id, order_id);
            assert_eq!(outcome.result, OutcomeResult::Win);
            assert!((outcome.pips - 50.0).abs() < 1e-6);
        }
        other => panic!("expected outcome report, got {:?}", other),
    }

    // Exactly one ledger record, win-rate visible in stats.
    assert!(ledger.contains(order_id));
    let stats = ledger.stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.wins, 1);
}

#[tokio::test]
async fn redelivered_fill_for_judged_order_is_skipped() {
    let dir = TempDir::new().unwrap();
    let (config, consumer, ledger) = build(&dir);
    let paths = config.channel_paths();

    // Confirm ingest so reports have somewhere to land.
    let (confirm_listener, _confirm_rx) =
        IngestListener::bind(ChannelKind::Confirm, &paths.confirm, 16, false).unwrap();
    tokio::spawn(confirm_listener.run());

    let fill = fill(1.0853, 1.0828, 1.0903);

    // Drive frames directly: fill, then a target-crossing tick.
    consumer
        .handle_frame(ChannelMessage::Event(types::EventFrame {
            topic: "fill.confirmed".into(),
            body: EventBody::FillConfirmed(fill.clone()),
        }))
        .await;
    consumer
        .handle_frame(ChannelMessage::Event(types::EventFrame {
            topic: tick_topic("EURUSD"),
            body: EventBody::Tick(tick(1.0904, 1.0906)),
        }))
        .await;
    assert_eq!(ledger.stats().total, 1);

    // At-least-once redelivery of the same fill after judgment: no second
    // tracking, no second record.
    consumer
        .handle_frame(ChannelMessage::Event(types::EventFrame {
            topic: "fill.confirmed".into(),
            body: EventBody::FillConfirmed(fill),
        }))
        .await;
    consumer
        .handle_frame(ChannelMessage::Event(types::EventFrame {
            topic: tick_topic("EURUSD"),
            body: EventBody::Tick(tick(1.0904, 1.0906)),
        }))
        .await;
    assert_eq!(ledger.stats().total, 1);
    use std::sync::atomic::Ordering;
    assert_eq!(
        consumer.metrics().duplicates_skipped.load(Ordering::Relaxed),
        1
    );
}
