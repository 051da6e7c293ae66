//! Single timer wheel for all router deadlines.
//!
//! One task owns every pending deadline (dispatch-confirm timeouts, mission
//! expiries) in a binary heap and sleeps until the earliest one. No
//! per-mission polling loops, no busy-waiting.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;
use types::{MissionId, OrderId};

/// Deadline events the router reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// No confirmation arrived for this order inside the dispatch timeout.
    ConfirmTimeout(OrderId),
    /// The mission's own expiry passed before it fired.
    MissionExpiry(MissionId),
}

#[derive(Debug, PartialEq, Eq)]
struct Deadline {
    at: Instant,
    seq: u64,
    event: TimerEvent,
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Cheap cloneable handle for arming deadlines.
#[derive(Clone)]
pub struct TimerHandle {
    tx: mpsc::UnboundedSender<Deadline0>,
}

struct Deadline0 {
    delay: Duration,
    event: TimerEvent,
}

impl TimerHandle {
    pub fn arm(&self, delay: Duration, event: TimerEvent) {
        // A closed wheel only happens during shutdown; dropping the arm
        // request is correct there.
        let _ = self.tx.send(Deadline0 { delay, event });
    }
}

/// The wheel task. Fires due events into `sink` in deadline order.
pub struct TimerWheel {
    rx: mpsc::UnboundedReceiver<Deadline0>,
    queue: BinaryHeap<Reverse<Deadline>>,
    seq: u64,
}

pub fn timer_wheel() -> (TimerHandle, TimerWheel) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        TimerHandle { tx },
        TimerWheel {
            rx,
            queue: BinaryHeap::new(),
            seq: 0,
        },
    )
}

impl TimerWheel {
    pub async fn run(mut self, sink: mpsc::Sender<TimerEvent>) {
        loop {
            // Fire everything already due.
            let now = Instant::now();
            while let Some(Reverse(head)) = self.queue.peek() {
                if head.at > now {
                    break;
                }
                if let Some(Reverse(due)) = self.queue.pop() {
                    debug!(event = ?due.event, "timer fired");
                    if sink.send(due.event).await.is_err() {
                        return;
                    }
                }
            }

            // Sleep until the next deadline or the next arm request.
            match self.queue.peek() {
                Some(Reverse(head)) => {
                    let until = head.at;
                    tokio::select! {
                        _ = tokio::time::sleep_until(until.into()) => {}
                        armed = self.rx.recv() => match armed {
                            Some(req) => self.push(req),
                            None => return,
                        },
                    }
                }
                None => match self.rx.recv().await {
                    Some(req) => self.push(req),
                    None => return,
                },
            }
        }
    }

    fn push(&mut self, req: Deadline0) {
        self.seq += 1;
        self.queue.push(Reverse(Deadline {
            at: Instant::now() + req.delay,
            seq: self.seq,
            event: req.event,
        }));
    }
}
