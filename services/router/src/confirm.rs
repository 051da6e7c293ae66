//! Confirmation listener: reconciles terminal acknowledgments and tracker
//! outcome reports into mission state.
//!
//! Everything here is idempotent. Confirmations are delivered at-least-once,
//! outcome reports ride the same channel, and a prior process incarnation may
//! have produced order ids this one has never heard of — unknowns are logged
//! and dropped, never a crash.

use crate::router::RouterCore;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};
use types::{
    Confirmation, ConfirmationStatus, ConfirmedFill, MissionState, Outcome, OutcomeResult,
    RejectReason, FILL_TOPIC,
};

impl RouterCore {
    /// Apply one terminal confirmation.
    pub async fn handle_confirmation(&self, conf: Confirmation) {
        // Any confirmation proves the terminal is alive.
        self.heartbeats
            .record(&self.config.dispatch.terminal_node_id);

        let Some(mission_id) = self.registry.mission_for_order(conf.order_id) else {
            self.metrics
                .unknown_confirmations
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                order = %conf.order_id,
                status = ?conf.status,
                "confirmation for unknown order (prior incarnation?); dropped"
            );
            return;
        };

        match conf.status {
            ConfirmationStatus::Filled => self.apply_fill(mission_id, conf).await,
            ConfirmationStatus::Rejected => self.apply_remote_reject(mission_id, conf),
        }
    }

    async fn apply_fill(&self, mission_id: types::MissionId, conf: Confirmation) {
        let state = self.registry.state_of(mission_id);
        match state {
            Some(MissionState::Fired) => {}
            Some(MissionState::Confirmed)
            | Some(MissionState::ClosedWin)
            | Some(MissionState::ClosedLoss)
            | Some(MissionState::ClosedBreakeven) => {
                // At-least-once redelivery; one transition already happened.
                self.metrics
                    .duplicate_confirmations
                    .fetch_add(1, Ordering::Relaxed);
                debug!(mission = %mission_id, "duplicate FILLED confirmation ignored");
                return;
            }
            Some(MissionState::Rejected) => {
                // The dispatch timeout beat the fill. The position is likely
                // open at the broker with no mission tracking it.
                self.metrics.late_fills.fetch_add(1, Ordering::Relaxed);
                error!(
                    mission = %mission_id,
                    order = %conf.order_id,
                    "FILLED arrived after timeout rejection; manual reconciliation required"
                );
                return;
            }
            other => {
                error!(mission = %mission_id, state = ?other, "fill for mission in unexpected state");
                return;
            }
        }

        let fill = self.registry.update(mission_id, |entry| {
            let Some(order) = entry.order.clone() else {
                error!(mission = %mission_id, "FIRED mission has no bound order");
                return Err(types::StateError::AlreadyTerminal(mission_id));
            };
            entry.mission.transition(MissionState::Confirmed)?;
            Ok(ConfirmedFill {
                mission_id,
                user_id: entry.mission.user_id.clone(),
                pattern: entry.signal.pattern.clone(),
                order,
                confirmation: conf.clone(),
            })
        });

        match fill {
            Some(Ok(fill)) => {
                self.metrics
                    .missions_confirmed
                    .fetch_add(1, Ordering::Relaxed);
                if let Some(balance) = conf.account_balance {
                    self.update_balance(&fill.user_id, balance);
                }
                info!(
                    mission = %mission_id,
                    order = %conf.order_id,
                    ticket = ?conf.broker_ticket,
                    fill_price = ?conf.fill_price,
                    "order filled"
                );
                self.publisher
                    .broadcast(FILL_TOPIC, types::EventBody::FillConfirmed(fill))
                    .await;
            }
            Some(Err(e)) => {
                error!(mission = %mission_id, error = %e, "CONFIRMED transition failed");
            }
            None => {}
        }
    }

    fn apply_remote_reject(&self, mission_id: types::MissionId, conf: Confirmation) {
        match self.registry.state_of(mission_id) {
            Some(MissionState::Fired) => {
                info!(
                    mission = %mission_id,
                    order = %conf.order_id,
                    "terminal rejected the order"
                );
                self.reject_mission(mission_id, RejectReason::TerminalRejected);
            }
            Some(MissionState::Confirmed)
            | Some(MissionState::ClosedWin)
            | Some(MissionState::ClosedLoss)
            | Some(MissionState::ClosedBreakeven) => {
                // Out-of-order delivery: the first FILLED wins; an order once
                // filled cannot be un-filled.
                self.metrics
                    .stray_rejects_ignored
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    mission = %mission_id,
                    order = %conf.order_id,
                    "stray REJECTED after FILLED; logged and discarded"
                );
            }
            _ => {
                self.metrics
                    .duplicate_confirmations
                    .fetch_add(1, Ordering::Relaxed);
                debug!(mission = %mission_id, "redundant REJECTED confirmation ignored");
            }
        }
    }

    /// Apply one outcome report from the truth tracker.
    pub fn handle_outcome(&self, outcome: Outcome) {
        let Some(mission_id) = self.registry.mission_for_order(outcome.order_id) else {
            self.metrics
                .unknown_confirmations
                .fetch_add(1, Ordering::Relaxed);
            warn!(order = %outcome.order_id, "outcome for unknown order; dropped");
            return;
        };

        let next = match outcome.result {
            OutcomeResult::Win => MissionState::ClosedWin,
            OutcomeResult::Loss => MissionState::ClosedLoss,
            OutcomeResult::Breakeven => MissionState::ClosedBreakeven,
            OutcomeResult::Unresolved => {
                // The quote feed died under the position. The mission stays
                // CONFIRMED with its slot held: the position may well still
                // be open, and pretending otherwise would free risk capacity
                // that is actually committed.
                warn!(
                    mission = %mission_id,
                    order = %outcome.order_id,
                    "unresolved outcome flagged; awaiting manual reconciliation"
                );
                return;
            }
        };

        let closed = self
            .registry
            .update(mission_id, |entry| {
                if entry.mission.state != MissionState::Confirmed {
                    return false;
                }
                match entry.mission.transition(next) {
                    Ok(()) => {
                        if entry.slot_held {
                            self.slots.release(&entry.mission.user_id);
                            entry.slot_held = false;
                        }
                        true
                    }
                    Err(e) => {
                        error!(mission = %mission_id, error = %e, "close transition failed");
                        false
                    }
                }
            })
            .unwrap_or(false);

        if closed {
            self.registry.note_terminal(mission_id);
            self.vitality.invalidate(&mission_id);
            self.metrics.missions_closed.fetch_add(1, Ordering::Relaxed);
            self.sizer
                .loss_book()
                .record_result(&outcome.user_id, outcome.result);
            info!(
                mission = %mission_id,
                order = %outcome.order_id,
                result = %outcome.result,
                pips = outcome.pips,
                "mission closed"
            );
        } else {
            debug!(mission = %mission_id, "duplicate or out-of-order outcome ignored");
        }
    }
}
