//! # RouterCore - Mission Orchestration
//!
//! ## Purpose
//! Owns every piece of shared router state and implements the mission
//! lifecycle: signal intake, per-user validation, sizing, dispatch, and the
//! timer-driven reconciliation paths. Confirmation handling lives in
//! [`crate::confirm`] on the same type.
//!
//! ## Policy Gate (PENDING -> VALIDATED)
//! In order: confidence floor, cooldown window, vitality execution floor,
//! slot acquisition. Any failure rejects the mission with its specific
//! reason code. The slot is acquired last so no failed gate can leak one.

use crate::config::RouterConfig;
use crate::metrics::RouterMetrics;
use crate::registry::MissionRegistry;
use crate::slots::SlotBook;
use crate::timer::{TimerEvent, TimerHandle};
use dashmap::DashMap;
use risk::{AccountState, PositionSizer, SizerConfig};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use transport::{
    DispatchOutcome, EventPublisher, FireDispatcher, HeartbeatMonitor,
};
use types::{
    tick_topic, EventBody, MarketTick, Mission, MissionId, MissionState, RejectReason, Signal,
    SignalMode, SymbolSpec, UserId, UserRiskProfile,
};
use vitality::{MarketWindowCache, VitalityEngine};

/// Per-user post-fire cooldown windows.
#[derive(Default)]
pub struct CooldownBook {
    until: DashMap<UserId, Instant>,
}

impl CooldownBook {
    pub fn is_active(&self, user: &UserId) -> bool {
        self.until
            .get(user)
            .map(|t| *t > Instant::now())
            .unwrap_or(false)
    }

    pub fn arm(&self, user: &UserId, duration: Duration) {
        self.until.insert(user.clone(), Instant::now() + duration);
    }
}

/// Shared state and orchestration logic for the fire router.
pub struct RouterCore {
    pub config: RouterConfig,
    pub registry: MissionRegistry,
    pub slots: SlotBook,
    pub cooldowns: CooldownBook,
    pub vitality: Arc<VitalityEngine>,
    pub windows: Arc<MarketWindowCache>,
    pub sizer: PositionSizer,
    pub dispatcher: Arc<FireDispatcher>,
    pub publisher: EventPublisher,
    pub heartbeats: Arc<HeartbeatMonitor>,
    pub metrics: Arc<RouterMetrics>,
    pub timers: TimerHandle,
    profiles: Vec<UserRiskProfile>,
    balances: DashMap<UserId, Decimal>,
    specs: HashMap<String, SymbolSpec>,
}

impl RouterCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RouterConfig,
        profiles: Vec<UserRiskProfile>,
        windows: Arc<MarketWindowCache>,
        vitality: Arc<VitalityEngine>,
        dispatcher: Arc<FireDispatcher>,
        publisher: EventPublisher,
        heartbeats: Arc<HeartbeatMonitor>,
        timers: TimerHandle,
    ) -> Self {
        let mut specs = HashMap::new();
        for spec in &config.symbols {
            vitality.register_spec(spec.clone());
            specs.insert(spec.symbol.clone(), spec.clone());
        }
        let balances = DashMap::new();
        for (user, balance) in &config.starting_balances {
            balances.insert(UserId::new(user.clone()), *balance);
        }

        Self {
            registry: MissionRegistry::new(),
            slots: SlotBook::new(),
            cooldowns: CooldownBook::default(),
            sizer: PositionSizer::new(SizerConfig::default()),
            metrics: Arc::new(RouterMetrics::default()),
            profiles,
            balances,
            specs,
            config,
            vitality,
            windows,
            dispatcher,
            publisher,
            heartbeats,
            timers,
        }
    }

    pub fn profiles(&self) -> &[UserRiskProfile] {
        &self.profiles
    }

    pub fn update_balance(&self, user: &UserId, balance: Decimal) {
        self.balances.insert(user.clone(), balance);
    }

    fn spec_for(&self, symbol: &str) -> SymbolSpec {
        self.specs
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| SymbolSpec::forex_default(symbol))
    }

    /// Fold a live quote into the window cache and re-broadcast it on the
    /// event hub for downstream trackers.
    pub async fn handle_tick(&self, tick: MarketTick) {
        self.windows.apply_tick(&tick);
        self.publisher
            .broadcast(&tick_topic(&tick.symbol), EventBody::Tick(tick))
            .await;
    }

    /// Instantiate and route one detector signal across every configured
    /// user.
    pub async fn handle_signal(&self, signal: Signal) {
        use std::sync::atomic::Ordering;

        self.metrics.signals_received.fetch_add(1, Ordering::Relaxed);
        match SignalMode::classify(&signal.pattern, &self.config.policy.fast_patterns) {
            SignalMode::Fast => self.metrics.fast_signals.fetch_add(1, Ordering::Relaxed),
            SignalMode::Patient => self.metrics.patient_signals.fetch_add(1, Ordering::Relaxed),
        };

        let now = chrono::Utc::now();
        if signal.is_expired(now) {
            self.metrics
                .signals_expired_on_arrival
                .fetch_add(1, Ordering::Relaxed);
            warn!(signal = signal.signal_id.as_str(), "signal already expired on arrival");
            return;
        }

        info!(
            signal = signal.signal_id.as_str(),
            symbol = signal.symbol.as_str(),
            confidence = signal.confidence,
            pattern = signal.pattern.as_str(),
            "signal received"
        );

        let signal = Arc::new(signal);
        for profile in self.profiles.clone() {
            self.route_for_user(signal.clone(), &profile).await;
        }
    }

    async fn route_for_user(&self, signal: Arc<Signal>, profile: &UserRiskProfile) {
        use std::sync::atomic::Ordering;

        let mission = Mission::new(
            signal.signal_id.clone(),
            profile.user_id.clone(),
            profile.tier,
            signal.expires_at,
        );
        let Some(mission_id) = self.registry.create(signal.clone(), mission) else {
            return;
        };
        self.metrics.missions_created.fetch_add(1, Ordering::Relaxed);

        // One expiry deadline per mission, owned by the timer wheel.
        let ttl = (signal.expires_at - chrono::Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.timers.arm(ttl, TimerEvent::MissionExpiry(mission_id));

        // Policy gate. Slot acquisition is deliberately last.
        if !profile.admits_confidence(signal.confidence) {
            self.reject_mission(mission_id, RejectReason::ConfidenceBelowFloor);
            return;
        }
        if self.cooldowns.is_active(&profile.user_id) {
            self.reject_mission(mission_id, RejectReason::CooldownActive);
            return;
        }
        let reading = self.vitality.reading_for(mission_id, &signal);
        if !reading.allows_execution() {
            debug!(
                mission = %mission_id,
                score = reading.score,
                reasons = ?reading.reasons,
                "vitality below execution floor"
            );
            self.reject_mission(mission_id, RejectReason::StaleSignal);
            return;
        }
        if !self
            .slots
            .try_acquire(&profile.user_id, profile.max_concurrent_slots)
        {
            self.reject_mission(mission_id, RejectReason::SlotsExhausted);
            return;
        }

        let validated = self
            .registry
            .update(mission_id, |entry| {
                entry.mission.transition(MissionState::Validated).map(|_| {
                    entry.slot_held = true;
                })
            })
            .unwrap_or(Err(types::StateError::AlreadyTerminal(mission_id)));
        match validated {
            Ok(()) => {
                self.metrics.missions_validated.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                // Raced with expiry; give the slot back.
                warn!(mission = %mission_id, error = %e, "validation lost a race");
                self.slots.release(&profile.user_id);
                return;
            }
        }

        self.fire_mission(mission_id, signal, profile).await;
    }

    /// VALIDATED -> FIRED: degradation precondition, sizing, dispatch.
    async fn fire_mission(
        &self,
        mission_id: MissionId,
        signal: Arc<Signal>,
        profile: &UserRiskProfile,
    ) {
        use std::sync::atomic::Ordering;

        if self
            .heartbeats
            .is_degraded(&self.config.dispatch.terminal_node_id)
        {
            warn!(
                mission = %mission_id,
                "fire channel DEGRADED; refusing new dispatch"
            );
            self.reject_mission(mission_id, RejectReason::TransportDegraded);
            return;
        }

        let reading = self.vitality.reading_for(mission_id, &signal);
        let spec = self.spec_for(&signal.symbol);
        let account = AccountState {
            balance: self.balances.get(&profile.user_id).map(|b| *b),
            atr: self.windows.snapshot(&signal.symbol).and_then(|s| s.atr),
        };
        let Some(mission) = self
            .registry
            .update(mission_id, |entry| entry.mission.clone())
        else {
            return;
        };

        let order = match self.sizer.build_order(
            &mission,
            &signal,
            &reading,
            profile,
            &account,
            &spec,
        ) {
            Ok(order) => order,
            Err(e) if e.is_drawdown() => {
                warn!(mission = %mission_id, error = %e, "drawdown breaker refused order");
                self.reject_mission(mission_id, RejectReason::DrawdownLimit);
                return;
            }
            Err(e) => {
                warn!(mission = %mission_id, error = %e, "sizing refused order");
                self.reject_mission(mission_id, RejectReason::Sizing);
                return;
            }
        };

        let order_id = order.order_id;
        self.registry.bind_order(mission_id, order.clone());

        match self.dispatcher.dispatch(&order).await {
            DispatchOutcome::Sent => {}
            DispatchOutcome::Uncertain(reason) => {
                // Still FIRED: the order may have left. Reconciliation comes
                // from a confirmation or the dispatch timeout, never from
                // guessing here.
                self.metrics.dispatch_uncertain.fetch_add(1, Ordering::Relaxed);
                debug!(mission = %mission_id, %reason, "dispatch uncertain");
            }
        }

        let fired = self
            .registry
            .update(mission_id, |entry| {
                entry.mission.transition(MissionState::Fired)
            })
            .unwrap_or(Err(types::StateError::AlreadyTerminal(mission_id)));
        if let Err(e) = fired {
            error!(mission = %mission_id, error = %e, "FIRED transition failed after dispatch");
            return;
        }
        self.metrics.missions_fired.fetch_add(1, Ordering::Relaxed);
        self.cooldowns.arm(
            &profile.user_id,
            Duration::from_secs(profile.cooldown_secs),
        );
        self.timers.arm(
            Duration::from_secs(self.config.dispatch.confirm_timeout_secs),
            TimerEvent::ConfirmTimeout(order_id),
        );

        info!(
            mission = %mission_id,
            order = %order_id,
            symbol = order.symbol.as_str(),
            volume = order.volume,
            "mission fired"
        );
    }

    /// Reject a mission with a reason code, releasing its slot exactly once.
    /// Returns false when the mission was already terminal.
    pub fn reject_mission(&self, mission_id: MissionId, reason: RejectReason) -> bool {
        use std::sync::atomic::Ordering;

        let rejected = self
            .registry
            .update(mission_id, |entry| {
                if entry.mission.state.is_terminal() {
                    return false;
                }
                match entry.mission.reject(reason) {
                    Ok(()) => {
                        if entry.slot_held {
                            self.slots.release(&entry.mission.user_id);
                            entry.slot_held = false;
                        }
                        true
                    }
                    Err(e) => {
                        error!(mission = %mission_id, error = %e, "reject transition failed");
                        false
                    }
                }
            })
            .unwrap_or(false);

        if rejected {
            self.registry.note_terminal(mission_id);
            self.vitality.invalidate(&mission_id);
            self.metrics.missions_rejected.fetch_add(1, Ordering::Relaxed);
            info!(mission = %mission_id, reason = %reason, "mission rejected");
        }
        rejected
    }

    /// User override: cancel a mission that has not fired yet.
    pub fn cancel_mission(&self, mission_id: MissionId) -> bool {
        let cancellable = self
            .registry
            .update(mission_id, |entry| entry.mission.can_cancel())
            .unwrap_or(false);
        if !cancellable {
            debug!(mission = %mission_id, "cancellation refused; mission already fired or gone");
            return false;
        }
        self.reject_mission(mission_id, RejectReason::Cancelled)
    }

    /// Timer wheel callback.
    pub fn handle_timer(&self, event: TimerEvent) {
        use std::sync::atomic::Ordering;

        match event {
            TimerEvent::ConfirmTimeout(order_id) => {
                let Some(mission_id) = self.registry.mission_for_order(order_id) else {
                    return;
                };
                if self.registry.state_of(mission_id) == Some(MissionState::Fired) {
                    warn!(
                        mission = %mission_id,
                        order = %order_id,
                        "no confirmation within dispatch timeout"
                    );
                    if self.reject_mission(mission_id, RejectReason::DispatchTimeout) {
                        self.metrics.dispatch_timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            TimerEvent::MissionExpiry(mission_id) => {
                let expired = self
                    .registry
                    .update(mission_id, |entry| {
                        if !matches!(
                            entry.mission.state,
                            MissionState::Pending | MissionState::Validated
                        ) {
                            return false;
                        }
                        match entry.mission.transition(MissionState::Expired) {
                            Ok(()) => {
                                if entry.slot_held {
                                    self.slots.release(&entry.mission.user_id);
                                    entry.slot_held = false;
                                }
                                true
                            }
                            Err(_) => false,
                        }
                    })
                    .unwrap_or(false);
                if expired {
                    self.registry.note_terminal(mission_id);
                    self.vitality.invalidate(&mission_id);
                    self.metrics.missions_expired.fetch_add(1, Ordering::Relaxed);
                    info!(mission = %mission_id, "mission expired before firing");
                }
            }
        }
    }
}
