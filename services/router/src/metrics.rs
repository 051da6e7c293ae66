//! Router metrics and the fast/patient mode-mix monitor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Lifetime counters for the router, reported on the metrics interval.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    pub signals_received: AtomicU64,
    pub signals_expired_on_arrival: AtomicU64,
    pub missions_created: AtomicU64,
    pub missions_validated: AtomicU64,
    pub missions_fired: AtomicU64,
    pub missions_confirmed: AtomicU64,
    pub missions_rejected: AtomicU64,
    pub missions_expired: AtomicU64,
    pub missions_closed: AtomicU64,
    pub dispatch_uncertain: AtomicU64,
    pub dispatch_timeouts: AtomicU64,
    pub duplicate_confirmations: AtomicU64,
    pub unknown_confirmations: AtomicU64,
    pub stray_rejects_ignored: AtomicU64,
    /// FILLED confirmations that arrived after the dispatch timeout already
    /// rejected the mission. Flagged for manual reconciliation.
    pub late_fills: AtomicU64,
    pub fast_signals: AtomicU64,
    pub patient_signals: AtomicU64,
}

impl RouterMetrics {
    /// Observed fraction of fast-mode signals; `None` below the sample floor.
    pub fn observed_fast_share(&self, min_samples: u64) -> Option<f64> {
        let fast = self.fast_signals.load(Ordering::Relaxed);
        let patient = self.patient_signals.load(Ordering::Relaxed);
        let total = fast + patient;
        if total < min_samples {
            return None;
        }
        Some(fast as f64 / total as f64)
    }

    /// Warn when the observed fast/patient mix drifts past tolerance from
    /// the target. Monitoring only; nothing is ever gated on mode.
    pub fn check_mode_mix(&self, target_fast_share: f64, tolerance: f64) {
        if let Some(observed) = self.observed_fast_share(20) {
            let drift = (observed - target_fast_share).abs();
            if drift > tolerance {
                warn!(
                    observed = format!("{:.0}%", observed * 100.0),
                    target = format!("{:.0}%", target_fast_share * 100.0),
                    "fast/patient signal mix drifting from target"
                );
            }
        }
    }
}

impl fmt::Display for RouterMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RouterMetrics {{ signals: {}, created: {}, fired: {}, confirmed: {}, rejected: {}, \
             expired: {}, closed: {}, timeouts: {}, dup_confirms: {}, unknown_confirms: {}, \
             fast/patient: {}/{} }}",
            self.signals_received.load(Ordering::Relaxed),
            self.missions_created.load(Ordering::Relaxed),
            self.missions_fired.load(Ordering::Relaxed),
            self.missions_confirmed.load(Ordering::Relaxed),
            self.missions_rejected.load(Ordering::Relaxed),
            self.missions_expired.load(Ordering::Relaxed),
            self.missions_closed.load(Ordering::Relaxed),
            self.dispatch_timeouts.load(Ordering::Relaxed),
            self.duplicate_confirmations.load(Ordering::Relaxed),
            self.unknown_confirmations.load(Ordering::Relaxed),
            self.fast_signals.load(Ordering::Relaxed),
            self.patient_signals.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_share_needs_a_sample_floor() {
        let metrics = RouterMetrics::default();
        metrics.fast_signals.store(3, Ordering::Relaxed);
        metrics.patient_signals.store(2, Ordering::Relaxed);
        assert_eq!(metrics.observed_fast_share(20), None);

        metrics.fast_signals.store(12, Ordering::Relaxed);
        metrics.patient_signals.store(8, Ordering::Relaxed);
        let share = metrics.observed_fast_share(20).unwrap();
        assert!((share - 0.6).abs() < 1e-9);
    }
}
