//! Process-wide pipeline counters.
//!
//! Counters are bumped at the call site and emitted together by
//! [`Metrics::flush`], typically once before the CLI exits.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    proposals_planned: AtomicU64,
    mutations_applied: AtomicU64,
    mutations_failed: AtomicU64,
    recoveries_attempted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            proposals_planned: AtomicU64::new(0),
            mutations_applied: AtomicU64::new(0),
            mutations_failed: AtomicU64::new(0),
            recoveries_attempted: AtomicU64::new(0),
        }
    }

    pub fn inc_proposals_planned(&self, n: u64) {
        self.proposals_planned.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "proposals_planned", n, "counter incremented");
    }

    /// Record one mutator outcome.
    pub fn record_mutation(&self, success: bool) {
        let counter = if success {
            &self.mutations_applied
        } else {
            &self.mutations_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "mutations", success, "counter incremented");
    }

    pub fn inc_recoveries(&self) {
        self.recoveries_attempted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "recoveries_attempted", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            proposals_planned = self.proposals_planned(),
            mutations_applied = self.mutations_applied(),
            mutations_failed = self.mutations_failed(),
            recoveries_attempted = self.recoveries_attempted(),
        );
    }

    pub fn proposals_planned(&self) -> u64 {
        self.proposals_planned.load(Ordering::Relaxed)
    }

    pub fn mutations_applied(&self) -> u64 {
        self.mutations_applied.load(Ordering::Relaxed)
    }

    pub fn mutations_failed(&self) -> u64 {
        self.mutations_failed.load(Ordering::Relaxed)
    }

    pub fn recoveries_attempted(&self) -> u64 {
        self.recoveries_attempted.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.proposals_planned.store(0, Ordering::Relaxed);
        self.mutations_applied.store(0, Ordering::Relaxed);
        self.mutations_failed.store(0, Ordering::Relaxed);
        self.recoveries_attempted.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_proposals_planned(3);
        m.inc_proposals_planned(2);
        assert_eq!(m.proposals_planned(), 5);

        m.record_mutation(true);
        m.record_mutation(false);
        m.record_mutation(false);
        assert_eq!(m.mutations_applied(), 1);
        assert_eq!(m.mutations_failed(), 2);

        m.inc_recoveries();
        assert_eq!(m.recoveries_attempted(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_proposals_planned(1);
        m.record_mutation(true);
        m.inc_recoveries();
        m.reset();
        assert_eq!(m.proposals_planned(), 0);
        assert_eq!(m.mutations_applied(), 0);
        assert_eq!(m.recoveries_attempted(), 0);
    }
}
