//! Global atomic counters for worker observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the engine does so after every package).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters, safe to bump from any task.
pub struct Metrics {
    packages_processed: AtomicU64,
    checkout_failures: AtomicU64,
    stages_passed: AtomicU64,
    stages_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            packages_processed: AtomicU64::new(0),
            checkout_failures: AtomicU64::new(0),
            stages_passed: AtomicU64::new(0),
            stages_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_packages_processed(&self) {
        self.packages_processed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "packages_processed", "counter incremented");
    }

    pub fn inc_checkout_failures(&self) {
        self.checkout_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "checkout_failures", "counter incremented");
    }

    /// Count one finished stage under passed or failed.
    pub fn record_stage(&self, passed: bool) {
        if passed {
            self.stages_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stages_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            packages_processed = self.packages_processed(),
            checkout_failures = self.checkout_failures(),
            stages_passed = self.stages_passed(),
            stages_failed = self.stages_failed(),
        );
    }

    pub fn packages_processed(&self) -> u64 {
        self.packages_processed.load(Ordering::Relaxed)
    }

    pub fn checkout_failures(&self) -> u64 {
        self.checkout_failures.load(Ordering::Relaxed)
    }

    pub fn stages_passed(&self) -> u64 {
        self.stages_passed.load(Ordering::Relaxed)
    }

    pub fn stages_failed(&self) -> u64 {
        self.stages_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.packages_processed.store(0, Ordering::Relaxed);
        self.checkout_failures.store(0, Ordering::Relaxed);
        self.stages_passed.store(0, Ordering::Relaxed);
        self.stages_failed.store(0, Ordering::Relaxed);
    }
}
