//! Global atomic counters for deploy activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when the chat loop shuts down).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters with no allocation or locking.
pub struct Metrics {
    deploys_started: AtomicU64,
    deploys_succeeded: AtomicU64,
    deploys_failed: AtomicU64,
    queue_polls: AtomicU64,
    status_polls: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            deploys_started: AtomicU64::new(0),
            deploys_succeeded: AtomicU64::new(0),
            deploys_failed: AtomicU64::new(0),
            queue_polls: AtomicU64::new(0),
            status_polls: AtomicU64::new(0),
        }
    }

    pub fn inc_deploys_started(&self) {
        self.deploys_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "deploys_started", "counter incremented");
    }

    /// Record how a deploy ended.
    pub fn record_outcome(&self, success: bool) {
        if success {
            self.deploys_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.deploys_failed.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "deploy_outcome", success, "counter incremented");
    }

    /// One queue-item lookup.
    pub fn inc_queue_polls(&self) {
        self.queue_polls.fetch_add(1, Ordering::Relaxed);
    }

    /// One build status lookup.
    pub fn inc_status_polls(&self) {
        self.status_polls.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            deploys_started = self.deploys_started(),
            deploys_succeeded = self.deploys_succeeded(),
            deploys_failed = self.deploys_failed(),
            queue_polls = self.queue_polls(),
            status_polls = self.status_polls(),
        );
    }

    pub fn deploys_started(&self) -> u64 {
        self.deploys_started.load(Ordering::Relaxed)
    }

    pub fn deploys_succeeded(&self) -> u64 {
        self.deploys_succeeded.load(Ordering::Relaxed)
    }

    pub fn deploys_failed(&self) -> u64 {
        self.deploys_failed.load(Ordering::Relaxed)
    }

    pub fn queue_polls(&self) -> u64 {
        self.queue_polls.load(Ordering::Relaxed)
    }

    pub fn status_polls(&self) -> u64 {
        self.status_polls.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.deploys_started.store(0, Ordering::Relaxed);
        self.deploys_succeeded.store(0, Ordering::Relaxed);
        self.deploys_failed.store(0, Ordering::Relaxed);
        self.queue_polls.store(0, Ordering::Relaxed);
        self.status_polls.store(0, Ordering::Relaxed);
    }
}
