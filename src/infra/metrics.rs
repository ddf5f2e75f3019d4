//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Sweep and event-log counters, shared across tasks
pub struct Metrics {
    start_time: Instant,
    sweeps: AtomicU64,
    processed: AtomicU64,
    updated: AtomicU64,
    errored: AtomicU64,
    skipped: AtomicU64,
    dedup_hits: AtomicU64,
    events_appended: AtomicU64,
    provider_calls: AtomicU64,
    provider_latency_sum_ms: AtomicU64,
    provider_latency_max_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            sweeps: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            dedup_hits: AtomicU64::new(0),
            events_appended: AtomicU64::new(0),
            provider_calls: AtomicU64::new(0),
            provider_latency_sum_ms: AtomicU64::new(0),
            provider_latency_max_ms: AtomicU64::new(0),
        }
    }

    pub fn record_sweep(&self, processed: u64, updated: u64, errored: u64, skipped: u64) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(processed, Ordering::Relaxed);
        self.updated.fetch_add(updated, Ordering::Relaxed);
        self.errored.fetch_add(errored, Ordering::Relaxed);
        self.skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn record_dedup_hit(&self) {
        self.dedup_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_appended(&self) {
        self.events_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_latency(&self, latency_ms: u64) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        self.provider_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        update_atomic_max(&self.provider_latency_max_ms, latency_ms);
    }

    pub fn dedup_hits(&self) -> u64 {
        self.dedup_hits.load(Ordering::Relaxed)
    }

    pub fn events_appended(&self) -> u64 {
        self.events_appended.load(Ordering::Relaxed)
    }

    /// Log a cumulative snapshot (called after each sweep)
    pub fn report(&self) {
        let calls = self.provider_calls.load(Ordering::Relaxed);
        let avg_ms = if calls > 0 {
            self.provider_latency_sum_ms.load(Ordering::Relaxed) / calls
        } else {
            0
        };

        info!(
            uptime_secs = %self.start_time.elapsed().as_secs(),
            sweeps = %self.sweeps.load(Ordering::Relaxed),
            processed = %self.processed.load(Ordering::Relaxed),
            updated = %self.updated.load(Ordering::Relaxed),
            errored = %self.errored.load(Ordering::Relaxed),
            skipped = %self.skipped.load(Ordering::Relaxed),
            dedup_hits = %self.dedup_hits.load(Ordering::Relaxed),
            events_appended = %self.events_appended.load(Ordering::Relaxed),
            provider_calls = %calls,
            provider_latency_avg_ms = %avg_ms,
            provider_latency_max_ms = %self.provider_latency_max_ms.load(Ordering::Relaxed),
            "metrics_snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
