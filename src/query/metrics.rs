//! Query client performance counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe counters shared by every worker using the client
#[derive(Debug)]
pub struct QueryMetrics {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    poll_attempts: AtomicU64,
    events_fetched: AtomicU64,
    /// Summed wall time of completed queries, in milliseconds
    total_latency_ms: AtomicU64,
    start_time: Instant,
}

impl Default for QueryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            poll_attempts: AtomicU64::new(0),
            events_fetched: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll(&self) {
        self.poll_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, events: usize, latency: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.events_fetched.fetch_add(events as u64, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> ClientStats {
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;

        ClientStats {
            queries_submitted: self.submitted.load(Ordering::Relaxed),
            queries_succeeded: succeeded,
            queries_failed: self.failed.load(Ordering::Relaxed),
            queries_timed_out: self.timed_out.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            cache_hit_rate: if lookups > 0 {
                cache_hits as f64 / lookups as f64 * 100.0
            } else {
                0.0
            },
            poll_attempts: self.poll_attempts.load(Ordering::Relaxed),
            events_fetched: self.events_fetched.load(Ordering::Relaxed),
            avg_query_latency_ms: if succeeded > 0 {
                total_latency_ms as f64 / succeeded as f64
            } else {
                0.0
            },
            uptime_secs: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

/// Serializable snapshot of [`QueryMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientStats {
    pub queries_submitted: u64,
    pub queries_succeeded: u64,
    pub queries_failed: u64,
    pub queries_timed_out: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Percentage of cache lookups that hit
    pub cache_hit_rate: f64,
    pub poll_attempts: u64,
    pub events_fetched: u64,
    pub avg_query_latency_ms: f64,
    pub uptime_secs: f64,
}
