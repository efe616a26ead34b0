use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub deliveries_accepted: u64,
    pub deliveries_ignored: u64,
    pub deliveries_duplicate: u64,
    pub sessions_relayed: u64,
    pub sessions_timed_out: u64,
    pub sessions_failed: u64,
}

/// Process-wide delivery and session counters.
#[derive(Debug)]
pub struct MetricsStore {
    start_time: Instant,
    deliveries_accepted: AtomicU64,
    deliveries_ignored: AtomicU64,
    deliveries_duplicate: AtomicU64,
    sessions_relayed: AtomicU64,
    sessions_timed_out: AtomicU64,
    sessions_failed: AtomicU64,
}

impl MetricsStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            deliveries_accepted: AtomicU64::new(0),
            deliveries_ignored: AtomicU64::new(0),
            deliveries_duplicate: AtomicU64::new(0),
            sessions_relayed: AtomicU64::new(0),
            sessions_timed_out: AtomicU64::new(0),
            sessions_failed: AtomicU64::new(0),
        })
    }

    pub fn inc_accepted(&self) {
        self.deliveries_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ignored(&self) {
        self.deliveries_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicate(&self) {
        self.deliveries_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_relayed(&self) {
        self.sessions_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timed_out(&self) {
        self.sessions_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            deliveries_accepted: self.deliveries_accepted.load(Ordering::Relaxed),
            deliveries_ignored: self.deliveries_ignored.load(Ordering::Relaxed),
            deliveries_duplicate: self.deliveries_duplicate.load(Ordering::Relaxed),
            sessions_relayed: self.sessions_relayed.load(Ordering::Relaxed),
            sessions_timed_out: self.sessions_timed_out.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
        }
    }
}
