use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MenuCacheSnapshot {
    pub remote_fetches: u64,
    pub queries_issued: u64,
    pub queries_applied: u64,
    pub queries_stale: u64,
    pub query_failures: u64,
}

#[derive(Default)]
pub struct MenuCacheMetrics {
    remote_fetches: AtomicU64,
    queries_issued: AtomicU64,
    queries_applied: AtomicU64,
    queries_stale: AtomicU64,
    query_failures: AtomicU64,
}

impl MenuCacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_remote_fetch(&self) {
        self.remote_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query_issued(&self) {
        self.queries_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query_applied(&self) {
        self.queries_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query_stale(&self) {
        self.queries_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query_failure(&self) {
        self.query_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MenuCacheSnapshot {
        MenuCacheSnapshot {
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            queries_issued: self.queries_issued.load(Ordering::Relaxed),
            queries_applied: self.queries_applied.load(Ordering::Relaxed),
            queries_stale: self.queries_stale.load(Ordering::Relaxed),
            query_failures: self.query_failures.load(Ordering::Relaxed),
        }
    }
}
