//! Process Metrics
//!
//! Process-wide counters, updated with atomics only. These are the sole
//! global mutable state besides the configuration aggregate.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    files_succeeded: AtomicU64,
    files_failed: AtomicU64,
    rows_read: AtomicU64,
    rows_dropped: AtomicU64,
    products_created: AtomicU64,
    products_updated: AtomicU64,
    offer_lines_created: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub rows_read: u64,
    pub rows_dropped: u64,
    pub products_created: u64,
    pub products_updated: u64,
    pub offer_lines_created: u64,
}

pub static METRICS: Metrics = Metrics::new();

impl Metrics {
    pub const fn new() -> Self {
        Metrics {
            files_succeeded: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            rows_read: AtomicU64::new(0),
            rows_dropped: AtomicU64::new(0),
            products_created: AtomicU64::new(0),
            products_updated: AtomicU64::new(0),
            offer_lines_created: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self, rows_read: usize, created: usize, updated: usize, lines: usize) {
        self.files_succeeded.fetch_add(1, Ordering::Relaxed);
        self.rows_read.fetch_add(rows_read as u64, Ordering::Relaxed);
        self.products_created.fetch_add(created as u64, Ordering::Relaxed);
        self.products_updated.fetch_add(updated as u64, Ordering::Relaxed);
        self.offer_lines_created.fetch_add(lines as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_rows(&self, count: usize) {
        self.rows_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_succeeded: self.files_succeeded.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
            rows_dropped: self.rows_dropped.load(Ordering::Relaxed),
            products_created: self.products_created.load(Ordering::Relaxed),
            products_updated: self.products_updated.load(Ordering::Relaxed),
            offer_lines_created: self.offer_lines_created.load(Ordering::Relaxed),
        }
    }
}
