use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of the store's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Bucket files successfully committed to disk
    pub bucket_writes: u64,
    /// Bucket writes that failed and left the bucket dirty
    pub write_failures: u64,
    /// Buckets replaced from disk after an external edit
    pub reloads: u64,
    /// Keys whose unflushed value was overridden by an external edit
    pub conflicts: u64,
    /// Bucket files that could not be decoded
    pub parse_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    bucket_writes: AtomicU64,
    write_failures: AtomicU64,
    reloads: AtomicU64,
    conflicts: AtomicU64,
    parse_failures: AtomicU64,
}

impl StatCounters {
    pub(crate) fn record_write(&self) {
        self.bucket_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflicts(&self, count: usize) {
        self.conflicts.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StoreStats {
        StoreStats {
            bucket_writes: self.bucket_writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
        }
    }
}
