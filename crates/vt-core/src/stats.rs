//! Counters for conditions the tracker recovers from.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters, shared by reference with the coordinator.
#[derive(Debug, Default)]
pub struct TrackerStats {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    duplicates_ignored: AtomicU64,
    malformed_timestamps: AtomicU64,
    persistence_failures: AtomicU64,
    notification_failures: AtomicU64,
}

/// A point-in-time copy of [`TrackerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub duplicates_ignored: u64,
    pub malformed_timestamps: u64,
    pub persistence_failures: u64,
    pub notification_failures: u64,
}

impl TrackerStats {
    pub(crate) fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn duplicate_ignored(&self) {
        self.duplicates_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn malformed_timestamp(&self) {
        self.malformed_timestamps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn notification_failure(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            duplicates_ignored: self.duplicates_ignored.load(Ordering::Relaxed),
            malformed_timestamps: self.malformed_timestamps.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
        }
    }
}
