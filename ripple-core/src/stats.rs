//! Shared send/receive counters. Each field is a single machine word;
//! each owning thread writes its own counters, readers (the monitor)
//! accept torn reads for reporting purposes (spec.md §5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Default)]
pub struct Stats {
    pub offered: AtomicU64,
    pub sent: AtomicU64,
    pub send_failures: AtomicU64,
    pub packets_received: AtomicU64,
    pub validation_failed: AtomicU64,
    pub duplicates: AtomicU64,
    pub filtered: AtomicU64,
    pub successes: AtomicU64,
    pub app_successes: AtomicU64,

    /// Nanoseconds since `start`, 0 meaning "not yet set".
    first_response_nanos: AtomicU64,
    last_response_nanos: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_response_time(&self, start: Instant) {
        let elapsed = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        self.first_response_nanos
            .compare_exchange(0, elapsed.max(1), Ordering::Relaxed, Ordering::Relaxed)
            .ok();
        self.last_response_nanos.store(elapsed.max(1), Ordering::Relaxed);
    }

    pub fn first_response_nanos(&self) -> Option<u64> {
        match self.first_response_nanos.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    pub fn last_response_nanos(&self) -> Option<u64> {
        match self.last_response_nanos.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    pub fn hit_rate(&self) -> f64 {
        let sent = self.sent.load(Ordering::Relaxed);
        if sent == 0 {
            return 0.0;
        }
        self.successes.load(Ordering::Relaxed) as f64 / sent as f64
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub offered: u64,
    pub sent: u64,
    pub send_failures: u64,
    pub packets_received: u64,
    pub validation_failed: u64,
    pub duplicates: u64,
    pub filtered: u64,
    pub successes: u64,
    pub app_successes: u64,
}

impl From<&Stats> for StatsSnapshot {
    fn from(s: &Stats) -> Self {
        Self {
            offered: s.offered.load(Ordering::Relaxed),
            sent: s.sent.load(Ordering::Relaxed),
            send_failures: s.send_failures.load(Ordering::Relaxed),
            packets_received: s.packets_received.load(Ordering::Relaxed),
            validation_failed: s.validation_failed.load(Ordering::Relaxed),
            duplicates: s.duplicates.load(Ordering::Relaxed),
            filtered: s.filtered.load(Ordering::Relaxed),
            successes: s.successes.load(Ordering::Relaxed),
            app_successes: s.app_successes.load(Ordering::Relaxed),
        }
    }
}
