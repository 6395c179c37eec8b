//! Engine counters
//!
//! Relaxed atomics bumped once per event; [`StatsSnapshot`] is what the pump logs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the event path without taking the table lock
#[derive(Debug, Default)]
pub struct EngineStats {
    events: AtomicU64,
    matched: AtomicU64,
    fired: AtomicU64,
    rate_limited: AtomicU64,
    dispatched: AtomicU64,
    failed: AtomicU64,
    dropped_write_backs: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub events: u64,
    pub matched: u64,
    pub fired: u64,
    pub rate_limited: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub dropped_write_backs: u64,
}

impl EngineStats {
    pub(crate) fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, outcome: &super::engine::EventOutcome) {
        self.matched.fetch_add(outcome.matched as u64, Ordering::Relaxed);
        self.fired.fetch_add(outcome.fired as u64, Ordering::Relaxed);
        self.rate_limited
            .fetch_add(outcome.rate_limited as u64, Ordering::Relaxed);
        self.dispatched
            .fetch_add(outcome.dispatched as u64, Ordering::Relaxed);
        self.failed.fetch_add(outcome.failed as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_write_backs(&self, count: usize) {
        self.dropped_write_backs
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            fired: self.fired.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped_write_backs: self.dropped_write_backs.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events, {} matched, {} fired, {} rate limited, {} dispatched, {} failed, {} stale write-backs",
            self.events,
            self.matched,
            self.fired,
            self.rate_limited,
            self.dispatched,
            self.failed,
            self.dropped_write_backs
        )
    }
}
