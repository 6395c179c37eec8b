//! Per-rule cooldown gate

use std::time::{Duration, Instant};

/// Rate limiter for a single rule
///
/// Built from a rule snapshot, consulted once per firing, and only advanced
/// when the dispatch actually succeeded.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    /// Minimum gap between two dispatches, zero disables the gate
    pub min_interval: Duration,

    /// Time of the last successful dispatch
    pub last_event_time: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval_ms: u32, last_event_time: Option<Instant>) -> Self {
        Self {
            min_interval: Duration::from_millis(min_interval_ms as u64),
            last_event_time,
        }
    }

    /// Whether a dispatch at `now` is allowed
    pub fn should_process(&self, now: Instant) -> bool {
        if self.min_interval.is_zero() {
            return true;
        }
        match self.last_event_time {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        }
    }

    /// Records a successful dispatch
    pub fn record(&mut self, now: Instant) {
        self.last_event_time = Some(now);
    }
}
