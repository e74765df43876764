use std::collections::VecDeque;
use std::time::Duration;

/// Streaming counters for instrumentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub ticks: u64,
    pub keep_set_changes: u64,
    pub total_enqueued: u64,
    pub total_accepted: u64,
    pub total_evicted: u64,
    /// Requests the worker skipped or failed.
    pub total_dropped: u64,
    /// Bundles discarded at accept time (duplicate or out of range).
    pub total_rejected: u64,
    pub resident_blocks: usize,
    pub pending_blocks: usize,
    pub last_tick_time: Duration,
}

/// Rolling window of tick durations.
#[derive(Debug, Clone)]
pub struct TickTimer {
    history: VecDeque<Duration>,
    capacity: usize,
}

impl TickTimer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "tick timer capacity must be positive");
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(dt);
    }

    pub fn average(&self) -> Duration {
        if self.history.is_empty() {
            return Duration::ZERO;
        }
        self.history.iter().sum::<Duration>() / self.history.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.history.iter().copied().max().unwrap_or(Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.history.iter().copied().min().unwrap_or(Duration::ZERO)
    }

    pub fn count(&self) -> usize {
        self.history.len()
    }
}
