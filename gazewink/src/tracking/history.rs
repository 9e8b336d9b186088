//! Bounded record of recent open/close instants, newest first.

use std::collections::VecDeque;
use tracing::warn;

/// Capacity needed for the "most recent" and "second most recent" lookups.
pub const DEFAULT_CAPACITY: usize = 2;

/// Fixed-capacity history of timestamps (milliseconds).  Index 0 is the most
/// recent entry; pushing beyond capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct TimestampHistory {
    entries: VecDeque<f64>,
    capacity: usize,
}

impl Default for TimestampHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TimestampHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Record a new instant as the most recent entry.
    pub fn push(&mut self, t_ms: f64) {
        let t_ms = match self.entries.front() {
            Some(&latest) if t_ms < latest => {
                warn!(
                    "Timestamp went backwards ({:.1}ms < {:.1}ms), clamping",
                    t_ms, latest
                );
                latest
            }
            _ => t_ms,
        };
        self.entries.push_front(t_ms);
        if self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// The k-th most recent entry (0 = most recent), if recorded.
    pub fn get(&self, k: usize) -> Option<f64> {
        self.entries.get(k).copied()
    }

    pub fn latest(&self) -> Option<f64> {
        self.get(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
