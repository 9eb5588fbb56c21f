//! Fixed-capacity, insertion-ordered history of readings for one source.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::models::Reading;

// ---

/// FIFO buffer of the most recent readings. Capacity is set at construction
/// and never changes; appending at capacity evicts the oldest entry.
#[derive(Debug)]
pub struct HistoryBuffer {
    // ---
    entries: VecDeque<Arc<Reading>>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        // ---
        HistoryBuffer {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest entry when at capacity. A
    /// capacity-0 buffer retains nothing.
    pub fn push(&mut self, reading: Arc<Reading>) {
        // ---
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(reading);
    }

    /// Most recent reading, if any.
    pub fn latest(&self) -> Option<&Arc<Reading>> {
        // ---
        self.entries.back()
    }

    /// Up to the last `n` readings in insertion order (oldest first), fewer
    /// if the buffer holds fewer.
    pub fn recent(&self, n: usize) -> Vec<Arc<Reading>> {
        // ---
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
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
}
