//! Bounded buffer of live traffic entries

use chissl_common::TrafficEvent;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Default number of live entries to retain
pub const DEFAULT_LIVE_CAPACITY: usize = 500;

/// A live event together with its rendered text
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEntry {
    pub received_at: DateTime<Utc>,
    pub event: TrafficEvent,
    pub rendered: String,
}

/// Ring of the most recent live entries, oldest evicted first
#[derive(Debug)]
pub struct LiveBuffer {
    entries: VecDeque<LiveEntry>,
    capacity: usize,
    evicted: u64,
}

impl LiveBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append an entry, evicting the oldest if at capacity
    pub fn push(&mut self, entry: LiveEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
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

    /// Total entries dropped to stay within capacity
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveEntry> {
        self.entries.iter()
    }

    /// Copy of the retained entries, oldest first
    pub fn snapshot(&self) -> Vec<LiveEntry> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for LiveBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LIVE_CAPACITY)
    }
}
