//! Bounded spin history. Oldest results are evicted first.

use crate::engine::SpinResult;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct SpinHistory {
    capacity: usize,
    entries:  VecDeque<SpinResult>,
}

impl SpinHistory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, result: SpinResult) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
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

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SpinResult> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&SpinResult> {
        self.entries.back()
    }

    pub fn to_vec(&self) -> Vec<SpinResult> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
