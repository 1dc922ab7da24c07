//! Snapshot-based undo.
//!
//! Undo never replays inverse operations. Every mutating transmission
//! pushes the full encoded state from before it ran, and undoing restores
//! those bytes.

use std::collections::VecDeque;

use tracing::debug;

/// Encoded state from before one transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoRecord {
    /// Transmission that followed this state.
    pub transmission: i32,
    pub detail: Vec<u8>,
    pub summary: Vec<u8>,
}

/// Bounded stack of undo records; the oldest are evicted first.
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    max_depth: usize,
    records: VecDeque<UndoRecord>,
}

impl UndoStack {
    /// A depth of 0 disables undo.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            records: VecDeque::with_capacity(max_depth.min(64)),
        }
    }

    pub fn push(&mut self, record: UndoRecord) {
        if self.max_depth == 0 {
            return;
        }
        while self.records.len() >= self.max_depth {
            if let Some(evicted) = self.records.pop_front() {
                debug!(transmission = evicted.transmission, "undo record evicted");
            }
        }
        self.records.push_back(record);
    }

    pub fn pop(&mut self) -> Option<UndoRecord> {
        self.records.pop_back()
    }

    pub fn peek(&self) -> Option<&UndoRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(transmission: i32) -> UndoRecord {
        UndoRecord {
            transmission,
            detail: vec![transmission as u8],
            summary: Vec::new(),
        }
    }

    #[test]
    fn test_lifo() {
        let mut stack = UndoStack::new(5);
        stack.push(record(1));
        stack.push(record(2));
        assert_eq!(stack.peek().map(|r| r.transmission), Some(2));
        assert_eq!(stack.pop().map(|r| r.transmission), Some(2));
        assert_eq!(stack.pop().map(|r| r.transmission), Some(1));
        assert!(stack.pop().is_none());
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut stack = UndoStack::new(2);
        for t in 1..=4 {
            stack.push(record(t));
        }
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop().map(|r| r.transmission), Some(4));
        assert_eq!(stack.pop().map(|r| r.transmission), Some(3));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_zero_depth_disables() {
        let mut stack = UndoStack::new(0);
        stack.push(record(1));
        assert!(stack.is_empty());
        assert_eq!(stack.max_depth(), 0);
    }
}
