// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Priority-ordered work queue for the task scheduler.
//!
//! Tasks are ordered by:
//! 1. **Priority** (higher = popped first)
//! 2. **Submission sequence** (lower = popped first, so equal priorities are FIFO)
//!
//! # Example
//! ```rust
//! use cubegraph::scheduler::PriorityWorkQueue;
//!
//! let mut queue = PriorityWorkQueue::new();
//! queue.push(0, "low");
//! queue.push(5, "first high");
//! queue.push(5, "second high");
//!
//! assert_eq!(queue.pop().map(|t| t.payload), Some("first high"));
//! assert_eq!(queue.pop().map(|t| t.payload), Some("second high"));
//! assert_eq!(queue.pop().map(|t| t.payload), Some("low"));
//! assert!(queue.is_empty());
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A queued unit of work together with its scheduling key.
#[derive(Debug)]
pub struct PrioritizedTask<T> {
    pub priority: usize,
    pub sequence: u64,
    pub payload: T,
}

impl<T> PrioritizedTask<T> {
    pub fn new(priority: usize, sequence: u64, payload: T) -> Self {
        Self {
            priority,
            sequence,
            payload,
        }
    }
}

impl<T> PartialEq for PrioritizedTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for PrioritizedTask<T> {}

impl<T> PartialOrd for PrioritizedTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PrioritizedTask<T> {
    /// `BinaryHeap` is a max-heap: the greatest task is popped first.
    /// An earlier sequence compares greater so ties pop in submission order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Max-priority queue with FIFO tie-breaking. Sequence numbers are assigned
/// on `push`, so callers never have to supply them.
#[derive(Debug)]
pub struct PriorityWorkQueue<T> {
    heap: BinaryHeap<PrioritizedTask<T>>,
    next_sequence: u64,
}

impl<T> PriorityWorkQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Enqueue `payload` and return the sequence number it was given.
    pub fn push(&mut self, priority: usize, payload: T) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap
            .push(PrioritizedTask::new(priority, sequence, payload));
        sequence
    }

    pub fn pop(&mut self) -> Option<PrioritizedTask<T>> {
        self.heap.pop()
    }

    pub fn peek_priority(&self) -> Option<usize> {
        self.heap.peek().map(|t| t.priority)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for PriorityWorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_priority_pops_first() {
        let mut queue = PriorityWorkQueue::new();
        queue.push(1, 'a');
        queue.push(9, 'b');
        queue.push(4, 'c');

        assert_eq!(queue.peek_priority(), Some(9));
        let order: Vec<char> = std::iter::from_fn(|| queue.pop().map(|t| t.payload)).collect();
        assert_eq!(order, vec!['b', 'c', 'a']);
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let mut queue = PriorityWorkQueue::new();
        for i in 0..32 {
            queue.push(3, i);
        }
        let order: Vec<i32> = std::iter::from_fn(|| queue.pop().map(|t| t.payload)).collect();
        assert_eq!(order, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_fifo_holds_across_interleaved_priorities() {
        let mut queue = PriorityWorkQueue::new();
        queue.push(2, "x1");
        queue.push(7, "y1");
        queue.push(2, "x2");
        queue.push(7, "y2");
        queue.push(2, "x3");

        let order: Vec<&str> = std::iter::from_fn(|| queue.pop().map(|t| t.payload)).collect();
        assert_eq!(order, vec!["y1", "y2", "x1", "x2", "x3"]);
    }

    #[test]
    fn test_sequence_numbers_are_monotonic() {
        let mut queue = PriorityWorkQueue::new();
        let a = queue.push(0, ());
        let b = queue.push(10, ());
        let c = queue.push(0, ());
        assert!(a < b && b < c);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_task_ordering() {
        let early = PrioritizedTask::new(5, 0, ());
        let late = PrioritizedTask::new(5, 1, ());
        let low = PrioritizedTask::new(1, 0, ());
        assert!(early > late);
        assert!(late > low);
    }
}
