//! Fixed-capacity, insertion-ordered ring buffer.
//!
//! Holds the most recent items in arrival order. When full, the single
//! oldest item is evicted before the new one is appended (strict FIFO,
//! one-in-one-out). Created empty, lives for the process lifetime, never
//! persisted.

use std::collections::VecDeque;

/// A bounded FIFO buffer over `T`.
#[derive(Debug)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Creates an empty buffer. A zero capacity is clamped to one so the
    /// eviction invariant stays meaningful.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an item, evicting the oldest one first when at capacity.
    /// Amortized O(1).
    pub fn push(&mut self, item: T) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    /// The most recent `min(limit, len)` items in insertion order, most
    /// recent last. Clamps to the buffer's own length; callers are expected
    /// to bound `limit` to their own surface's range.
    pub fn tail(&self, limit: usize) -> Vec<T> {
        let take = limit.min(self.buf.len());
        self.buf
            .iter()
            .skip(self.buf.len() - take)
            .cloned()
            .collect()
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer holds no items.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The fixed capacity `N`.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
