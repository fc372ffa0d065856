//! Fixed-capacity history with explicit eviction.

use std::collections::VecDeque;

/// Keeps the most recent `capacity` items; pushing onto a full buffer evicts
/// and returns the oldest.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.evicted += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of items evicted so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut buf = RingBuffer::new(3);
        assert_eq!(buf.push(1), None);
        buf.push(2);
        buf.push(3);
        assert_eq!(buf.push(4), Some(1));
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(buf.latest(), Some(&4));
        assert_eq!(buf.evicted(), 1);
        assert_eq!(buf.len(), buf.capacity());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buf = RingBuffer::new(0);
        buf.push('a');
        buf.push('b');
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.latest(), Some(&'b'));
    }
}
