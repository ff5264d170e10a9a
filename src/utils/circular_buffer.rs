//! Fixed-Capacity Ring Buffer
//!
//! Holds the most recent `N` samples (deltas, timestamps, latencies) without
//! allocating after construction. Pushing into a full buffer overwrites the
//! oldest sample.

/// Ring buffer of the `N` most recent values
#[derive(Debug, Clone)]
pub struct CircularBuffer<T: Copy + Default, const N: usize> {
    items: [T; N],
    /// Index of the oldest element
    head: usize,
    len: usize,
}

impl<T: Copy + Default, const N: usize> CircularBuffer<T, N> {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            items: [T::default(); N],
            head: 0,
            len: 0,
        }
    }

    /// Append a value, overwriting the oldest one when full
    pub fn push(&mut self, value: T) {
        if N == 0 {
            return;
        }
        if self.len < N {
            let idx = (self.head + self.len) % N;
            self.items[idx] = value;
            self.len += 1;
        } else {
            self.items[self.head] = value;
            self.head = (self.head + 1) % N;
        }
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no values are stored
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the next push overwrites
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Fixed capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop all values
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Value at logical position `index` (0 = oldest)
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }
        Some(self.items[(self.head + index) % N])
    }

    /// Oldest stored value
    pub fn oldest(&self) -> Option<T> {
        self.get(0)
    }

    /// Most recently pushed value
    pub fn newest(&self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            self.get(self.len - 1)
        }
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.items[(self.head + i) % N])
    }
}

impl<T: Copy + Default, const N: usize> Default for CircularBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
