// Pre-roll history buffers
// Fixed-capacity ring that keeps the most recent elements so a recording can
// start with the moments leading up to the trigger

use std::iter::Chain;
use std::slice::Iter;

/// Number of frames kept for pre-roll (about 2 seconds at 30 fps)
pub const PREVIOUS_FRAMES: usize = 2 * 32;

/// Circular buffer with a fixed number of slots.
///
/// `total` counts every add ever made; the k-th add lands in slot `k % capacity`.
/// Slots are allocated once and overwritten in place, so large elements such
/// as frames keep their allocations for the lifetime of the run.
pub struct RingBuffer<T> {
    elements: Vec<T>,
    total: u64,
}

impl<T: Default> RingBuffer<T> {
    /// Create a buffer with `capacity` default-initialized slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let mut elements = Vec::with_capacity(capacity.max(1));
        elements.resize_with(capacity.max(1), T::default);
        Self { elements, total: 0 }
    }
}

impl<T> RingBuffer<T> {
    pub fn capacity(&self) -> usize {
        self.elements.len()
    }

    /// Number of elements ever added
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of slots currently holding a live element
    pub fn len(&self) -> usize {
        self.total.min(self.capacity() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Claim the next slot and return it for in-place population.
    ///
    /// The slot still holds whatever was written there a full lap ago.
    pub fn add(&mut self) -> &mut T {
        let slot = self.slot(self.total);
        self.total += 1;
        &mut self.elements[slot]
    }

    /// Move a value into the next slot
    pub fn push(&mut self, value: T) {
        *self.add() = value;
    }

    /// The logically oldest surviving element
    pub fn oldest(&self) -> Option<&T> {
        if self.total == 0 {
            None
        } else if self.total < self.capacity() as u64 {
            Some(&self.elements[0])
        } else {
            // next write position holds the oldest element
            Some(&self.elements[self.slot(self.total)])
        }
    }

    /// The most recently added element
    pub fn newest(&self) -> Option<&T> {
        if self.total == 0 {
            None
        } else {
            Some(&self.elements[self.slot(self.total - 1)])
        }
    }

    /// Iterate surviving elements oldest to newest.
    ///
    /// The iterator borrows the buffer, so it can be recreated at will and
    /// always yields `len()` elements.
    pub fn iter(&self) -> Chain<Iter<'_, T>, Iter<'_, T>> {
        if self.total >= self.capacity() as u64 {
            let split = self.slot(self.total);
            self.elements[split..].iter().chain(self.elements[..split].iter())
        } else {
            let filled = self.total as usize;
            self.elements[..filled].iter().chain(self.elements[..0].iter())
        }
    }

    fn slot(&self, index: u64) -> usize {
        (index % self.capacity() as u64) as usize
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = Chain<Iter<'a, T>, Iter<'a, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
