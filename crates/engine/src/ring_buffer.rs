//! Bounded single-producer-single-consumer ring buffer for entry/exit signals (spec §5,
//! §9 "Lock-free ring buffer for signals" design note).
//!
//! The primary signal hand-off is the synchronous callback invoked from the engine thread;
//! this queue is the overflow-safe secondary path for a polling consumer. Head/tail counters
//! are cache-line padded (`crossbeam_utils::CachePadded`) to avoid false sharing between the
//! producer and consumer, the way the teacher pads hot counters elsewhere via `crossbeam`.

use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A bounded SPSC queue of capacity `N` (must be a power of two is not required; index
/// arithmetic uses modulo). One producer calls `push`, one consumer calls `pop`.
pub struct SpscRing<T> {
    buffer: Box<[UnsafeCell<Option<T>>]>,
    capacity: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// Safety: access is disciplined to a single producer (push) and single consumer (pop) per
// the type's contract; the head/tail atomics establish the happens-before edges that make
// the UnsafeCell accesses non-overlapping.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    pub fn new(capacity: usize) -> Self {
        let mut buffer = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            buffer.push(UnsafeCell::new(None));
        }
        Self {
            buffer: buffer.into_boxed_slice(),
            capacity,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Pushes `item`, overwriting the oldest unread entry if the queue is full (the queue is
    /// a best-effort overflow path; the engine's synchronous callback is authoritative).
    /// Returns false if an item was dropped to make room.
    pub fn push(&self, item: T) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let next_tail = (tail + 1) % self.capacity;
        let full = next_tail == head;
        if full {
            // Drop oldest to make room.
            let new_head = (head + 1) % self.capacity;
            self.head.store(new_head, Ordering::Release);
        }
        unsafe {
            *self.buffer[tail].get() = Some(item);
        }
        self.tail.store(next_tail, Ordering::Release);
        !full
    }

    /// Pops the oldest item, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let item = unsafe { (*self.buffer[head].get()).take() };
        let next_head = (head + 1) % self.capacity;
        self.head.store(next_head, Ordering::Release);
        item
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_fifo_order() {
        let ring: SpscRing<i32> = SpscRing::new(4);
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn full_queue_drops_oldest() {
        let ring: SpscRing<i32> = SpscRing::new(3);
        assert!(ring.push(1));
        assert!(ring.push(2));
        // capacity 3 holds 2 live items (one slot reserved to distinguish full/empty)
        assert!(!ring.push(3));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
    }

    #[test]
    fn empty_after_draining() {
        let ring: SpscRing<i32> = SpscRing::new(4);
        ring.push(1);
        ring.pop();
        assert!(ring.is_empty());
    }
}
