//! Bounded MPMC queue over a fixed ring of stamped slots.
//!
//! Each slot carries a stamp that encodes which lap of the ring it belongs
//! to; producers and consumers claim slots by CAS on the padded head/tail
//! cursors and then synchronize hand-off through the stamp alone. Head and
//! tail never share a cache line.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use crossbeam_utils::Backoff;
use petek::{AtomicCell, Ordering, Padded};

use crate::PushError;

struct Slot<T> {
    /// Lap stamp: equals the index a producer may write at, index + 1 once
    /// the value is in place.
    stamp: AtomicCell<usize>,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded multi-producer multi-consumer queue.
pub struct ArrayQueue<T> {
    head: Padded<AtomicCell<usize>>,
    tail: Padded<AtomicCell<usize>>,
    buffer: Box<[Slot<T>]>,
    mask: usize,
}

unsafe impl<T: Send> Send for ArrayQueue<T> {}
unsafe impl<T: Send> Sync for ArrayQueue<T> {}

impl<T> ArrayQueue<T> {
    /// Creates a queue holding at least `cap` elements.
    ///
    /// The capacity is rounded up to the next power of two.
    pub fn new(cap: usize) -> ArrayQueue<T> {
        let capacity = if cap < 1 { 1 } else { cap.next_power_of_two() };
        let mut buffer = Vec::with_capacity(capacity);

        for i in 0..capacity {
            buffer.push(Slot {
                stamp: AtomicCell::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            });
        }

        ArrayQueue {
            buffer: buffer.into_boxed_slice(),
            mask: capacity - 1,
            head: Padded::new(AtomicCell::new(0)),
            tail: Padded::new(AtomicCell::new(0)),
        }
    }

    /// Pushes an element into the queue.
    ///
    /// A full queue is reported through [`PushError`], which hands the
    /// value back to the caller.
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        let backoff = Backoff::new();
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            let slot = &self.buffer[tail & self.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if stamp == tail {
                // Slot is free for this lap; claim the index.
                if self
                    .tail
                    .compare_exchange(tail, tail + 1, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    unsafe {
                        slot.value.get().write(MaybeUninit::new(value));
                    }
                    slot.stamp.store(tail + 1, Ordering::Release);
                    return Ok(());
                }
            } else if stamp < tail + 1 {
                // One full lap behind: the consumer has not vacated it yet.
                let head = self.head.load(Ordering::Relaxed);
                if tail >= head + self.buffer.len() {
                    return Err(PushError(value));
                }
                backoff.snooze();
            } else {
                backoff.snooze();
            }
            tail = self.tail.load(Ordering::Relaxed);
        }
    }

    /// Pops an element from the queue, or `None` if it is empty.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);

        loop {
            let slot = &self.buffer[head & self.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if stamp == head + 1 {
                // Slot holds a value from this lap; claim the index.
                if self
                    .head
                    .compare_exchange(head, head + 1, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    let value = unsafe { slot.value.get().read().assume_init() };
                    // Release the slot for the producer one lap ahead.
                    slot.stamp
                        .store(head + self.buffer.len(), Ordering::Release);
                    return Some(value);
                }
            } else if stamp == head {
                let tail = self.tail.load(Ordering::Relaxed);
                if tail == head {
                    return None;
                }
                backoff.snooze();
            } else {
                backoff.snooze();
            }
            head = self.head.load(Ordering::Relaxed);
        }
    }

    /// Returns the capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::SeqCst);
        head == tail
    }

    /// Returns `true` if the queue is full.
    pub fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::SeqCst);
        tail == head + self.buffer.len()
    }
}

impl<T> Drop for ArrayQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: drop every value still sitting in the ring.
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);

        let mut index = head;
        while index != tail {
            let slot = &mut self.buffer[index & self.mask];
            unsafe {
                slot.value.get_mut().assume_init_drop();
            }
            index = index.wrapping_add(1);
        }
    }
}
