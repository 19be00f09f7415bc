//! Unbounded MPMC FIFO (Michael-Scott).
//!
//! A singly linked list with one sentinel node at the front. `head` always
//! points at the sentinel (a node whose payload is already consumed);
//! `tail` points at the last node or its predecessor. Every link is a
//! [`VersionedRef`] so a compare-and-swap against a recycled address cannot
//! falsely succeed, and `head`/`tail` each own a cache line.
//!
//! The queue is empty iff `head == tail` and `head.next` is null. A tail
//! that lags behind a freshly linked node is advanced by whichever thread
//! notices ("helping"), so some thread always makes progress.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;

use crossbeam_utils::Backoff;
use petek::{pin, retire, Ordering, Padded, VersionedRef};

struct Node<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    next: VersionedRef<*mut Node<T>>,
}

impl<T> Node<T> {
    fn new(value: T) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            value: UnsafeCell::new(MaybeUninit::new(value)),
            next: VersionedRef::new(ptr::null_mut()),
        }))
    }

    fn sentinel() -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: VersionedRef::new(ptr::null_mut()),
        }))
    }
}

/// An unbounded multi-producer multi-consumer FIFO queue.
///
/// `push` and `pop` are lock-free and linearizable: the set of popped
/// values, in pop order, is always consistent with some interleaving of
/// the pushes, with no loss and no duplication.
pub struct MsQueue<T> {
    head: Padded<VersionedRef<*mut Node<T>>>,
    tail: Padded<VersionedRef<*mut Node<T>>>,
}

unsafe impl<T: Send> Send for MsQueue<T> {}
unsafe impl<T: Send> Sync for MsQueue<T> {}

impl<T: 'static> Default for MsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> MsQueue<T> {
    /// Creates a new empty queue.
    ///
    /// Head and tail start out pointing at one shared sentinel node.
    pub fn new() -> MsQueue<T> {
        let sentinel = Node::<T>::sentinel();
        MsQueue {
            head: Padded::new(VersionedRef::new(sentinel)),
            tail: Padded::new(VersionedRef::new(sentinel)),
        }
    }

    /// Pushes an element onto the back of the queue.
    ///
    /// Never blocks. Allocates one node; allocation failure aborts via the
    /// global allocator's OOM handler rather than being retried.
    pub fn push(&self, value: T) {
        let node = Node::new(value);
        let backoff = Backoff::new();
        let guard = pin();

        loop {
            let (tail, tail_ver) = self.tail.load(Ordering::Acquire);
            // SAFETY: tail is reachable and the guard keeps it alive.
            let tail_ref = unsafe { &*tail };
            let (next, next_ver) = tail_ref.next.load(Ordering::Acquire);

            if next.is_null() {
                // Tail is the real last node; link the new one in. Release
                // publishes the node's payload to consumers.
                if tail_ref
                    .next
                    .try_update(ptr::null_mut(), next_ver, node, Ordering::Release)
                {
                    // Best-effort tail bump; a failure means someone helped.
                    let _ = self.tail.try_update(tail, tail_ver, node, Ordering::Release);
                    break;
                }
            } else {
                // Another producer linked a node but has not advanced the
                // tail yet; help it along and retry.
                let _ = self.tail.try_update(tail, tail_ver, next, Ordering::Release);
            }
            backoff.spin();
        }

        drop(guard);
    }

    /// Pops the element at the front of the queue.
    ///
    /// Returns `None` when the queue is empty; that is a normal result,
    /// not an error, and repeated pops on an empty queue are idempotent.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let guard = pin();

        loop {
            let (head, head_ver) = self.head.load(Ordering::Acquire);
            let (tail, tail_ver) = self.tail.load(Ordering::Acquire);
            // SAFETY: head is the current sentinel; the guard keeps it and
            // its successor alive even if another thread unlinks them.
            let head_ref = unsafe { &*head };
            let (next, _) = head_ref.next.load(Ordering::Acquire);

            if head == tail {
                if next.is_null() {
                    return None;
                }
                // Tail fell behind the linked node; help advance it.
                let _ = self.tail.try_update(tail, tail_ver, next, Ordering::Release);
            } else {
                if next.is_null() {
                    // Stale snapshot: head moved between our two loads.
                    continue;
                }
                // Copy the payload out before the CAS; only the CAS winner
                // materializes it, so a failed attempt duplicates nothing.
                let value = unsafe { (*next).value.get().read() };
                if self.head.try_update(head, head_ver, next, Ordering::AcqRel) {
                    // The old sentinel is unlinked; free it once no pinned
                    // thread can still be reading its next link.
                    unsafe { retire(head) };
                    return Some(unsafe { value.assume_init() });
                }
            }
            backoff.spin();
        }
    }

    /// Returns `true` if the queue has no elements.
    ///
    /// The answer is a snapshot; concurrent pushes and pops may invalidate
    /// it immediately.
    pub fn is_empty(&self) -> bool {
        let _guard = pin();
        let (head, _) = self.head.load(Ordering::Acquire);
        let (tail, _) = self.tail.load(Ordering::Acquire);
        // SAFETY: guard keeps the sentinel alive.
        let (next, _) = unsafe { &*head }.next.load(Ordering::Acquire);
        head == tail && next.is_null()
    }
}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: walk the chain, dropping the payloads of the
        // nodes after the sentinel. Sentinels already retired are handled
        // by the reclamation system.
        let (sentinel, _) = self.head.load(Ordering::Relaxed);
        unsafe {
            let (mut current, _) = (*sentinel).next.load(Ordering::Relaxed);
            drop(Box::from_raw(sentinel));

            while !current.is_null() {
                let mut node = Box::from_raw(current);
                let (next, _) = node.next.load(Ordering::Relaxed);
                node.value.get_mut().assume_init_drop();
                drop(node);
                current = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_layout_is_padded() {
        let link_size = std::mem::size_of::<Padded<VersionedRef<*mut Node<u64>>>>();
        assert_eq!(link_size % 64, 0);
    }

    #[test]
    fn fifo_order() {
        let q = MsQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }
}
