//! Guard-based critical sections and deferred reclamation.
//!
//! A thread calls [`pin`] before touching a lock-free structure; while the
//! returned [`Guard`] lives, no node unlinked by another thread is freed
//! out from under it. Unlinked nodes are handed to [`retire`], batched
//! per-thread, and destroyed once the global epoch has moved two steps past
//! their retirement epoch.

use crate::epoch::{global, Deferred};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::sync::atomic::Ordering;

/// Collect after this many retires accumulate in the local batch
const RETIRE_FREQ: usize = 64;

/// RAII guard representing an active critical section.
///
/// While a `Guard` exists the thread's epoch slot is marked active, so
/// pointers loaded from lock-free structures stay valid. Guards nest; the
/// slot is released when the outermost one drops.
pub struct Guard {
    handle: *const Handle,
}

impl Drop for Guard {
    fn drop(&mut self) {
        // SAFETY: the handle lives in TLS of this thread and outlives any
        // stack-scoped guard created from it.
        unsafe { (*self.handle).unpin() }
    }
}

/// Thread-local state: epoch slot ownership and the retire batch.
struct Handle {
    tid: usize,
    depth: Cell<usize>,
    bag: RefCell<Vec<Deferred>>,
}

impl Handle {
    fn new() -> Self {
        Self {
            tid: global().alloc_tid(),
            depth: Cell::new(0),
            bag: RefCell::new(Vec::with_capacity(RETIRE_FREQ)),
        }
    }

    fn pin(&self) -> Guard {
        let depth = self.depth.get();
        if depth == 0 {
            let state = global();
            let slot = state.slot(self.tid);
            loop {
                let epoch = state.epoch_seqcst();
                slot.store((epoch << 1) | 1, Ordering::SeqCst);
                // The slot word must be visible before the epoch we recorded
                // is trusted; republish if the epoch moved meanwhile.
                if state.epoch_seqcst() == epoch {
                    break;
                }
            }
        }
        self.depth.set(depth + 1);
        Guard { handle: self }
    }

    fn unpin(&self) {
        let depth = self.depth.get() - 1;
        self.depth.set(depth);
        if depth == 0 {
            global().slot(self.tid).store(0, Ordering::Release);
        }
    }

    fn retire(&self, deferred: Deferred) {
        let mut bag = self.bag.borrow_mut();
        bag.push(deferred);
        if bag.len() >= RETIRE_FREQ {
            drop(bag);
            self.collect();
        }
    }

    /// Try to advance the epoch and free everything old enough.
    fn collect(&self) {
        let state = global();
        // Take the bag so no borrow is held while destructors run; a
        // destructor is allowed to retire further nodes.
        let mut bag = core::mem::take(&mut *self.bag.borrow_mut());
        state.adopt_orphans(&mut bag);
        let epoch = state.try_advance();

        let mut i = 0;
        while i < bag.len() {
            // Two whole epochs passed: no pinned thread can reach it.
            if bag[i].epoch + 2 <= epoch {
                let deferred = bag.swap_remove(i);
                // SAFETY: entry is unreachable per the epoch rule and is
                // removed from the bag, so it executes exactly once.
                unsafe { deferred.execute() };
            } else {
                i += 1;
            }
        }

        self.bag.borrow_mut().append(&mut bag);
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let state = global();
        let bag = core::mem::take(&mut *self.bag.borrow_mut());
        if !bag.is_empty() {
            state.orphan(bag);
        }
        state.free_tid(self.tid);
    }
}

std::thread_local! {
    static HANDLE: Handle = Handle::new();
}

/// Enter a critical section.
///
/// Pointers loaded from lock-free structures while the returned [`Guard`]
/// is alive will not be freed by concurrent [`retire`] calls.
///
/// # Examples
///
/// ```rust
/// let guard = petek::pin();
/// // traverse lock-free structures
/// drop(guard);
/// ```
#[inline]
pub fn pin() -> Guard {
    HANDLE.with(|h| h.pin())
}

/// Hand an unlinked node to the reclamation system.
///
/// The allocation is destroyed via `Box::from_raw` once no pinned thread
/// can still reach it.
///
/// # Safety
///
/// `ptr` must come from `Box::into_raw`, must already be unreachable from
/// the shared structure, and must not be retired twice or accessed after
/// this call.
#[inline]
pub unsafe fn retire<T: 'static>(ptr: *mut T) {
    unsafe fn drop_box<T>(ptr: *mut u8) {
        // SAFETY: called once, with the pointer this destructor was
        // created for.
        unsafe { drop(Box::from_raw(ptr as *mut T)) }
    }
    let deferred = Deferred {
        ptr: ptr as *mut u8,
        drop_fn: drop_box::<T>,
        epoch: global().epoch(),
    };
    HANDLE.with(|h| h.retire(deferred));
}
