//! Global epoch state.
//!
//! A fixed table of per-thread slots plus a global epoch counter. Each slot
//! packs `(epoch << 1) | active` into one `AtomicU64`; zero means the slot
//! is free. The global epoch may only advance when every active slot has
//! observed the current value, which is what makes the two-epoch freeing
//! rule in [`crate::guard`] sound.

use crate::padded::Padded;
use crate::spin::SpinLock;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use once_cell::race::OnceBox;

/// Maximum number of live threads supported
pub(crate) const MAX_THREADS: usize = 256;

/// A node handed to the reclamation system, with its type-erased destructor
/// and the epoch it was retired in.
pub(crate) struct Deferred {
    pub(crate) ptr: *mut u8,
    pub(crate) drop_fn: unsafe fn(*mut u8),
    pub(crate) epoch: u64,
}

// SAFETY: Deferred carries a raw pointer to an unlinked allocation; the
// epoch protocol guarantees exclusive access by the time it executes.
unsafe impl Send for Deferred {}

impl Deferred {
    /// Run the destructor.
    ///
    /// # Safety
    ///
    /// Must be called at most once, after no thread can reach `ptr`.
    #[inline]
    pub(crate) unsafe fn execute(self) {
        // SAFETY: forwarded to the caller
        unsafe { (self.drop_fn)(self.ptr) }
    }
}

/// Global reclamation state
pub(crate) struct EpochState {
    /// Global epoch counter (starts at 1)
    global: Padded<AtomicU64>,
    /// Per-thread epoch slots, one cache line each
    slots: &'static [Padded<AtomicU64>],
    /// Thread ID allocator (next unused ID)
    next_tid: AtomicUsize,
    /// Recycled thread IDs
    free_tids: SpinLock<Vec<usize>>,
    /// Garbage left behind by exited threads
    orphans: SpinLock<Vec<Deferred>>,
}

impl EpochState {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_THREADS);
        for _ in 0..MAX_THREADS {
            slots.push(Padded::new(AtomicU64::new(0)));
        }
        Self {
            global: Padded::new(AtomicU64::new(1)),
            slots: Box::leak(slots.into_boxed_slice()),
            next_tid: AtomicUsize::new(0),
            free_tids: SpinLock::new(Vec::new()),
            orphans: SpinLock::new(Vec::new()),
        }
    }

    /// Current global epoch.
    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.global.load(Ordering::Acquire)
    }

    /// Current global epoch, sequentially consistent. Used when publishing
    /// a slot word must be ordered against the re-read.
    #[inline]
    pub(crate) fn epoch_seqcst(&self) -> u64 {
        self.global.load(Ordering::SeqCst)
    }

    /// Epoch slot for a thread ID.
    #[inline]
    pub(crate) fn slot(&self, tid: usize) -> &AtomicU64 {
        &self.slots[tid]
    }

    /// Advance the global epoch if every active thread has observed it.
    ///
    /// Returns the epoch after the attempt, advanced or not.
    pub(crate) fn try_advance(&self) -> u64 {
        // The scan must be ordered against slot publication in `pin`; the
        // slot stores are SeqCst, and without joining that total order here
        // a weakly-ordered machine may miss a freshly pinned thread twice
        // and advance past its epoch.
        core::sync::atomic::fence(Ordering::SeqCst);
        let epoch = self.epoch();
        for slot in self.slots.iter() {
            let word = slot.load(Ordering::Acquire);
            if word & 1 == 1 && (word >> 1) != epoch {
                // A pinned thread is still in an older epoch.
                return epoch;
            }
        }
        let _ = self
            .global
            .compare_exchange(epoch, epoch + 1, Ordering::AcqRel, Ordering::Relaxed);
        self.epoch()
    }

    /// Allocate a thread ID, recycling exited ones first.
    pub(crate) fn alloc_tid(&self) -> usize {
        {
            let mut free = self.free_tids.lock();
            if let Some(tid) = free.pop() {
                return tid;
            }
        }
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        assert!(
            tid < MAX_THREADS,
            "petek: exceeded maximum thread count ({MAX_THREADS})"
        );
        tid
    }

    /// Release a thread ID for recycling.
    pub(crate) fn free_tid(&self, tid: usize) {
        self.slots[tid].store(0, Ordering::Release);
        self.free_tids.lock().push(tid);
    }

    /// Move garbage from an exiting thread into the shared orphan bag.
    pub(crate) fn orphan(&self, mut bag: Vec<Deferred>) {
        self.orphans.lock().append(&mut bag);
    }

    /// Drain the orphan bag into `out` so a live thread can collect it.
    pub(crate) fn adopt_orphans(&self, out: &mut Vec<Deferred>) {
        let mut orphans = self.orphans.lock();
        out.append(&mut orphans);
    }
}

/// Global singleton instance
static GLOBAL: OnceBox<EpochState> = OnceBox::new();

/// Get a reference to the global epoch state
#[inline]
pub(crate) fn global() -> &'static EpochState {
    GLOBAL.get_or_init(|| Box::new(EpochState::new()))
}
