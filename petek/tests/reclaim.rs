//! Tests for the pin/retire reclamation protocol.

use petek::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Increments a shared counter when freed.
struct Tracked {
    counter: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(counter: Arc<AtomicUsize>) -> *mut Self {
        Box::into_raw(Box::new(Self { counter }))
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Retire `n` throwaway nodes to drive collection forward.
fn churn(n: usize, counter: &Arc<AtomicUsize>) {
    for _ in 0..n {
        let node = Tracked::new(counter.clone());
        unsafe { petek::retire(node) };
    }
}

#[test]
fn pin_is_reentrant() {
    let outer = pin();
    let inner = pin();
    drop(inner);
    drop(outer);
}

#[test]
#[cfg_attr(miri, ignore)]
fn retired_nodes_are_eventually_freed() {
    const TOTAL: usize = 10_000;

    let counter = Arc::new(AtomicUsize::new(0));
    churn(TOTAL, &counter);

    // Collection runs per batch; sibling tests may hold short pins that
    // stall the epoch, so drive it until the bulk is reclaimed.
    let scrap = Arc::new(AtomicUsize::new(0));
    for _ in 0..1_000 {
        if counter.load(Ordering::SeqCst) >= TOTAL / 2 {
            break;
        }
        churn(64, &scrap);
        thread::yield_now();
    }

    let freed = counter.load(Ordering::SeqCst);
    assert!(freed >= TOTAL / 2, "only {freed} of {TOTAL} freed");
    assert!(freed <= TOTAL);
}

#[test]
#[cfg_attr(miri, ignore)]
fn pinned_epoch_blocks_freeing() {
    const TOTAL: usize = 200;

    let counter = Arc::new(AtomicUsize::new(0));
    let guard = pin();

    // Retire from another thread while this one stays pinned. Its
    // collections cannot move the epoch two steps past ours, so nothing
    // it retires after our pin may be freed yet.
    {
        let counter = counter.clone();
        thread::spawn(move || {
            let scrap = Arc::new(AtomicUsize::new(0));
            churn(TOTAL, &counter);
            churn(1_000, &scrap);
        })
        .join()
        .unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    drop(guard);
}

#[test]
#[cfg_attr(miri, ignore)]
fn orphans_from_exited_threads_are_adopted() {
    const ORPHANED: usize = 100;

    let orphan_counter = Arc::new(AtomicUsize::new(0));

    {
        let orphan_counter = orphan_counter.clone();
        thread::spawn(move || {
            // Exits with a partial batch still in its bag.
            churn(ORPHANED, &orphan_counter);
        })
        .join()
        .unwrap();
    }

    // Churn on this thread adopts and frees the leftovers.
    let scrap = Arc::new(AtomicUsize::new(0));
    for _ in 0..1_000 {
        if orphan_counter.load(Ordering::SeqCst) == ORPHANED {
            break;
        }
        churn(64, &scrap);
        thread::yield_now();
    }

    assert_eq!(orphan_counter.load(Ordering::SeqCst), ORPHANED);
}

/// Carries a magic value that its destructor poisons, so a read through a
/// freed node has a chance to trip the assertion below.
struct Canary {
    magic: u64,
}

const MAGIC: u64 = 0x5eed_feed_dead_cafe;

impl Drop for Canary {
    fn drop(&mut self) {
        self.magic = 0;
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn guarded_reads_never_see_freed_nodes() {
    // Writers continually swap a shared pointer and retire the old node;
    // readers pin, load, and dereference. Collection runs concurrently on
    // the writer threads, so an epoch advancing past a pinned reader
    // would surface here as a poisoned or garbage magic value.
    const WRITERS: usize = 2;
    const READERS: usize = 4;
    const SWAPS: usize = 20_000;
    const READS: usize = 50_000;

    let cell = Arc::new(petek::VersionedRef::new(Box::into_raw(Box::new(Canary {
        magic: MAGIC,
    }))));
    let mut handles = vec![];

    for _ in 0..WRITERS {
        let cell = cell.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..SWAPS {
                let fresh = Box::into_raw(Box::new(Canary { magic: MAGIC }));
                let guard = pin();
                let (old, version) = cell.load(petek::Ordering::Acquire);
                if cell.try_update(old, version, fresh, petek::Ordering::AcqRel) {
                    unsafe { petek::retire(old) };
                } else {
                    unsafe { drop(Box::from_raw(fresh)) };
                }
                drop(guard);
            }
        }));
    }

    for _ in 0..READERS {
        let cell = cell.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..READS {
                let guard = pin();
                let (node, _) = cell.load(petek::Ordering::Acquire);
                let magic = unsafe { (*node).magic };
                assert_eq!(magic, MAGIC);
                drop(guard);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let (last, _) = cell.load(petek::Ordering::Acquire);
    unsafe { drop(Box::from_raw(last)) };
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_pin_retire_churn() {
    const NUM_THREADS: usize = 8;
    const PER_THREAD: usize = 20_000;

    let counter = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for _ in 0..NUM_THREADS {
        let counter = counter.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..PER_THREAD {
                let guard = pin();
                let node = Tracked::new(counter.clone());
                unsafe { petek::retire(node) };
                drop(guard);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // No double frees: the counter can never exceed the retire count.
    assert!(counter.load(Ordering::SeqCst) <= NUM_THREADS * PER_THREAD);
}
