//! Petek: lock-free concurrency primitives.
//!
//! Petek provides the small, dense core that concurrent data structures are
//! built from:
//!
//! - [`AtomicCell`]: atomic load/store/CAS over a single machine word,
//!   parameterized by memory ordering.
//! - [`VersionedRef`]: an ABA-safe atomic reference pairing a value with a
//!   monotonically increasing version counter, updated by one double-word CAS.
//! - [`Padded`]: a cache-line alignment wrapper so independently-hot atomics
//!   never share a cache line.
//! - [`pin`]/[`retire`]: epoch-based memory reclamation for nodes unlinked
//!   from lock-free structures.
//!
//! # Example
//!
//! ```rust
//! use petek::{VersionedRef, Ordering};
//!
//! let cell = VersionedRef::new(1u64);
//! let (value, version) = cell.load(Ordering::Acquire);
//! assert!(cell.try_update(value, version, value + 1, Ordering::AcqRel));
//!
//! // A second update against the stale version fails, even though the
//! // value component could be made to match again.
//! assert!(!cell.try_update(value, version, value + 7, Ordering::AcqRel));
//! ```
//!
//! # Memory orderings
//!
//! Every operation takes an explicit [`Ordering`]. `Relaxed` guarantees
//! atomicity and nothing else; `Acquire` loads synchronize-with `Release`
//! stores; `AcqRel` combines both for read-modify-write operations; `SeqCst`
//! additionally joins a single global total order. Publishing a node another
//! thread will dereference requires at least `Release` on the store and
//! `Acquire` on the load — using `Relaxed` there is a contract violation the
//! library cannot detect at runtime.

#![warn(missing_docs)]

extern crate alloc;

mod cell;
mod epoch;
mod guard;
mod padded;
mod spin;
mod versioned;

pub use cell::{AtomicCell, Word, WordAdd};
pub use guard::{pin, retire, Guard};
pub use padded::{Padded, CACHE_LINE_SIZE};
pub use versioned::{Pack, VersionedRef};

// Re-export for convenience
pub use core::sync::atomic::Ordering;
