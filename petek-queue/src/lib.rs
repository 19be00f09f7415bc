//! MPMC queue primitives built on `petek`.
//!
//! ## Features
//!
//! - [`MsQueue`](ms_queue::MsQueue): unbounded MPMC FIFO (Michael-Scott,
//!   ABA-safe versioned links, epoch reclamation).
//! - [`ArrayQueue`](array_queue::ArrayQueue): bounded MPMC queue over a
//!   fixed ring of stamped slots.
//!
//! ## Usage
//!
//! ```rust
//! use petek_queue::ms_queue::MsQueue;
//!
//! let q = MsQueue::new();
//! q.push(1);
//! q.push(2);
//! assert_eq!(q.pop(), Some(1));
//! assert_eq!(q.pop(), Some(2));
//! assert_eq!(q.pop(), None);
//! ```

pub mod array_queue;
pub mod ms_queue;

use std::error::Error;
use std::fmt;

/// Error returned by [`array_queue::ArrayQueue::push`] when the queue is
/// full, giving the rejected value back to the caller.
pub struct PushError<T>(pub T);

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PushError(..)")
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is full")
    }
}

impl<T> Error for PushError<T> {}
