//! Cache-line padding to prevent false sharing.
//!
//! Two independently-hot atomics on the same cache line force the owning
//! cores to invalidate each other on every update. Wrapping each in
//! [`Padded`] rounds its footprint up to a whole number of cache lines so
//! neighbouring fields never share one.

use core::ops::{Deref, DerefMut};

// Cache line sizes per architecture.
// x86/x86_64: 64B, aarch64: 128B (Apple M-series / Neoverse), s390x: 256B.

/// Cache line size of the target architecture, in bytes.
#[cfg(target_arch = "s390x")]
pub const CACHE_LINE_SIZE: usize = 256;

/// Cache line size of the target architecture, in bytes.
#[cfg(target_arch = "aarch64")]
pub const CACHE_LINE_SIZE: usize = 128;

/// Cache line size of the target architecture, in bytes.
#[cfg(not(any(target_arch = "s390x", target_arch = "aarch64")))]
pub const CACHE_LINE_SIZE: usize = 64;

/// Aligns the inner value to a cache-line boundary.
///
/// `Padded<T>` is a layout decorator only: it adds no behavior of its own
/// and derefs to the inner value, so `Padded<AtomicCell<T>>` or
/// `Padded<VersionedRef<T>>` expose their `load`/`store`/`compare_exchange`
/// directly. `size_of::<Padded<T>>()` is always a multiple of
/// [`CACHE_LINE_SIZE`] (and of 64).
#[cfg(target_arch = "s390x")]
#[repr(align(256))]
#[derive(Default, Debug)]
pub struct Padded<T> {
    data: T,
}

/// Aligns the inner value to a cache-line boundary.
///
/// `Padded<T>` is a layout decorator only: it adds no behavior of its own
/// and derefs to the inner value, so `Padded<AtomicCell<T>>` or
/// `Padded<VersionedRef<T>>` expose their `load`/`store`/`compare_exchange`
/// directly. `size_of::<Padded<T>>()` is always a multiple of
/// [`CACHE_LINE_SIZE`] (and of 64).
#[cfg(target_arch = "aarch64")]
#[repr(align(128))]
#[derive(Default, Debug)]
pub struct Padded<T> {
    data: T,
}

/// Aligns the inner value to a cache-line boundary.
///
/// `Padded<T>` is a layout decorator only: it adds no behavior of its own
/// and derefs to the inner value, so `Padded<AtomicCell<T>>` or
/// `Padded<VersionedRef<T>>` expose their `load`/`store`/`compare_exchange`
/// directly. `size_of::<Padded<T>>()` is always a multiple of
/// [`CACHE_LINE_SIZE`] (and of 64).
#[cfg(not(any(target_arch = "s390x", target_arch = "aarch64")))]
#[repr(align(64))]
#[derive(Default, Debug)]
pub struct Padded<T> {
    data: T,
}

impl<T> Padded<T> {
    /// Wraps `data` in its own cache line.
    #[inline]
    pub const fn new(data: T) -> Self {
        Self { data }
    }

    /// Unwraps the inner value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T> Deref for Padded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for Padded<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<T> From<T> for Padded<T> {
    fn from(data: T) -> Self {
        Self::new(data)
    }
}
