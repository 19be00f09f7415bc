//! ABA-safe versioned atomic reference.
//!
//! A compare-and-swap against a plain cell can falsely succeed when the
//! value was changed away and back between the read and the CAS (the ABA
//! problem). `VersionedRef` defeats it by packing the value together with a
//! monotonically increasing version counter into one 128-bit atom: value in
//! the low 64 bits, version in the high 64 bits. Checking the pair with two
//! separate atomics would reopen the race window, so both halves go through
//! a single double-word CAS.

use core::marker::PhantomData;
use core::sync::atomic::Ordering;
use crossbeam_utils::Backoff;
use portable_atomic::AtomicU128;

mod sealed {
    pub trait Sealed {}
}

/// Values that pack losslessly into the low 64 bits of a [`VersionedRef`].
///
/// Implemented for `u32`, `u64`, `usize` and raw pointers. Sealed.
pub trait Pack: sealed::Sealed + Copy + Eq {
    /// Encode the value into 64 bits.
    #[doc(hidden)]
    fn into_bits(self) -> u64;
    /// Decode a value previously produced by `into_bits`.
    #[doc(hidden)]
    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_pack_int {
    ($($t:ty),*) => {
        $(
            impl sealed::Sealed for $t {}
            impl Pack for $t {
                #[inline]
                fn into_bits(self) -> u64 {
                    self as u64
                }
                #[inline]
                fn from_bits(bits: u64) -> Self {
                    bits as $t
                }
            }
        )*
    };
}

impl_pack_int!(u32, u64, usize);

impl<T> sealed::Sealed for *mut T {}
impl<T> Pack for *mut T {
    #[inline]
    fn into_bits(self) -> u64 {
        self as usize as u64
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        bits as usize as *mut T
    }
}

/// An atomic `(value, version)` pair updated as one unit.
///
/// The version is strictly increasing across successful updates, so two
/// observations with equal values but different versions are
/// distinguishable. A stale [`try_update`](Self::try_update) fails even
/// when the value component matches again.
///
/// # Examples
///
/// ```rust
/// use petek::{VersionedRef, Ordering};
///
/// let cell = VersionedRef::new(10u64);
/// let (v, ver) = cell.load(Ordering::Acquire);
///
/// // Concurrent actor: 10 -> 99 -> 10. Value is back, version is not.
/// cell.update(|_| 99);
/// cell.update(|_| 10);
///
/// assert!(!cell.try_update(v, ver, 42, Ordering::AcqRel));
/// ```
#[repr(align(16))]
pub struct VersionedRef<T> {
    data: AtomicU128,
    _marker: PhantomData<T>,
}

// The cell stores plain bits; what the bits mean (and whether they may be
// dereferenced on another thread) is the owner's contract, as with any
// atomic pointer.
unsafe impl<T: Pack> Send for VersionedRef<T> {}
unsafe impl<T: Pack> Sync for VersionedRef<T> {}

impl<T: Pack> VersionedRef<T> {
    /// Creates a reference holding `value` at version 0.
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            data: AtomicU128::new(value.into_bits() as u128),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn encode(value: T, version: u64) -> u128 {
        (value.into_bits() as u128) | ((version as u128) << 64)
    }

    #[inline]
    fn decode(bits: u128) -> (T, u64) {
        (T::from_bits(bits as u64), (bits >> 64) as u64)
    }

    /// Loads the current `(value, version)` pair with a single atomic read.
    #[inline]
    pub fn load(&self, order: Ordering) -> (T, u64) {
        Self::decode(self.data.load(order))
    }

    /// Loads only the value component.
    #[inline]
    pub fn value(&self, order: Ordering) -> T {
        self.load(order).0
    }

    /// Loads only the version component.
    #[inline]
    pub fn version(&self, order: Ordering) -> u64 {
        self.load(order).1
    }

    /// Attempts to replace `(expected, expected_version)` with
    /// `(new, expected_version + 1)` in one double-word CAS.
    ///
    /// Succeeds only if both components match. `success` is applied on
    /// success; failures load with `Acquire`. A `false` return is a normal
    /// retry signal, not an error, and leaves the cell untouched.
    #[inline]
    pub fn try_update(&self, expected: T, expected_version: u64, new: T, success: Ordering) -> bool {
        let old = Self::encode(expected, expected_version);
        let new = Self::encode(new, expected_version.wrapping_add(1));
        self.data
            .compare_exchange(old, new, success, Ordering::Acquire)
            .is_ok()
    }

    /// Applies `f` to the current value until the CAS lands, backing off
    /// between failed attempts. Returns the value it installed.
    ///
    /// `f` may run several times under contention and must be pure.
    pub fn update<F>(&self, f: F) -> T
    where
        F: Fn(T) -> T,
    {
        let backoff = Backoff::new();
        loop {
            let (current, version) = self.load(Ordering::Acquire);
            let new = f(current);
            if self.try_update(current, version, new, Ordering::AcqRel) {
                return new;
            }
            backoff.spin();
        }
    }
}

impl<T: Pack + core::fmt::Debug> core::fmt::Debug for VersionedRef<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (value, version) = self.load(Ordering::Relaxed);
        f.debug_struct("VersionedRef")
            .field("value", &value)
            .field("version", &version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_increments_on_success() {
        let cell = VersionedRef::new(5u64);
        let (v, ver) = cell.load(Ordering::Acquire);
        assert_eq!((v, ver), (5, 0));
        assert!(cell.try_update(5, 0, 6, Ordering::AcqRel));
        assert_eq!(cell.load(Ordering::Acquire), (6, 1));
    }

    #[test]
    fn mismatched_version_fails() {
        let cell = VersionedRef::new(5u64);
        assert!(!cell.try_update(5, 3, 6, Ordering::AcqRel));
        assert_eq!(cell.load(Ordering::Acquire), (5, 0));
    }

    #[test]
    fn packs_pointers() {
        let mut x = 1u32;
        let p: *mut u32 = &mut x;
        let cell = VersionedRef::new(p);
        let (q, ver) = cell.load(Ordering::Acquire);
        assert_eq!(q, p);
        assert_eq!(ver, 0);
        assert!(cell.try_update(p, 0, core::ptr::null_mut(), Ordering::AcqRel));
        assert!(cell.value(Ordering::Acquire).is_null());
    }
}
