//! Word-sized atomic cell.
//!
//! `AtomicCell<T>` stores any machine-word type in a single `AtomicUsize`,
//! so every operation is one hardware atomic instruction (or a short CAS
//! loop for composite read-modify-writes). There are no torn reads: every
//! load observes a value some completed store or compare-exchange produced.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

mod sealed {
    pub trait Sealed {}
}

/// Types that fit in one machine word and can live in an [`AtomicCell`].
///
/// Implemented for the unsigned and signed integers up to pointer width,
/// and for `bool`. The trait is sealed; the conversions are lossless.
pub trait Word: sealed::Sealed + Copy + Eq {
    /// Pack the value into a word.
    #[doc(hidden)]
    fn into_word(self) -> usize;
    /// Unpack a value previously produced by `into_word`.
    #[doc(hidden)]
    fn from_word(word: usize) -> Self;
}

/// Numeric [`Word`] types supporting [`AtomicCell::fetch_add`].
pub trait WordAdd: Word {
    /// Wrapping addition in the value domain.
    #[doc(hidden)]
    fn word_add(self, rhs: Self) -> Self;
}

macro_rules! impl_word_int {
    ($($t:ty),*) => {
        $(
            impl sealed::Sealed for $t {}
            impl Word for $t {
                #[inline]
                fn into_word(self) -> usize {
                    self as usize
                }
                #[inline]
                fn from_word(word: usize) -> Self {
                    word as $t
                }
            }
            impl WordAdd for $t {
                #[inline]
                fn word_add(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }
            }
        )*
    };
}

impl_word_int!(u8, u16, u32, usize, i8, i16, i32, isize);

#[cfg(target_pointer_width = "64")]
impl_word_int!(u64, i64);

impl sealed::Sealed for bool {}
impl Word for bool {
    #[inline]
    fn into_word(self) -> usize {
        self as usize
    }
    #[inline]
    fn from_word(word: usize) -> Self {
        word != 0
    }
}

/// A single machine word with atomic access.
///
/// All operations are non-blocking. Compare-exchange failure is a normal
/// outcome reported through the `Result`, never an error.
///
/// # Examples
///
/// ```rust
/// use petek::{AtomicCell, Ordering};
///
/// let cell = AtomicCell::new(7u32);
/// assert_eq!(cell.load(Ordering::Acquire), 7);
/// assert_eq!(cell.fetch_add(3, Ordering::AcqRel), 7);
/// assert_eq!(cell.load(Ordering::Acquire), 10);
/// ```
pub struct AtomicCell<T> {
    data: AtomicUsize,
    _marker: PhantomData<T>,
}

impl<T: Word> AtomicCell<T> {
    /// Creates a cell holding `value`.
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            data: AtomicUsize::new(value.into_word()),
            _marker: PhantomData,
        }
    }

    /// Loads the current value.
    ///
    /// Valid orderings: `Relaxed`, `Acquire`, `SeqCst`.
    #[inline]
    pub fn load(&self, order: Ordering) -> T {
        T::from_word(self.data.load(order))
    }

    /// Publishes `value`.
    ///
    /// Valid orderings: `Relaxed`, `Release`, `SeqCst`.
    #[inline]
    pub fn store(&self, value: T, order: Ordering) {
        self.data.store(value.into_word(), order);
    }

    /// Replaces the value, returning the previous one.
    #[inline]
    pub fn swap(&self, value: T, order: Ordering) -> T {
        T::from_word(self.data.swap(value.into_word(), order))
    }

    /// If the current value equals `current`, replaces it with `new`.
    ///
    /// On success returns `Ok` with the previous value (applying `success`
    /// ordering); on failure returns `Err` with the witnessed value
    /// (applying `failure` ordering) and leaves the cell unchanged.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: T,
        new: T,
        success: Ordering,
        failure: Ordering,
    ) -> Result<T, T> {
        match self
            .data
            .compare_exchange(current.into_word(), new.into_word(), success, failure)
        {
            Ok(prev) => Ok(T::from_word(prev)),
            Err(prev) => Err(T::from_word(prev)),
        }
    }

    /// Like [`compare_exchange`](Self::compare_exchange) but may fail
    /// spuriously. Preferable inside retry loops.
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: T,
        new: T,
        success: Ordering,
        failure: Ordering,
    ) -> Result<T, T> {
        match self
            .data
            .compare_exchange_weak(current.into_word(), new.into_word(), success, failure)
        {
            Ok(prev) => Ok(T::from_word(prev)),
            Err(prev) => Err(T::from_word(prev)),
        }
    }

    /// Atomically adds `delta` (wrapping), returning the prior value.
    ///
    /// Implemented as a CAS loop over the packed word so narrow types never
    /// carry into neighbouring bits.
    #[inline]
    pub fn fetch_add(&self, delta: T, order: Ordering) -> T
    where
        T: WordAdd,
    {
        let mut current = self.load(Ordering::Relaxed);
        loop {
            let new = current.word_add(delta);
            match self.compare_exchange_weak(current, new, order, Ordering::Relaxed) {
                Ok(prev) => return prev,
                Err(observed) => current = observed,
            }
        }
    }

    /// Consumes the cell, returning the inner value.
    #[inline]
    pub fn into_inner(self) -> T {
        T::from_word(self.data.into_inner())
    }
}

impl<T: Word> Default for AtomicCell<T>
where
    T: Default,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Word + core::fmt::Debug> core::fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("AtomicCell")
            .field(&self.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_fetch_add_wraps_in_type() {
        let cell = AtomicCell::new(250u8);
        assert_eq!(cell.fetch_add(10, Ordering::AcqRel), 250);
        assert_eq!(cell.load(Ordering::Acquire), 4);
    }

    #[test]
    fn cas_failure_reports_witnessed_value() {
        let cell = AtomicCell::new(1u32);
        let err = cell
            .compare_exchange(2, 3, Ordering::AcqRel, Ordering::Acquire)
            .unwrap_err();
        assert_eq!(err, 1);
        assert_eq!(cell.load(Ordering::Acquire), 1);
    }
}
