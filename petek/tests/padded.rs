//! Layout tests for `Padded<T>`.

use petek::{AtomicCell, Padded, VersionedRef, CACHE_LINE_SIZE};
use std::mem::{align_of, size_of};

#[test]
fn cache_line_size_is_a_power_of_two_multiple_of_64() {
    assert!(CACHE_LINE_SIZE.is_power_of_two());
    assert_eq!(CACHE_LINE_SIZE % 64, 0);
}

#[test]
fn padded_occupies_whole_cache_lines() {
    assert_eq!(size_of::<Padded<AtomicCell<usize>>>() % 64, 0);
    assert_eq!(size_of::<Padded<AtomicCell<u8>>>() % 64, 0);
    assert_eq!(size_of::<Padded<VersionedRef<u64>>>() % 64, 0);
    assert_eq!(size_of::<Padded<VersionedRef<*mut u8>>>() % 64, 0);
    assert_eq!(size_of::<Padded<[u8; 200]>>() % 64, 0);

    assert_eq!(size_of::<Padded<AtomicCell<usize>>>() % CACHE_LINE_SIZE, 0);
    assert_eq!(size_of::<Padded<VersionedRef<u64>>>() % CACHE_LINE_SIZE, 0);
}

#[test]
fn padded_is_cache_line_aligned() {
    assert_eq!(align_of::<Padded<AtomicCell<usize>>>(), CACHE_LINE_SIZE);
    assert_eq!(align_of::<Padded<u8>>(), CACHE_LINE_SIZE);
}

#[test]
fn neighbouring_padded_fields_do_not_share_a_line() {
    struct Cursors {
        head: Padded<AtomicCell<usize>>,
        tail: Padded<AtomicCell<usize>>,
    }

    let cursors = Cursors {
        head: Padded::new(AtomicCell::new(0)),
        tail: Padded::new(AtomicCell::new(0)),
    };

    let head_addr = &cursors.head as *const _ as usize;
    let tail_addr = &cursors.tail as *const _ as usize;
    let distance = head_addr.abs_diff(tail_addr);
    assert!(distance >= CACHE_LINE_SIZE);
}

#[test]
fn padded_delegates_through_deref() {
    let cell = Padded::new(AtomicCell::new(5u32));
    assert_eq!(cell.load(petek::Ordering::Acquire), 5);
    cell.store(6, petek::Ordering::Release);
    assert_eq!(cell.swap(7, petek::Ordering::AcqRel), 6);
    assert_eq!(Padded::new(3u64).into_inner(), 3);
}
