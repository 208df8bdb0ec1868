//! Counting wrapper around the system allocator.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{HeapStats, HeapStatsSource};

/// Smallest block the system allocator hands out on 64-bit targets.
const GRANULE: usize = 16;

/// Blocks at least this large are mapped directly and unmapped on free.
const DIRECT_MAP_THRESHOLD: u64 = 128 * 1024;

static LIVE_REQUESTED: AtomicU64 = AtomicU64::new(0);
static LIVE_RESERVED: AtomicU64 = AtomicU64::new(0);
static PEAK_RESERVED: AtomicU64 = AtomicU64::new(0);
/// Directly mapped bytes freed and not yet taken back by a later large block.
static RETURNED: AtomicU64 = AtomicU64::new(0);

/// Global allocator that forwards to [`System`] and keeps byte counters.
///
/// Install it with `#[global_allocator]`; until then [`TrackingHeap`] reports zeros.
pub struct TrackingAllocator;

#[inline]
fn reserved_size(layout: &Layout) -> u64 {
    let granule = layout.align().max(GRANULE);
    ((layout.size() + granule - 1) & !(granule - 1)) as u64
}

#[inline]
fn record_alloc(layout: &Layout) {
    let reserved = reserved_size(layout);
    LIVE_REQUESTED.fetch_add(layout.size() as u64, Ordering::Relaxed);
    let live = LIVE_RESERVED.fetch_add(reserved, Ordering::Relaxed) + reserved;
    PEAK_RESERVED.fetch_max(live, Ordering::Relaxed);
    if reserved >= DIRECT_MAP_THRESHOLD {
        let _ = RETURNED.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |returned| {
            Some(returned.saturating_sub(reserved))
        });
    }
}

#[inline]
fn record_free(layout: &Layout) {
    let reserved = reserved_size(layout);
    LIVE_REQUESTED.fetch_sub(layout.size() as u64, Ordering::Relaxed);
    LIVE_RESERVED.fetch_sub(reserved, Ordering::Relaxed);
    if reserved >= DIRECT_MAP_THRESHOLD {
        RETURNED.fetch_add(reserved, Ordering::Relaxed);
    }
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record_alloc(&layout);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record_alloc(&layout);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        record_free(&layout);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            record_free(&layout);
            // SAFETY: the caller guarantees new_size with layout.align() is a valid layout.
            let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
            record_alloc(&new_layout);
        }
        new_ptr
    }
}

/// [`HeapStatsSource`] backed by the [`TrackingAllocator`] counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingHeap;

impl HeapStatsSource for TrackingHeap {
    fn read(&self) -> HeapStats {
        let in_use = LIVE_RESERVED.load(Ordering::Relaxed);
        let system = PEAK_RESERVED.load(Ordering::Relaxed).max(in_use);
        let idle = system - in_use;
        HeapStats {
            system,
            allocated: LIVE_REQUESTED.load(Ordering::Relaxed),
            in_use,
            idle,
            released: RETURNED.load(Ordering::Relaxed).min(idle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_size_rounds_to_granule() {
        assert_eq!(reserved_size(&Layout::from_size_align(1, 1).unwrap()), 16);
        assert_eq!(reserved_size(&Layout::from_size_align(16, 8).unwrap()), 16);
        assert_eq!(reserved_size(&Layout::from_size_align(17, 8).unwrap()), 32);
        assert_eq!(reserved_size(&Layout::from_size_align(10, 64).unwrap()), 64);
        assert_eq!(reserved_size(&Layout::from_size_align(0, 1).unwrap()), 0);
    }

    #[test]
    fn test_tracking_heap_is_consistent() {
        // The test binary does not install the allocator, but the relations
        // between fields hold either way.
        let stats = TrackingHeap.read();
        assert!(stats.system >= stats.in_use);
        assert_eq!(stats.idle, stats.system - stats.in_use);
        assert!(stats.released <= stats.idle);
    }
}
