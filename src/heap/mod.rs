//! Host heap statistics.
//!
//! The sampler only needs a [`HeapStatsSource`]; where the numbers come from is
//! up to the binary. The default source reads the counters kept by
//! [`TrackingAllocator`], which `main.rs` installs as the global allocator.

mod tracking;

pub use tracking::{TrackingAllocator, TrackingHeap};

/// Point-in-time heap counters, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// High-water mark of reserved heap bytes.
    pub system: u64,
    /// Live bytes as requested by callers.
    pub allocated: u64,
    /// Live bytes including allocator rounding.
    pub in_use: u64,
    /// Reserved at some point but not currently in use.
    pub idle: u64,
    /// Part of `idle` currently returned to the operating system.
    pub released: u64,
}

/// Anything that can report heap counters on demand.
pub trait HeapStatsSource: Send + Sync {
    fn read(&self) -> HeapStats;
}

impl<F> HeapStatsSource for F
where
    F: Fn() -> HeapStats + Send + Sync,
{
    fn read(&self) -> HeapStats {
        self()
    }
}
