use pressure_lab::heap::{HeapStatsSource, TrackingAllocator, TrackingHeap};
use pressure_lab::pool::{ResourceUnit, RingPool};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

const UNIT: usize = 1024 * 1024;

#[test]
fn test_released_stays_within_idle() {
    let mut ring = RingPool::new(4);
    for seq in 0..64 {
        ring.push(ResourceUnit::new(seq, UNIT));
    }

    let during = TrackingHeap.read();
    assert!(during.in_use >= 4 * UNIT as u64, "{:?}", during);
    assert!(during.released <= during.idle, "{:?}", during);
    assert!(during.idle <= during.system, "{:?}", during);

    drop(ring);

    let after = TrackingHeap.read();
    assert!(after.released <= after.idle, "{:?}", after);
    assert!(after.idle <= after.system, "{:?}", after);
    // The four resident units were unmapped when the ring went away.
    assert!(after.released >= 4 * UNIT as u64, "{:?}", after);
}
