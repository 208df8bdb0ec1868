//! Fixed-capacity circular pool of resource units.

use super::ResourceUnit;

/// Circular buffer that overwrites its oldest slot.
///
/// Owned by a single task; no internal locking.
pub struct RingPool {
    slots: Vec<Option<ResourceUnit>>,
    /// Total units ever stored. The next write goes to `index % capacity`.
    index: u64,
}

impl RingPool {
    /// Create an empty pool.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring pool capacity must be non-zero");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            index: 0,
        }
    }

    /// Store `unit` in the next slot, dropping whatever was there.
    #[inline]
    pub fn push(&mut self, unit: ResourceUnit) {
        let slot = self.slot_for(self.index);
        self.slots[slot] = Some(unit);
        self.index += 1;
    }

    /// Slot a given position in the write sequence maps to.
    #[inline]
    pub fn slot_for(&self, position: u64) -> usize {
        (position % self.slots.len() as u64) as usize
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of units stored so far.
    #[inline]
    pub fn current_index(&self) -> u64 {
        self.index
    }

    /// Unit held in `slot`, if any.
    pub fn get(&self, slot: usize) -> Option<&ResourceUnit> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Sum of the sizes of all resident units.
    pub fn resident_bytes(&self) -> u64 {
        self.slots
            .iter()
            .flatten()
            .map(|unit| unit.len() as u64)
            .sum()
    }
}
