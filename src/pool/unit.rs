use bytes::BytesMut;

/// Fixed-size block of memory that occupies a pool slot.
pub struct ResourceUnit {
    seq: u64,
    mem: BytesMut,
}

impl ResourceUnit {
    /// Allocate a zeroed unit of `size` bytes tagged with `seq`.
    ///
    /// Allocation failure aborts the process.
    pub fn new(seq: u64, size: usize) -> Self {
        Self {
            seq,
            mem: BytesMut::zeroed(size),
        }
    }

    /// Production order, starting at 0 for each producer.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Size of the block in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.mem.len()
    }

    /// Whether the block has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }
}

impl std::fmt::Debug for ResourceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceUnit")
            .field("seq", &self.seq)
            .field("len", &self.mem.len())
            .finish()
    }
}
