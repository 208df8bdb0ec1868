//! Lock-free wait-time histogram with power-of-two buckets.
//!
//! Bucket 0 holds zero; bucket `b` holds values in `[2^(b-1), 2^b)`.
//! Percentiles report the bucket's upper bound, clamped to the observed max,
//! so they never understate a wait.

use std::sync::atomic::{AtomicU64, Ordering};

use super::WaitPercentiles;

const NUM_BUCKETS: usize = 64;

/// Histogram of durations in microseconds.
pub struct WaitHistogram {
    buckets: [AtomicU64; NUM_BUCKETS],
    count: AtomicU64,
    sum: AtomicU64,
    max: AtomicU64,
}

impl WaitHistogram {
    pub const fn new() -> Self {
        Self {
            buckets: [const { AtomicU64::new(0) }; NUM_BUCKETS],
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Record a value in microseconds.
    #[inline]
    pub fn record(&self, value_us: u64) {
        self.buckets[Self::bucket_of(value_us)].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value_us, Ordering::Relaxed);
        self.max.fetch_max(value_us, Ordering::Relaxed);
    }

    #[inline]
    fn bucket_of(value_us: u64) -> usize {
        let bits = (u64::BITS - value_us.leading_zeros()) as usize;
        bits.min(NUM_BUCKETS - 1)
    }

    #[inline]
    fn upper_bound(bucket: usize) -> u64 {
        match bucket {
            0 => 0,
            b if b >= NUM_BUCKETS - 1 => u64::MAX,
            b => (1u64 << b) - 1,
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Total of all recorded values.
    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn percentiles(&self) -> WaitPercentiles {
        let total = self.count();
        if total == 0 {
            return WaitPercentiles::default();
        }
        let max = self.max.load(Ordering::Relaxed);

        let targets = [
            total.div_ceil(2),
            (total * 95).div_ceil(100),
            (total * 99).div_ceil(100),
        ];
        let mut found = [None; 3];
        let mut cumulative = 0u64;

        for (bucket, counter) in self.buckets.iter().enumerate() {
            cumulative += counter.load(Ordering::Relaxed);
            for (slot, &target) in found.iter_mut().zip(targets.iter()) {
                if slot.is_none() && cumulative >= target {
                    *slot = Some(Self::upper_bound(bucket).min(max));
                }
            }
            if found.iter().all(Option::is_some) {
                break;
            }
        }

        // Buckets are read after `count`; late records can leave a target unreached.
        let [p50, p95, p99] = found.map(|p| p.unwrap_or(max));
        WaitPercentiles {
            count: total,
            p50,
            p95,
            p99,
            max,
        }
    }
}

impl Default for WaitHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_of() {
        assert_eq!(WaitHistogram::bucket_of(0), 0);
        assert_eq!(WaitHistogram::bucket_of(1), 1);
        assert_eq!(WaitHistogram::bucket_of(2), 2);
        assert_eq!(WaitHistogram::bucket_of(3), 2);
        assert_eq!(WaitHistogram::bucket_of(4), 3);
        assert_eq!(WaitHistogram::bucket_of(1023), 10);
        assert_eq!(WaitHistogram::bucket_of(1024), 11);
        assert_eq!(WaitHistogram::bucket_of(u64::MAX), 63);
    }

    #[test]
    fn test_value_within_bucket_bound() {
        for value in [0u64, 1, 5, 100, 9_999, 10_000, 1 << 40] {
            let bucket = WaitHistogram::bucket_of(value);
            assert!(value <= WaitHistogram::upper_bound(bucket));
        }
    }

    #[test]
    fn test_empty_percentiles() {
        let h = WaitHistogram::new();
        let p = h.percentiles();
        assert_eq!(p.count, 0);
        assert_eq!(p.p99, 0);
        assert_eq!(p.max, 0);
    }

    #[test]
    fn test_all_zero_waits() {
        let h = WaitHistogram::new();
        for _ in 0..10 {
            h.record(0);
        }
        let p = h.percentiles();
        assert_eq!(p.count, 10);
        assert_eq!(p.p50, 0);
        assert_eq!(p.p99, 0);
    }

    #[test]
    fn test_bimodal_percentiles() {
        let h = WaitHistogram::new();
        for _ in 0..90 {
            h.record(10);
        }
        for _ in 0..10 {
            h.record(5_000);
        }

        let p = h.percentiles();
        assert_eq!(p.count, 100);
        assert_eq!(p.p50, 15);
        assert_eq!(p.p95, 5_000);
        assert_eq!(p.max, 5_000);
        assert_eq!(h.sum(), 90 * 10 + 10 * 5_000);
    }
}
