//! Observability for the running workloads.
//!
//! Lock-free counters and wait histograms that the contended resource and the
//! pool sampler update, plus the most recent pool sample. The inspection
//! endpoint in [`server`] renders them for an external profiler to scrape.

mod histogram;
pub mod server;

pub use histogram::WaitHistogram;

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use crate::pool::PoolSample;

/// Global metrics instance for the process.
pub static METRICS: Metrics = Metrics::new();

/// Relaxed ordering for counters (eventual visibility is fine for metrics).
const RELAXED: Ordering = Ordering::Relaxed;

/// Lock mode an acquisition was made in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// Collection of all process metrics.
pub struct Metrics {
    // Contended resource
    pub reads_total: AtomicU64,
    pub writes_total: AtomicU64,
    pub refused_total: AtomicU64,
    pub holder_violations: AtomicU64,
    pub torn_reads: AtomicU64,

    // Time spent waiting to acquire the lock (microseconds)
    pub read_wait: WaitHistogram,
    pub write_wait: WaitHistogram,

    // Pool
    pub pool_units_received: AtomicU64,
    pub pool_samples: AtomicU64,

    start_time: AtomicU64,

    // Overwritten once per sampling tick, read on scrape
    last_sample: RwLock<Option<PoolSample>>,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            reads_total: AtomicU64::new(0),
            writes_total: AtomicU64::new(0),
            refused_total: AtomicU64::new(0),
            holder_violations: AtomicU64::new(0),
            torn_reads: AtomicU64::new(0),

            read_wait: WaitHistogram::new(),
            write_wait: WaitHistogram::new(),

            pool_units_received: AtomicU64::new(0),
            pool_samples: AtomicU64::new(0),

            start_time: AtomicU64::new(0),

            last_sample: RwLock::new(None),
        }
    }

    /// Initialize process start time. Call once at startup.
    pub fn init_start_time(&self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.start_time.store(now, RELAXED);
    }

    pub fn uptime_secs(&self) -> u64 {
        let start = self.start_time.load(RELAXED);
        if start == 0 {
            return 0;
        }
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now.saturating_sub(start)
    }

    #[inline]
    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(RELAXED)
    }

    /// Record how long an acquisition in `mode` waited, measured from `start`.
    #[inline]
    pub fn record_lock_wait(&self, mode: LockMode, start: Instant) {
        let waited_us = start.elapsed().as_micros() as u64;
        match mode {
            LockMode::Read => self.read_wait.record(waited_us),
            LockMode::Write => self.write_wait.record(waited_us),
        }
    }

    /// Count a finished operation in `mode`.
    #[inline]
    pub fn record_op(&self, mode: LockMode) {
        match mode {
            LockMode::Read => self.reads_total.fetch_add(1, RELAXED),
            LockMode::Write => self.writes_total.fetch_add(1, RELAXED),
        };
    }

    /// Publish the latest pool sample.
    pub fn record_pool_sample(&self, sample: PoolSample) {
        self.pool_samples.fetch_add(1, RELAXED);
        *self.last_sample.write() = Some(sample);
    }

    pub fn last_pool_sample(&self) -> Option<PoolSample> {
        *self.last_sample.read()
    }

    /// Get a snapshot of all metrics for reporting.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),

            reads_total: self.reads_total.load(RELAXED),
            writes_total: self.writes_total.load(RELAXED),
            refused_total: self.refused_total.load(RELAXED),
            holder_violations: self.holder_violations.load(RELAXED),
            torn_reads: self.torn_reads.load(RELAXED),

            read_wait: self.read_wait.percentiles(),
            read_wait_sum_us: self.read_wait.sum(),
            write_wait: self.write_wait.percentiles(),
            write_wait_sum_us: self.write_wait.sum(),

            pool_units_received: self.pool_units_received.load(RELAXED),
            pool_samples: self.pool_samples.load(RELAXED),
            last_sample: self.last_pool_sample(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait percentiles in microseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitPercentiles {
    pub count: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
}

/// Point-in-time snapshot of all metrics.
#[derive(Debug)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,

    pub reads_total: u64,
    pub writes_total: u64,
    pub refused_total: u64,
    pub holder_violations: u64,
    pub torn_reads: u64,

    pub read_wait: WaitPercentiles,
    pub read_wait_sum_us: u64,
    pub write_wait: WaitPercentiles,
    pub write_wait_sum_us: u64,

    pub pool_units_received: u64,
    pub pool_samples: u64,
    pub last_sample: Option<PoolSample>,
}

impl MetricsSnapshot {
    /// Render in the Prometheus text exposition format.
    pub fn to_prometheus_string(&self) -> String {
        let mut out = String::with_capacity(2048);

        counter(&mut out, "pressure_lab_uptime_seconds", "Seconds since start", self.uptime_secs);

        counter(&mut out, "pressure_lab_lock_reads_total", "Completed read operations", self.reads_total);
        counter(&mut out, "pressure_lab_lock_writes_total", "Completed write operations", self.writes_total);
        counter(
            &mut out,
            "pressure_lab_lock_refused_total",
            "Operations refused because the resource was closing",
            self.refused_total,
        );
        counter(
            &mut out,
            "pressure_lab_lock_holder_violations_total",
            "Acquisitions that overlapped a writer",
            self.holder_violations,
        );
        counter(
            &mut out,
            "pressure_lab_lock_torn_reads_total",
            "Reads that observed a half-finished write",
            self.torn_reads,
        );

        wait_summary(&mut out, "read", &self.read_wait, self.read_wait_sum_us);
        wait_summary(&mut out, "write", &self.write_wait, self.write_wait_sum_us);

        counter(
            &mut out,
            "pressure_lab_pool_units_received_total",
            "Units stored in the pool",
            self.pool_units_received,
        );
        counter(&mut out, "pressure_lab_pool_samples_total", "Sampling ticks", self.pool_samples);

        if let Some(sample) = self.last_sample {
            gauge(&mut out, "pressure_lab_pool_bytes", "Bytes resident in the pool", sample.pool_bytes);
            gauge(&mut out, "pressure_lab_heap_sys_bytes", "Heap high-water mark", sample.heap.system);
            gauge(&mut out, "pressure_lab_heap_alloc_bytes", "Live requested heap bytes", sample.heap.allocated);
            gauge(&mut out, "pressure_lab_heap_inuse_bytes", "Live heap bytes", sample.heap.in_use);
            gauge(&mut out, "pressure_lab_heap_idle_bytes", "Reserved but unused heap bytes", sample.heap.idle);
            gauge(
                &mut out,
                "pressure_lab_heap_released_bytes",
                "Bytes returned to the system allocator",
                sample.heap.released,
            );
        }

        out
    }
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}");
}

fn gauge(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}");
}

fn wait_summary(out: &mut String, mode: &str, p: &WaitPercentiles, sum_us: u64) {
    let name = format!("pressure_lab_lock_{mode}_wait_microseconds");
    let _ = writeln!(out, "# HELP {name} Time spent waiting for the {mode} lock");
    let _ = writeln!(out, "# TYPE {name} summary");
    for (q, v) in [("0.5", p.p50), ("0.95", p.p95), ("0.99", p.p99), ("1", p.max)] {
        let _ = writeln!(out, "{name}{{quantile=\"{q}\"}} {v}");
    }
    let _ = writeln!(out, "{name}_sum {sum_us}");
    let _ = writeln!(out, "{name}_count {}", p.count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapStats;

    #[test]
    fn test_counter_operations() {
        let m = Metrics::new();
        assert_eq!(m.get(&m.reads_total), 0);

        m.record_op(LockMode::Read);
        m.record_op(LockMode::Read);
        m.record_op(LockMode::Write);
        m.inc(&m.refused_total);

        assert_eq!(m.get(&m.reads_total), 2);
        assert_eq!(m.get(&m.writes_total), 1);
        assert_eq!(m.get(&m.refused_total), 1);
    }

    #[test]
    fn test_lock_wait_goes_to_mode_histogram() {
        let m = Metrics::new();
        let start = Instant::now();

        m.record_lock_wait(LockMode::Write, start);
        m.record_lock_wait(LockMode::Write, start);
        m.record_lock_wait(LockMode::Read, start);

        assert_eq!(m.write_wait.count(), 2);
        assert_eq!(m.read_wait.count(), 1);
    }

    #[test]
    fn test_last_sample_overwritten() {
        let m = Metrics::new();
        assert!(m.last_pool_sample().is_none());

        let first = PoolSample {
            pool_bytes: 10,
            heap: HeapStats::default(),
        };
        let second = PoolSample {
            pool_bytes: 20,
            ..first
        };
        m.record_pool_sample(first);
        m.record_pool_sample(second);

        assert_eq!(m.last_pool_sample(), Some(second));
        assert_eq!(m.get(&m.pool_samples), 2);
    }

    #[test]
    fn test_prometheus_output() {
        let m = Metrics::new();
        m.init_start_time();
        m.record_op(LockMode::Write);
        m.write_wait.record(40);

        let text = m.snapshot().to_prometheus_string();
        assert!(text.contains("pressure_lab_lock_writes_total 1"));
        assert!(text.contains("# TYPE pressure_lab_lock_write_wait_microseconds summary"));
        assert!(text.contains("pressure_lab_lock_write_wait_microseconds_count 1"));
        assert!(text.contains("pressure_lab_lock_write_wait_microseconds{quantile=\"1\"} 40"));
        // No pool sample yet, so no pool gauges.
        assert!(!text.contains("pressure_lab_pool_bytes"));

        m.record_pool_sample(PoolSample {
            pool_bytes: 2048,
            heap: HeapStats::default(),
        });
        let text = m.snapshot().to_prometheus_string();
        assert!(text.contains("pressure_lab_pool_bytes 2048"));
    }
}
