//! Sampling snapshots and where they go.

use std::io::{self, Write};

use crate::config::MIB;
use crate::heap::HeapStats;

/// Column header emitted once before the first sample.
pub const CSV_HEADER: &str =
    "HeapSys(bytes),PoolSize(MiB),HeapAlloc(MiB),HeapInuse(MiB),HeapIdle(bytes),HeapReleased(bytes)";

/// Immutable snapshot taken on a sampling tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSample {
    /// Bytes held by resident pool units.
    pub pool_bytes: u64,
    pub heap: HeapStats,
}

impl PoolSample {
    /// Format as one CSV line (no trailing newline).
    pub fn to_csv_line(&self) -> String {
        format!(
            "{:9},{:9.2},{:9.2},{:9.2},{:9},{:9}",
            self.heap.system,
            to_mib(self.pool_bytes),
            to_mib(self.heap.allocated),
            to_mib(self.heap.in_use),
            self.heap.idle,
            self.heap.released,
        )
    }
}

#[inline]
fn to_mib(bytes: u64) -> f64 {
    bytes as f64 / MIB as f64
}

/// Receives snapshots from the sampler.
pub trait Reporter: Send {
    /// Called once before the first sample.
    fn header(&mut self) -> io::Result<()>;

    fn sample(&mut self, sample: &PoolSample) -> io::Result<()>;
}

/// Writes CSV lines to any [`Write`] sink.
pub struct CsvReporter<W> {
    out: W,
}

impl<W: Write + Send> CsvReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Give back the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl CsvReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> Reporter for CsvReporter<W> {
    fn header(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", CSV_HEADER)?;
        self.out.flush()
    }

    fn sample(&mut self, sample: &PoolSample) -> io::Result<()> {
        writeln!(self.out, "{}", sample.to_csv_line())?;
        self.out.flush()
    }
}
