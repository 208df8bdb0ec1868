//! Value behind a read/write lock, held for a random stretch on every access.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;
use tokio::time;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::metrics::{LockMode, METRICS};

/// Guarded state. A writer bumps `begun`, works, then bumps `finished`;
/// a reader that sees them differ has observed a half-finished write.
#[derive(Debug, Default)]
struct Ledger {
    begun: u64,
    finished: u64,
    closing: bool,
}

/// Counters describing how the resource has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStats {
    pub reads: u64,
    pub writes: u64,
    pub refused: u64,
    /// Acquisitions that overlapped a writer.
    pub violations: u64,
    pub torn_reads: u64,
    /// Most readers observed holding the lock at once.
    pub peak_readers: usize,
}

/// Shared resource that manufactures lock contention.
pub struct SharedResource {
    ledger: RwLock<Ledger>,
    max_work: Duration,
    holders: HolderTracker,
    closing: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    refused: AtomicU64,
    torn_reads: AtomicU64,
}

impl SharedResource {
    /// Each access holds the lock for a uniform random time in `[0, max_work)`,
    /// at millisecond granularity.
    pub fn new(max_work: Duration) -> Self {
        Self {
            ledger: RwLock::new(Ledger::default()),
            max_work,
            holders: HolderTracker::default(),
            closing: AtomicBool::new(false),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            refused: AtomicU64::new(0),
            torn_reads: AtomicU64::new(0),
        }
    }

    /// Take exclusive access and simulate work.
    ///
    /// Returns [`Error::ResourceClosed`] without working once [`close`](Self::close) has run.
    pub async fn write<G: Rng>(&self, rng: &mut G) -> Result<()> {
        let work = self.work_duration(rng);

        let start = Instant::now();
        let mut ledger = self.ledger.write().await;
        METRICS.record_lock_wait(LockMode::Write, start);

        if ledger.closing {
            return Err(self.refuse());
        }

        // Declared after the guard so it drops first: the holder count is
        // back down before the lock is released.
        let _holder = self.holders.enter(LockMode::Write);

        {
            // Closes the ledger entry even if this future is dropped mid-sleep.
            let _pending = PendingWrite::begin(&mut ledger);
            time::sleep(work).await;
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        METRICS.record_op(LockMode::Write);
        Ok(())
    }

    /// Take shared access and simulate work.
    ///
    /// Returns [`Error::ResourceClosed`] without working once [`close`](Self::close) has run.
    pub async fn read<G: Rng>(&self, rng: &mut G) -> Result<()> {
        let work = self.work_duration(rng);

        let start = Instant::now();
        let ledger = self.ledger.read().await;
        METRICS.record_lock_wait(LockMode::Read, start);

        if ledger.closing {
            return Err(self.refuse());
        }

        let _holder = self.holders.enter(LockMode::Read);

        if ledger.begun != ledger.finished {
            self.torn_reads.fetch_add(1, Ordering::Relaxed);
            METRICS.inc(&METRICS.torn_reads);
            warn!(
                "Read observed partial write (begun={}, finished={})",
                ledger.begun, ledger.finished
            );
        }
        time::sleep(work).await;

        self.reads.fetch_add(1, Ordering::Relaxed);
        METRICS.record_op(LockMode::Read);
        Ok(())
    }

    /// Refuse all later readers and writers.
    ///
    /// Waits for current holders to finish. Idempotent.
    pub async fn close(&self) {
        let mut ledger = self.ledger.write().await;
        if !ledger.closing {
            ledger.closing = true;
            self.closing.store(true, Ordering::Release);
            info!("Shared resource closed after {} writes", ledger.finished);
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
            violations: self.holders.violations.load(Ordering::Relaxed),
            torn_reads: self.torn_reads.load(Ordering::Relaxed),
            peak_readers: self.holders.peak_readers.load(Ordering::Relaxed),
        }
    }

    fn refuse(&self) -> Error {
        self.refused.fetch_add(1, Ordering::Relaxed);
        METRICS.inc(&METRICS.refused_total);
        Error::ResourceClosed
    }

    fn work_duration<G: Rng>(&self, rng: &mut G) -> Duration {
        let bound = self.max_work.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng.gen_range(0..bound))
    }
}

/// Open ledger entry for one write; finishes it on drop.
struct PendingWrite<'a> {
    ledger: &'a mut Ledger,
}

impl<'a> PendingWrite<'a> {
    fn begin(ledger: &'a mut Ledger) -> Self {
        ledger.begun += 1;
        Self { ledger }
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        self.ledger.finished += 1;
    }
}

/// Counts who currently holds the lock and flags impossible overlaps.
#[derive(Debug, Default)]
struct HolderTracker {
    readers: AtomicUsize,
    writers: AtomicUsize,
    peak_readers: AtomicUsize,
    violations: AtomicU64,
}

impl HolderTracker {
    fn enter(&self, mode: LockMode) -> HolderToken<'_> {
        let overlap = match mode {
            LockMode::Write => {
                let writers = self.writers.fetch_add(1, Ordering::SeqCst) + 1;
                writers > 1 || self.readers.load(Ordering::SeqCst) > 0
            }
            LockMode::Read => {
                let readers = self.readers.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak_readers.fetch_max(readers, Ordering::Relaxed);
                self.writers.load(Ordering::SeqCst) > 0
            }
        };

        if overlap {
            self.violations.fetch_add(1, Ordering::Relaxed);
            METRICS.inc(&METRICS.holder_violations);
            warn!("{:?} access overlapped a writer", mode);
        }

        HolderToken {
            tracker: self,
            mode,
        }
    }
}

struct HolderToken<'a> {
    tracker: &'a HolderTracker,
    mode: LockMode,
}

impl Drop for HolderToken<'_> {
    fn drop(&mut self) {
        let counter = match self.mode {
            LockMode::Read => &self.tracker.readers,
            LockMode::Write => &self.tracker.writers,
        };
        counter.fetch_sub(1, Ordering::SeqCst);
    }
}
