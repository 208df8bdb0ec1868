//! Consumer loop that fills the ring pool and samples it on a timer.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{PoolSample, Reporter, ResourceUnit, RingPool};
use crate::error::Result;
use crate::heap::HeapStatsSource;
use crate::metrics::METRICS;
use crate::shutdown::Shutdown;

/// What the sampler did before it stopped.
pub struct SamplerReport {
    /// The ring as it was when the loop exited.
    pub ring: RingPool,
    pub units_received: u64,
    pub samples_emitted: u64,
}

/// Single-task consumer: stores received units and emits periodic snapshots.
pub struct PoolSampler<H, R> {
    rx: mpsc::Receiver<ResourceUnit>,
    ring: RingPool,
    interval: Duration,
    process_delay: Duration,
    heap: H,
    reporter: R,
    shutdown: Shutdown,
}

impl<H, R> PoolSampler<H, R>
where
    H: HeapStatsSource,
    R: Reporter,
{
    pub fn new(
        rx: mpsc::Receiver<ResourceUnit>,
        capacity: usize,
        interval: Duration,
        process_delay: Duration,
        heap: H,
        reporter: R,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            rx,
            ring: RingPool::new(capacity),
            interval,
            process_delay,
            heap,
            reporter,
            shutdown,
        }
    }

    /// Run until shutdown fires or the channel closes.
    ///
    /// Neither exit path takes a final sample. Reporter I/O errors end the loop.
    pub async fn run(mut self) -> Result<SamplerReport> {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut units_received = 0u64;
        let mut samples_emitted = 0u64;

        self.reporter.header()?;
        info!(
            "Pool sampler started: capacity={}, interval={:?}, delay={:?}",
            self.ring.capacity(),
            self.interval,
            self.process_delay
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    debug!("Pool sampler cancelled");
                    break;
                }

                unit = self.rx.recv() => {
                    let Some(unit) = unit else {
                        debug!("Producer channel closed");
                        break;
                    };
                    self.ring.push(unit);
                    units_received += 1;
                    METRICS.inc(&METRICS.pool_units_received);

                    if !self.process_delay.is_zero() {
                        tokio::select! {
                            _ = self.shutdown.recv() => break,
                            _ = time::sleep(self.process_delay) => {}
                        }
                    }
                }

                _ = ticker.tick() => {
                    let sample = self.sample();
                    self.reporter.sample(&sample)?;
                    METRICS.record_pool_sample(sample);
                    samples_emitted += 1;
                }
            }
        }

        info!(
            "Pool sampler stopped: {} units received, {} samples emitted",
            units_received, samples_emitted
        );

        Ok(SamplerReport {
            ring: self.ring,
            units_received,
            samples_emitted,
        })
    }

    fn sample(&self) -> PoolSample {
        PoolSample {
            pool_bytes: self.ring.resident_bytes(),
            heap: self.heap.read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapStats;
    use crate::shutdown;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Collect {
        headers: Arc<Mutex<usize>>,
        samples: Arc<Mutex<Vec<PoolSample>>>,
    }

    impl Reporter for Collect {
        fn header(&mut self) -> io::Result<()> {
            *self.headers.lock() += 1;
            Ok(())
        }

        fn sample(&mut self, sample: &PoolSample) -> io::Result<()> {
            self.samples.lock().push(*sample);
            Ok(())
        }
    }

    fn fixed_heap() -> HeapStats {
        HeapStats {
            system: 100,
            allocated: 40,
            in_use: 60,
            idle: 40,
            released: 0,
        }
    }

    #[tokio::test]
    async fn test_ring_holds_latest_units() {
        let (_trigger, listener) = shutdown::channel();
        let (tx, rx) = mpsc::channel(1);
        let collect = Collect::default();
        let sampler = PoolSampler::new(
            rx,
            2,
            Duration::from_secs(3600),
            Duration::ZERO,
            fixed_heap,
            collect.clone(),
            listener,
        );
        let handle = tokio::spawn(sampler.run());

        for seq in 0..5 {
            tx.send(ResourceUnit::new(seq, 10)).await.unwrap();
        }
        drop(tx);

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.units_received, 5);
        assert_eq!(report.ring.get(0).unwrap().seq(), 4);
        assert_eq!(report.ring.get(1).unwrap().seq(), 3);
        assert_eq!(report.ring.resident_bytes(), 20);

        // Channel closure is not a data event: no sample was taken.
        assert_eq!(report.samples_emitted, 0);
        assert_eq!(*collect.headers.lock(), 1);
        assert!(collect.samples.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_one_sample_per_tick() {
        let (trigger, listener) = shutdown::channel();
        let (_tx, rx) = mpsc::channel::<ResourceUnit>(1);
        let collect = Collect::default();
        let sampler = PoolSampler::new(
            rx,
            4,
            Duration::from_secs(1),
            Duration::ZERO,
            fixed_heap,
            collect.clone(),
            listener,
        );
        let handle = tokio::spawn(sampler.run());

        time::sleep(Duration::from_millis(3500)).await;
        trigger.trigger();

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.samples_emitted, 3);

        let samples = collect.samples.lock();
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| s.pool_bytes == 0 && s.heap == fixed_heap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_processing_delay() {
        let (trigger, listener) = shutdown::channel();
        let (tx, rx) = mpsc::channel(1);
        let sampler = PoolSampler::new(
            rx,
            4,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            fixed_heap,
            Collect::default(),
            listener,
        );
        let handle = tokio::spawn(sampler.run());

        tx.send(ResourceUnit::new(0, 10)).await.unwrap();
        // Wait until the sampler has taken the unit and parked in its delay.
        while tx.capacity() < tx.max_capacity() {
            tokio::task::yield_now().await;
        }
        trigger.trigger();

        let report = time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.units_received, 1);
        assert_eq!(report.ring.occupied(), 1);
    }

    #[tokio::test]
    async fn test_reporter_error_stops_loop() {
        struct Broken;
        impl Reporter for Broken {
            fn header(&mut self) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn sample(&mut self, _: &PoolSample) -> io::Result<()> {
                Ok(())
            }
        }

        let (_trigger, listener) = shutdown::channel();
        let (_tx, rx) = mpsc::channel(1);
        let sampler = PoolSampler::new(
            rx,
            4,
            Duration::from_millis(10),
            Duration::ZERO,
            fixed_heap,
            Broken,
            listener,
        );

        assert!(sampler.run().await.is_err());
    }
}
