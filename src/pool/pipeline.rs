//! Wires a producer and a sampler together over a bounded channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::{PoolSampler, Producer, Reporter, SamplerReport};
use crate::config::Config;
use crate::error::Result;
use crate::heap::HeapStatsSource;
use crate::shutdown::Shutdown;

/// Sizing and timing for one producer/sampler pair.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub unit_size: usize,
    pub pool_capacity: usize,
    pub channel_capacity: usize,
    pub sample_interval: Duration,
    pub process_delay: Duration,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            unit_size: config.unit_size,
            pool_capacity: config.pool_capacity,
            channel_capacity: config.channel_capacity,
            sample_interval: config.sample_interval(),
            process_delay: config.process_delay(),
        }
    }
}

/// Final tallies of a finished pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineReport {
    pub units_produced: u64,
    pub units_received: u64,
    pub samples_emitted: u64,
    pub occupied_slots: usize,
    pub resident_bytes: u64,
}

/// Running producer/sampler pair.
pub struct Pipeline {
    producer: JoinHandle<u64>,
    sampler: JoinHandle<Result<SamplerReport>>,
}

impl Pipeline {
    /// Spawn both tasks. Each gets its own listener on the same done signal.
    pub fn spawn<H, R>(settings: &PipelineSettings, heap: H, reporter: R, shutdown: &Shutdown) -> Self
    where
        H: HeapStatsSource + 'static,
        R: Reporter + 'static,
    {
        let (tx, rx) = mpsc::channel(settings.channel_capacity);

        let producer = Producer::new(tx, settings.unit_size, shutdown.clone());
        let sampler = PoolSampler::new(
            rx,
            settings.pool_capacity,
            settings.sample_interval,
            settings.process_delay,
            heap,
            reporter,
            shutdown.clone(),
        );

        info!(
            "Pool pipeline: unit_size={} bytes, channel_capacity={}",
            settings.unit_size, settings.channel_capacity
        );

        Self {
            producer: tokio::spawn(producer.run()),
            sampler: tokio::spawn(sampler.run()),
        }
    }

    /// Wait for both tasks to finish.
    ///
    /// The sampler exiting for any reason drops the channel, which also stops
    /// the producer. Both handles are awaited before either outcome is
    /// inspected, so a failed sampler never leaves the producer detached.
    pub async fn join(self) -> Result<PipelineReport> {
        let sampler = self.sampler.await;
        let producer = self.producer.await;
        let sampler = sampler??;
        let units_produced = producer?;

        Ok(PipelineReport {
            units_produced,
            units_received: sampler.units_received,
            samples_emitted: sampler.samples_emitted,
            occupied_slots: sampler.ring.occupied(),
            resident_bytes: sampler.ring.resident_bytes(),
        })
    }
}
