//! Circulating memory-pressure pool.
//!
//! A [`Producer`] allocates fixed-size units into a bounded channel; a
//! [`PoolSampler`] stores them in a [`RingPool`] and reports a [`PoolSample`]
//! on every tick. The channel provides backpressure: a slow sampler parks the
//! producer instead of letting units pile up.

mod pipeline;
mod producer;
mod report;
mod ring;
mod sampler;
mod unit;

pub use pipeline::{Pipeline, PipelineReport, PipelineSettings};
pub use producer::Producer;
pub use report::{CsvReporter, PoolSample, Reporter, CSV_HEADER};
pub use ring::RingPool;
pub use sampler::{PoolSampler, SamplerReport};
pub use unit::ResourceUnit;
