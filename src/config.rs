use crate::error::{Error, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

/// One mebibyte.
pub const MIB: usize = 1024 * 1024;

/// Which workload the process runs.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Producer + circulating pool sampler
    Pool,
    /// Readers and writers looping against the shared resource until stopped
    Contend,
    /// One operation per reader/writer, then exit with a report
    ContendBounded,
}

/// pressure-lab - bounded memory-pressure sampler and lock contention harness
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Workload to run
    #[arg(short, long, value_enum, default_value = "pool")]
    pub mode: Mode,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Address for the HTTP inspection endpoint (disabled when unset)
    #[arg(long)]
    pub metrics_bind: Option<SocketAddr>,

    // === Pool settings ===

    /// Size of each produced unit in bytes
    #[arg(long, default_value = "1048576")]
    pub unit_size: usize,

    /// Number of slots in the circulating pool
    #[arg(long, default_value = "1024")]
    pub pool_capacity: usize,

    /// Capacity of the producer -> sampler channel
    #[arg(long, default_value = "1")]
    pub channel_capacity: usize,

    /// Sampling interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub sample_interval_ms: u64,

    /// Delay after storing each unit, in milliseconds
    #[arg(long, default_value = "200")]
    pub process_delay_ms: u64,

    /// Stop the pool workload after this many seconds (0 = run until signalled)
    #[arg(long, default_value = "0")]
    pub run_for_secs: u64,

    // === Contention settings ===

    /// Number of readers and, separately, of writers
    #[arg(short, long, default_value = "500")]
    pub population: usize,

    /// Upper bound (exclusive) of simulated work while holding the lock, in milliseconds
    #[arg(long, default_value = "10")]
    pub max_work_ms: u64,

    /// Seed for the master random source (random when unset)
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse_args() -> Self {
        Config::parse()
    }

    /// Reject values the workloads cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.unit_size == 0 {
            return Err(Error::InvalidConfig("unit-size must be > 0".into()));
        }
        if self.pool_capacity == 0 {
            return Err(Error::InvalidConfig("pool-capacity must be > 0".into()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::InvalidConfig("channel-capacity must be > 0".into()));
        }
        if self.sample_interval_ms == 0 {
            return Err(Error::InvalidConfig("sample-interval-ms must be > 0".into()));
        }
        if self.population == 0 {
            return Err(Error::InvalidConfig("population must be > 0".into()));
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn process_delay(&self) -> Duration {
        Duration::from_millis(self.process_delay_ms)
    }

    pub fn max_work(&self) -> Duration {
        Duration::from_millis(self.max_work_ms)
    }

    /// Wall-clock limit for the pool workload, if any.
    pub fn run_for(&self) -> Option<Duration> {
        (self.run_for_secs > 0).then(|| Duration::from_secs(self.run_for_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Pool,
            log_level: "info".to_string(),
            metrics_bind: None,
            unit_size: MIB,
            pool_capacity: 1024,
            channel_capacity: 1,
            sample_interval_ms: 1000,
            process_delay_ms: 200,
            run_for_secs: 0,
            population: 500,
            max_work_ms: 10,
            seed: None,
        }
    }
}
