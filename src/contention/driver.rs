//! Spawns reader and writer populations against a [`SharedResource`].

use std::sync::Arc;

use rand::rngs::{SmallRng, StdRng};
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::{ResourceStats, SharedResource};
use crate::error::{Error, Result};
use crate::metrics::LockMode;

/// Outcome of a bounded run.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    /// Tasks that finished, successful or refused.
    pub completed: u64,
    /// Tasks that found the resource closed.
    pub refused: u64,
    pub stats: ResourceStats,
}

/// Orchestrates readers and writers.
///
/// Every task gets its own [`SmallRng`] seeded from one master [`StdRng`].
pub struct ContentionDriver {
    resource: Arc<SharedResource>,
    population: usize,
    master: StdRng,
}

impl ContentionDriver {
    /// `population` readers and `population` writers. With a `seed` the
    /// work durations are reproducible.
    pub fn new(resource: Arc<SharedResource>, population: usize, seed: Option<u64>) -> Self {
        let master = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            resource,
            population,
            master,
        }
    }

    pub fn resource(&self) -> &Arc<SharedResource> {
        &self.resource
    }

    fn task_rng(&mut self) -> SmallRng {
        SmallRng::seed_from_u64(self.master.gen())
    }

    /// Run one operation per task and wait for all `2 * population` to finish.
    ///
    /// Never returns before every task is done. A panicking task is reported
    /// after the rest have been drained.
    pub async fn run_bounded(&mut self) -> Result<RunReport> {
        let mut tasks = JoinSet::new();
        for _ in 0..self.population {
            for mode in [LockMode::Write, LockMode::Read] {
                let resource = self.resource.clone();
                let mut rng = self.task_rng();
                tasks.spawn(async move {
                    match mode {
                        LockMode::Write => resource.write(&mut rng).await,
                        LockMode::Read => resource.read(&mut rng).await,
                    }
                });
            }
        }
        info!(
            "Bounded contention run: {} writers, {} readers",
            self.population, self.population
        );

        let mut completed = 0u64;
        let mut refused = 0u64;
        let mut failure = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => completed += 1,
                Ok(Err(Error::ResourceClosed)) => {
                    completed += 1;
                    refused += 1;
                }
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(Error::from(e));
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let report = RunReport {
            completed,
            refused,
            stats: self.resource.stats(),
        };
        info!(
            "Bounded contention run finished: {} operations, {} violations",
            report.completed, report.stats.violations
        );
        Ok(report)
    }

    /// Spawn tasks that loop forever until the resource is closed.
    pub fn spawn_unbounded(&mut self) -> UnboundedRun {
        let mut tasks = JoinSet::new();
        for _ in 0..self.population {
            for mode in [LockMode::Write, LockMode::Read] {
                let resource = self.resource.clone();
                let mut rng = self.task_rng();
                tasks.spawn(async move {
                    let mut ops = 0u64;
                    loop {
                        let res = match mode {
                            LockMode::Write => resource.write(&mut rng).await,
                            LockMode::Read => resource.read(&mut rng).await,
                        };
                        if res.is_err() {
                            break;
                        }
                        ops += 1;
                    }
                    debug!("{:?} loop stopped after {} operations", mode, ops);
                    ops
                });
            }
        }
        info!(
            "Sustained contention: {} writers, {} readers",
            self.population, self.population
        );

        UnboundedRun { tasks }
    }
}

/// Handle to a running unbounded population.
pub struct UnboundedRun {
    tasks: JoinSet<u64>,
}

impl UnboundedRun {
    /// Tasks still running.
    pub fn active(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every task to stop. Returns the operations they completed.
    ///
    /// Only returns after the resource has been closed.
    pub async fn wait(mut self) -> Result<u64> {
        let mut total = 0u64;
        while let Some(joined) = self.tasks.join_next().await {
            total += joined?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn driver(population: usize, max_work_ms: u64) -> ContentionDriver {
        let resource = Arc::new(SharedResource::new(Duration::from_millis(max_work_ms)));
        ContentionDriver::new(resource, population, Some(42))
    }

    #[tokio::test]
    async fn test_bounded_single_pair() {
        let mut driver = driver(1, 2);
        let report = driver.run_bounded().await.unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(report.refused, 0);
        assert_eq!(report.stats.reads, 1);
        assert_eq!(report.stats.writes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bounded_completes_every_operation() {
        for population in [1usize, 3, 17, 64] {
            let mut driver = driver(population, 1);
            let report = driver.run_bounded().await.unwrap();

            assert_eq!(report.completed, 2 * population as u64);
            assert_eq!(report.stats.reads, population as u64);
            assert_eq!(report.stats.writes, population as u64);
            assert_eq!(report.stats.violations, 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bounded_500_readers_500_writers() {
        let mut driver = driver(500, 10);
        let report = tokio::time::timeout(Duration::from_secs(60), driver.run_bounded())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.completed, 1000);
        assert_eq!(report.stats.violations, 0);
        assert_eq!(report.stats.torn_reads, 0);
    }

    #[tokio::test]
    async fn test_bounded_after_close_counts_refusals() {
        let mut driver = driver(4, 0);
        driver.resource().close().await;

        let report = driver.run_bounded().await.unwrap();
        assert_eq!(report.completed, 8);
        assert_eq!(report.refused, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unbounded_runs_until_closed() {
        let mut driver = driver(8, 2);
        let run = driver.spawn_unbounded();
        assert_eq!(run.active(), 16);

        tokio::time::sleep(Duration::from_millis(100)).await;
        driver.resource().close().await;

        let ops = tokio::time::timeout(Duration::from_secs(5), run.wait())
            .await
            .unwrap()
            .unwrap();
        let stats = driver.resource().stats();
        assert!(ops > 0);
        assert_eq!(ops, stats.reads + stats.writes);
        assert_eq!(stats.violations, 0);
    }
}
