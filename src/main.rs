use std::sync::Arc;
use std::time::Duration;

use pressure_lab::config::{Config, Mode};
use pressure_lab::contention::{ContentionDriver, SharedResource};
use pressure_lab::heap::{TrackingAllocator, TrackingHeap};
use pressure_lab::metrics::server::run_metrics_server;
use pressure_lab::metrics::METRICS;
use pressure_lab::pool::{CsvReporter, Pipeline, PipelineSettings};
use pressure_lab::shutdown::{self, Shutdown, ShutdownTrigger};

use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration
    let config = Config::parse_args();

    // Initialize tracing; stdout carries the sample lines
    let log_level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    config.validate()?;
    METRICS.init_start_time();

    info!("pressure-lab v{}", env!("CARGO_PKG_VERSION"));
    info!("Mode: {:?}", config.mode);

    let (trigger, done) = shutdown::channel();

    // Start the inspection endpoint if requested
    if let Some(addr) = config.metrics_bind {
        let listener = done.clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, listener).await {
                error!("Inspection endpoint on {} failed: {}", addr, e);
            }
        });
    }

    match config.mode {
        Mode::Pool => run_pool(&config, trigger, &done).await?,
        Mode::Contend => run_contend(&config, trigger).await?,
        Mode::ContendBounded => run_contend_bounded(&config).await?,
    }

    info!("Done");
    Ok(())
}

async fn run_pool(
    config: &Config,
    trigger: ShutdownTrigger,
    done: &Shutdown,
) -> pressure_lab::Result<()> {
    let settings = PipelineSettings::from(config);
    let pipeline = Pipeline::spawn(&settings, TrackingHeap, CsvReporter::stdout(), done);

    let join = pipeline.join();
    tokio::pin!(join);

    let report = tokio::select! {
        // The sampler stopped on its own (e.g. stdout went away)
        report = &mut join => report,
        _ = shutdown::wait_for_signal() => {
            trigger.trigger();
            join.await
        }
        _ = stop_after(config.run_for()) => {
            info!("Run time elapsed");
            trigger.trigger();
            join.await
        }
    }?;

    info!(
        "Pool run finished: {} produced, {} stored, {} samples, {} slots occupied ({} bytes)",
        report.units_produced,
        report.units_received,
        report.samples_emitted,
        report.occupied_slots,
        report.resident_bytes
    );
    Ok(())
}

async fn run_contend(config: &Config, trigger: ShutdownTrigger) -> pressure_lab::Result<()> {
    let resource = Arc::new(SharedResource::new(config.max_work()));
    let mut driver = ContentionDriver::new(resource.clone(), config.population, config.seed);

    let run = driver.spawn_unbounded();
    if config.metrics_bind.is_none() {
        warn!("No --metrics-bind given; contention is running with nothing to inspect it");
    }

    shutdown::wait_for_signal().await;
    info!("Draining {} contending tasks", run.active());
    resource.close().await;
    trigger.trigger();

    let ops = run.wait().await?;
    let stats = resource.stats();
    info!(
        "Contention stopped: {} operations ({} reads, {} writes), {} violations, peak {} concurrent readers",
        ops, stats.reads, stats.writes, stats.violations, stats.peak_readers
    );
    Ok(())
}

async fn run_contend_bounded(config: &Config) -> pressure_lab::Result<()> {
    let resource = Arc::new(SharedResource::new(config.max_work()));
    let mut driver = ContentionDriver::new(resource, config.population, config.seed);

    let report = driver.run_bounded().await?;
    if report.stats.violations > 0 || report.stats.torn_reads > 0 {
        warn!(
            "Lock exclusivity broken: {} violations, {} torn reads",
            report.stats.violations, report.stats.torn_reads
        );
    }
    info!(
        "{} operations completed, peak {} concurrent readers",
        report.completed, report.stats.peak_readers
    );
    Ok(())
}

async fn stop_after(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}
