//! ordo-bench: drive a synthetic workload through the scheduler and report metrics.

use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ordo_core::config::{load_dotenv, Config};
use ordo_core::{OrdoError, Priority, TaskId};
use ordo_scheduler::{Scheduler, Task};

// ── CLI ─────────────────────────────────────────────────────────────

/// Synthetic load generator for the ordo task scheduler.
#[derive(Parser, Debug)]
#[command(name = "ordo-bench", version, about)]
struct Cli {
    /// Path to an ordo.toml config file.
    #[arg(long, env = "ORDO_CONFIG", default_value = "config/ordo.toml")]
    config: String,

    /// Override the configured worker thread count.
    #[arg(long)]
    workers: Option<usize>,

    /// Number of tasks to submit.
    #[arg(long, default_value_t = 1000)]
    tasks: usize,

    /// Every Nth task depends on the task submitted just before it (0 = none).
    #[arg(long, default_value_t = 0)]
    chain: usize,

    /// Milliseconds each task sleeps.
    #[arg(long, default_value_t = 1)]
    work_ms: u64,

    /// Stop with an immediate shutdown instead of draining the backlog.
    #[arg(long)]
    immediate: bool,

    /// Print the metrics snapshot as JSON.
    #[arg(long)]
    json: bool,
}

/// Load the TOML config, falling back to the environment. The error is
/// returned so it can be logged once tracing is installed.
fn load_config(path: &str) -> (Config, Option<OrdoError>) {
    match Config::from_file(path) {
        Ok(config) => (config, None),
        Err(e) => {
            load_dotenv();
            (Config::from_env(), Some(e))
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (mut config, load_error) = load_config(&cli.config);
    if let Some(workers) = cli.workers {
        config.scheduler.worker_threads = workers;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();
    if let Some(e) = load_error {
        warn!(path = %cli.config, error = %e, "config file not loaded, using environment");
    }
    config.log_summary();

    let scheduler = Scheduler::builder()
        .config(config.scheduler.clone())
        .on_task_failure(|failure| {
            warn!(task = %failure.id, error = %failure.error, "bench task failed");
        })
        .build();
    scheduler.start()?;

    let work = Duration::from_millis(cli.work_ms);
    let started = Instant::now();
    let mut previous = TaskId::UNASSIGNED;

    for i in 0..cli.tasks {
        let priority = Priority::ALL[i % Priority::ALL.len()];
        let mut task = Task::new(move || std::thread::sleep(work))
            .named(format!("bench-{i}"))
            .with_priority(priority);
        if i % 10 == 0 {
            task = task.with_timeout(Duration::from_millis(50 + (i % 7) as u64 * 25));
        }
        if cli.chain > 0 && i % cli.chain == 0 && previous.is_assigned() {
            task = task.after([previous]);
        }
        previous = scheduler.submit(task)?;
    }
    info!(
        tasks = cli.tasks,
        ready = scheduler.ready_count(),
        waiting = scheduler.waiting_count(),
        "workload submitted"
    );

    if cli.immediate {
        scheduler.shutdown_immediate();
    } else {
        scheduler.shutdown_graceful();
    }
    let elapsed = started.elapsed();

    let snapshot = scheduler.metrics_snapshot();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("elapsed:    {:.1} ms", elapsed.as_secs_f64() * 1000.0);
        println!("completed:  {}", snapshot.completed_tasks);
        println!("failed:     {}", snapshot.failed_tasks);
        println!("cancelled:  {}", snapshot.cancelled_tasks);
        println!(
            "exec ms:    min {:.3} / avg {:.3} / max {:.3}",
            snapshot.min_execution_time_ms,
            snapshot.avg_execution_time_ms,
            snapshot.max_execution_time_ms
        );
    }
    Ok(())
}
