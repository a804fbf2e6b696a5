//! Yoda revision cleanup driver
//!
//! Applies the retention rule to the revision store once and exits with
//! 0 when the run completed, 1 when another instance holds the lock and 2
//! on a fatal error.
//!
//! The job lock is taken before the catalog is opened, so a refused
//! instance never touches the catalog. The redb catalog is opened
//! exclusively: while a run is in progress, other processes using the same
//! catalog file fail to open it and exit 2.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yoda_common::config::{DEFAULT_CONFIG_PATH, TailPolicy};
use yoda_common::{BucketCase, Config};
use yoda_host::LocalHost;
use yoda_jobs::{CLEANUP_JOB, CleanupParams, JobExit, JobLock, RevisionCleanupJob, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "yoda-revision-cleanup")]
#[command(about = "Thin out stored revisions according to a retention schedule")]
#[command(version)]
struct Args {
    /// End of the calendar day to anchor retention buckets on (epoch seconds)
    end_of_calendar_day: i64,

    /// Retention schedule: A, B or Simple
    bucket_case: BucketCase,

    /// Revisions-info entries per rule invocation
    #[arg(long)]
    batch_size: Option<usize>,

    /// Ask the retention rule to report every removed revision
    #[arg(short, long)]
    verbose: bool,

    /// Also process the final chunk instead of leaving it for the next run
    #[arg(long)]
    drain_tail: bool,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (overrides the configuration file)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config).and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("yoda-revision-cleanup: {e}");
            return JobExit::Failed.into();
        }
    };

    // Initialize logging; --verbose implies debug unless a level is given
    let level = args.log_level.clone().unwrap_or_else(|| {
        if args.verbose {
            "debug".to_string()
        } else {
            config.logging.level.clone()
        }
    });
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    yoda_jobs::metrics::register_metrics();

    match run(&args, &config).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            error!("{e:#}");
            JobExit::Failed.into()
        }
    }
}

async fn run(args: &Args, config: &Config) -> Result<JobExit> {
    let shutdown = Shutdown::on_signals().context("installing signal handlers")?;
    let lock = match JobLock::acquire(&config.jobs.lock_dir, CLEANUP_JOB) {
        Ok(lock) => lock,
        Err(e) => {
            warn!(error = %e, "Revision cleanup already running");
            return Ok(JobExit::from_error(&e));
        }
    };

    let host = LocalHost::open(&config.host.catalog_path, config.host.revision_store())
        .with_context(|| format!("opening catalog {}", config.host.catalog_path.display()))?;

    let params = CleanupParams {
        end_of_calendar_day: args.end_of_calendar_day,
        bucket_case: args.bucket_case,
        batch_size: args.batch_size.unwrap_or(config.revisions.batch_size),
        verbose: args.verbose,
        tail_policy: if args.drain_tail {
            TailPolicy::Drain
        } else {
            config.revisions.tail_policy
        },
    };

    let job = RevisionCleanupJob::new(Arc::new(host), &config.jobs.lock_dir);
    match job.run_locked(&lock, &params, &shutdown).await {
        Ok(report) if report.interrupted => Ok(JobExit::Failed),
        Ok(_) => Ok(JobExit::Completed),
        Err(e) => {
            error!(error = %e, "Revision cleanup failed");
            Ok(JobExit::from_error(&e))
        }
    }
}
