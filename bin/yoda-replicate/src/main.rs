//! Yoda replication driver
//!
//! Runs the replication batch job once and exits. Started by an external
//! periodic scheduler; exits 0 when the run completed, 1 when another
//! instance holds the lock and 2 on a fatal error.
//!
//! The job lock is taken before the catalog is opened, so a refused
//! instance never touches the catalog. The redb catalog is opened
//! exclusively: while a run is in progress, other processes using the same
//! catalog file (the cleanup driver, `yoda-cli`) fail to open it and exit 2.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yoda_common::config::DEFAULT_CONFIG_PATH;
use yoda_common::{Config, HostContext};
use yoda_host::LocalHost;
use yoda_jobs::{JobExit, JobLock, REPLICATION_JOB, ReplicationJob, ReplicationOptions, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "yoda-replicate")]
#[command(about = "Replicate data objects flagged for replication")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (overrides the configuration file)
    #[arg(long)]
    log_level: Option<String>,

    /// Upper bound on concurrent replications
    #[arg(long)]
    max_parallel: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config).and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("yoda-replicate: {e}");
            return JobExit::Failed.into();
        }
    };

    // Initialize logging
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
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
    let lock = match JobLock::acquire(&config.jobs.lock_dir, REPLICATION_JOB) {
        Ok(lock) => lock,
        Err(e) => {
            warn!(error = %e, "Replication already running");
            return Ok(JobExit::from_error(&e));
        }
    };

    let host = LocalHost::open(&config.host.catalog_path, config.host.revision_store())
        .with_context(|| format!("opening catalog {}", config.host.catalog_path.display()))?;
    let context = HostContext::new(&config.host.zone, &config.host.actor);

    let mut options = ReplicationOptions::from_config(config);
    if let Some(max_parallel) = args.max_parallel {
        options.max_parallel = max_parallel.max(1);
    }

    let job = ReplicationJob::new(Arc::new(host), context, options);
    match job.run_locked(&lock, &shutdown).await {
        Ok(report) => {
            for path in &report.malformed {
                info!(path = %path, "Malformed replication flag needs operator attention");
            }
            if report.interrupted() {
                return Ok(JobExit::Failed);
            }
            Ok(JobExit::Completed)
        }
        Err(e) => {
            error!(error = %e, "Replication run failed");
            Ok(JobExit::from_error(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use yoda_common::{ObjectPath, ResourceName, attrs};
    use yoda_host::Catalog;

    fn args() -> Args {
        Args {
            config: PathBuf::from("unused.toml"),
            log_level: None,
            max_parallel: None,
        }
    }

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.host.catalog_path = dir.path().join("catalog.redb");
        config.jobs.lock_dir = dir.path().to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_second_instance_exits_contended() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let _running =
            LocalHost::open(&config.host.catalog_path, config.host.revision_store()).unwrap();
        let _lock = JobLock::acquire(&config.jobs.lock_dir, REPLICATION_JOB).unwrap();

        let exit = run(&args(), &config).await.unwrap();
        assert_eq!(exit, JobExit::LockContended);
        assert_eq!(exit.code(), 1);
    }

    #[tokio::test]
    async fn test_refused_instance_leaves_catalog_unopened() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let _lock = JobLock::acquire(&config.jobs.lock_dir, REPLICATION_JOB).unwrap();

        let exit = run(&args(), &config).await.unwrap();
        assert_eq!(exit, JobExit::LockContended);
        assert!(!config.host.catalog_path.exists());
    }

    #[tokio::test]
    async fn test_run_replicates_and_releases_lock() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let path = ObjectPath::new("/tempZone/home/research-a/a.txt").unwrap();
        {
            let host =
                LocalHost::open(&config.host.catalog_path, config.host.revision_store()).unwrap();
            let src = ResourceName::new("src").unwrap();
            let dst = ResourceName::new("dst").unwrap();
            host.upsert_resource(&src, None, None).unwrap();
            host.upsert_resource(&dst, None, None).unwrap();
            host.create_data_object(&path, "alice", "research-a", 5, &src, 0)
                .unwrap();
            yoda_jobs::schedule_replication(&host, &path, &src, &dst)
                .await
                .unwrap();
        }

        let exit = run(&args(), &config).await.unwrap();
        assert_eq!(exit, JobExit::Completed);
        assert!(!JobLock::lock_path(&config.jobs.lock_dir, REPLICATION_JOB).exists());

        let host =
            LocalHost::open(&config.host.catalog_path, config.host.revision_store()).unwrap();
        assert_eq!(host.replicas(&path).unwrap(), vec!["src", "dst"]);
        assert!(
            host.data_objects_with_attribute(attrs::REPLICATION_SCHEDULED)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
