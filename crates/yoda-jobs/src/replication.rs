//! Replication batch job
//!
//! Drains `replication_scheduled` flags. Each flag value names a source
//! and a destination resource; the job asks the host to replicate the
//! object, then removes exactly that flag value. A failed replication
//! leaves the flag for the next run, and a malformed value stays until an
//! operator fixes it.

use crate::lock::{JobLock, REPLICATION_JOB};
use crate::metrics::record_replication_item;
use crate::shutdown::Shutdown;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use yoda_common::{
    AclLevel, Avu, Config, Error, FlaggedObject, HostContext, ObjectPath, ObjectType,
    ReplicationFlag, ResourceName, Result, attrs,
};
use yoda_host::{Catalog, Host};

/// Request replication of `path` from `from` to `to`.
///
/// Adding a flag that is already present leaves a single copy.
pub async fn schedule_replication<H: Catalog + ?Sized>(
    host: &H,
    path: &ObjectPath,
    from: &ResourceName,
    to: &ResourceName,
) -> Result<()> {
    let flag = ReplicationFlag::new(from.clone(), to.clone());
    host.add_data_object_metadata(path, &Avu::new(attrs::REPLICATION_SCHEDULED, flag.value()))
        .await?;
    info!(path = %path, from = %from, to = %to, "Replication scheduled");
    Ok(())
}

/// Tunables of a replication run
#[derive(Clone, Debug)]
pub struct ReplicationOptions {
    /// Upper bound on concurrent replication calls
    pub max_parallel: usize,
    /// Pass the admin flag to the replication microservice
    pub admin_mode: bool,
    /// Level granted to the job actor before clearing a flag
    pub acl_level: AclLevel,
    pub lock_dir: PathBuf,
}

impl ReplicationOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_parallel: config.replication.max_parallel.max(1),
            admin_mode: config.replication.admin_mode,
            acl_level: config.replication.acl_level,
            lock_dir: config.jobs.lock_dir.clone(),
        }
    }
}

/// Outcome counts of one run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Flags found at the start of the run
    pub scheduled: usize,
    /// Replicated and cleared
    pub replicated: usize,
    /// Left in place for the next run
    pub failed: usize,
    /// Paths whose flag value could not be parsed
    pub malformed: Vec<String>,
    /// Not started because the run was interrupted
    pub cancelled: usize,
}

impl ReplicationReport {
    #[must_use]
    pub const fn interrupted(&self) -> bool {
        self.cancelled > 0
    }
}

enum ItemOutcome {
    Replicated,
    Failed,
    Malformed(String),
    Cancelled,
}

/// Singleton job draining the replication queue
pub struct ReplicationJob<H: ?Sized> {
    host: Arc<H>,
    context: HostContext,
    options: ReplicationOptions,
}

impl<H: Host + ?Sized> ReplicationJob<H> {
    pub const fn new(host: Arc<H>, context: HostContext, options: ReplicationOptions) -> Self {
        Self {
            host,
            context,
            options,
        }
    }

    /// Run once over every flag present in the catalog.
    ///
    /// Fails only when the lock is held elsewhere or the flags cannot be
    /// enumerated; the lock is released on every return path.
    pub async fn run(&self, shutdown: &Shutdown) -> Result<ReplicationReport> {
        let lock = JobLock::acquire(&self.options.lock_dir, REPLICATION_JOB)?;
        self.run_locked(&lock, shutdown).await
    }

    /// Run under a lock the caller already holds
    pub async fn run_locked(&self, lock: &JobLock, shutdown: &Shutdown) -> Result<ReplicationReport> {
        lock.ensure_guards(&self.options.lock_dir, REPLICATION_JOB)?;

        let work = self
            .host
            .data_objects_with_attribute(attrs::REPLICATION_SCHEDULED)
            .await
            .map_err(Error::enumeration)?;
        info!(
            items = work.len(),
            max_parallel = self.options.max_parallel,
            "Replication run started"
        );

        let outcomes: Vec<ItemOutcome> = stream::iter(work.iter())
            .map(|item| self.process(item, shutdown))
            .buffer_unordered(self.options.max_parallel.max(1))
            .collect()
            .await;

        let mut report = ReplicationReport {
            scheduled: work.len(),
            ..ReplicationReport::default()
        };
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Replicated => report.replicated += 1,
                ItemOutcome::Failed => report.failed += 1,
                ItemOutcome::Malformed(path) => report.malformed.push(path),
                ItemOutcome::Cancelled => report.cancelled += 1,
            }
        }
        report.malformed.sort();

        if report.interrupted() {
            warn!(cancelled = report.cancelled, "Replication run interrupted");
        }
        info!(
            scheduled = report.scheduled,
            replicated = report.replicated,
            failed = report.failed,
            malformed = report.malformed.len(),
            "Replication run finished"
        );
        Ok(report)
    }

    async fn process(&self, item: &FlaggedObject, shutdown: &Shutdown) -> ItemOutcome {
        if shutdown.is_triggered() {
            record_replication_item("cancelled");
            return ItemOutcome::Cancelled;
        }
        let path = item.path();

        let flag: ReplicationFlag = match item.value.parse() {
            Ok(flag) => flag,
            Err(_) => {
                let err = Error::MalformedFlag {
                    path: path.to_string(),
                    value: item.value.clone(),
                };
                warn!(path = %path, error = %err, "Skipping item, flag left in place");
                record_replication_item("malformed");
                return ItemOutcome::Malformed(path.to_string());
            }
        };

        if let Err(e) = self
            .host
            .data_obj_repl(&path, &flag.from, &flag.to, self.options.admin_mode)
            .await
        {
            warn!(
                path = %path,
                from = %flag.from,
                to = %flag.to,
                error = %e,
                "Replication failed, will retry next run"
            );
            record_replication_item("failed");
            return ItemOutcome::Failed;
        }

        if let Err(e) = self.clear_flag(&path, &item.value).await {
            warn!(path = %path, error = %e, "Replicated but flag not cleared, will retry next run");
            record_replication_item("failed");
            return ItemOutcome::Failed;
        }

        debug!(path = %path, from = %flag.from, to = %flag.to, "Replicated");
        record_replication_item("replicated");
        ItemOutcome::Replicated
    }

    /// Grant the actor access on this one object if needed, then remove the
    /// exact flag value that was processed
    async fn clear_flag(&self, path: &ObjectPath, value: &str) -> Result<()> {
        let actor = &self.context.actor;
        let level = self.host.access_level(actor, path).await?;
        if level < self.options.acl_level {
            debug!(path = %path, actor = %actor, level = %self.options.acl_level, "Elevating access");
            self.host
                .acl_set_sudo(false, self.options.acl_level, actor, path)
                .await?;
        }
        self.host
            .metadata_remove_sudo(
                path,
                ObjectType::DataObject,
                &Avu::new(attrs::REPLICATION_SCHEDULED, value),
            )
            .await?;
        Ok(())
    }
}
