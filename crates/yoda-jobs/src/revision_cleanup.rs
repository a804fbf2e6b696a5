//! Revision cleanup batch job
//!
//! Hands the revisions-info list to the host's retention rule one chunk at
//! a time. The rule decides which revisions go; this job only chunks,
//! encodes and sequences the calls. Progress is not persisted: cleaned
//! revisions simply stop showing up in the next run.

use crate::lock::{CLEANUP_JOB, JobLock};
use crate::metrics::record_revision_chunk;
use crate::shutdown::Shutdown;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use yoda_common::config::TailPolicy;
use yoda_common::{BucketCase, Error, Result, RevisionsInfo};
use yoda_host::Host;
use yoda_host::rule::CleanupRequest;

/// Inputs of one cleanup run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupParams {
    /// Epoch seconds anchoring every bucket
    pub end_of_calendar_day: i64,
    pub bucket_case: BucketCase,
    /// Entries per rule invocation
    pub batch_size: usize,
    pub verbose: bool,
    pub tail_policy: TailPolicy,
}

/// Outcome counts of one run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Revisions-info entries found at the start of the run
    pub entries: usize,
    /// Rule invocations that completed
    pub chunks: usize,
    /// Entries handed to the rule
    pub processed: usize,
    /// Entries left for a later run
    pub remaining: usize,
    pub interrupted: bool,
}

/// Singleton job applying the retention rule to the revision store
pub struct RevisionCleanupJob<H: ?Sized> {
    host: Arc<H>,
    lock_dir: PathBuf,
}

impl<H: Host + ?Sized> RevisionCleanupJob<H> {
    pub fn new(host: Arc<H>, lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            host,
            lock_dir: lock_dir.into(),
        }
    }

    /// Run once over the current revisions-info list.
    ///
    /// A failing rule call ends the run with an error; chunks completed
    /// before it stay completed and the lock is released.
    pub async fn run(&self, params: &CleanupParams, shutdown: &Shutdown) -> Result<CleanupReport> {
        let lock = JobLock::acquire(&self.lock_dir, CLEANUP_JOB)?;
        self.run_locked(&lock, params, shutdown).await
    }

    /// Run under a lock the caller already holds
    pub async fn run_locked(
        &self,
        lock: &JobLock,
        params: &CleanupParams,
        shutdown: &Shutdown,
    ) -> Result<CleanupReport> {
        if params.batch_size == 0 {
            return Err(Error::invalid_argument("batch size must be at least 1"));
        }
        lock.ensure_guards(&self.lock_dir, CLEANUP_JOB)?;

        let work = self
            .host
            .revisions_info()
            .await
            .map_err(Error::enumeration)?;
        let use_payload = self.host.accepts_rule_payload();
        info!(
            entries = work.len(),
            batch_size = params.batch_size,
            bucket_case = %params.bucket_case,
            end_of_calendar_day = params.end_of_calendar_day,
            payload = use_payload,
            "Revision cleanup started"
        );

        let mut report = CleanupReport {
            entries: work.len(),
            ..CleanupReport::default()
        };
        let mut remaining: &[RevisionsInfo] = &work;
        while has_next_chunk(remaining.len(), params) {
            if shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }
            let (chunk, rest) = remaining.split_at(params.batch_size.min(remaining.len()));

            if let Err(e) = self.clean_chunk(chunk, params, use_payload).await {
                error!(
                    chunk = report.chunks + 1,
                    completed = report.chunks,
                    error = %e,
                    "Retention rule failed, aborting run"
                );
                return Err(e);
            }
            report.chunks += 1;
            report.processed += chunk.len();
            remaining = rest;
        }
        report.remaining = remaining.len();

        info!(
            chunks = report.chunks,
            processed = report.processed,
            remaining = report.remaining,
            interrupted = report.interrupted,
            "Revision cleanup finished"
        );
        Ok(report)
    }

    async fn clean_chunk(
        &self,
        chunk: &[RevisionsInfo],
        params: &CleanupParams,
        use_payload: bool,
    ) -> Result<()> {
        let request = CleanupRequest {
            chunk: chunk.to_vec(),
            bucket_case: params.bucket_case,
            end_of_calendar_day: params.end_of_calendar_day,
            verbose: params.verbose,
        };
        let call = request.to_call(use_payload)?;
        debug!(rule = %call, "Invoking retention rule");

        let stdout = self.host.call_rule(&call).await?;
        for line in stdout.lines().filter(|l| !l.is_empty()) {
            info!(rule = %call.name, "{line}");
        }
        record_revision_chunk(chunk.len());
        Ok(())
    }
}

/// `Hold` leaves the final `batch_size` entries for the next run
const fn has_next_chunk(remaining: usize, params: &CleanupParams) -> bool {
    match params.tail_policy {
        TailPolicy::Hold => remaining > params.batch_size,
        TailPolicy::Drain => remaining > 0,
    }
}
