//! Yoda Jobs - singleton batch jobs over the flag work queue
//!
//! Both jobs follow the same discipline:
//! - a job is a singleton per host, guarded by an exclusive lock file that
//!   is removed on every exit path
//! - work is read from the catalog on every run; progress survives only as
//!   fewer remaining flags or revisions
//! - per-item failures are logged and leave the item queued; only lock
//!   contention and enumeration failures end a run
//!
//! The jobs never delete a flag before the work it represents succeeded.

pub mod exit;
pub mod lock;
pub mod metrics;
pub mod replication;
pub mod revision_cleanup;
pub mod shutdown;

pub use exit::JobExit;
pub use lock::{CLEANUP_JOB, JobLock, REPLICATION_JOB};
pub use replication::{ReplicationJob, ReplicationOptions, ReplicationReport, schedule_replication};
pub use revision_cleanup::{CleanupParams, CleanupReport, RevisionCleanupJob};
pub use shutdown::{Shutdown, ShutdownTrigger};
