//! Process exit codes of the batch drivers

use std::process::ExitCode;
use yoda_common::Error;

/// How a batch run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobExit {
    /// The run completed; per-item failures are not reflected here
    Completed,
    /// Another instance holds the job lock
    LockContended,
    /// The run failed as a whole or was interrupted
    Failed,
}

impl JobExit {
    /// Classify the error that ended a run
    #[must_use]
    pub const fn from_error(error: &Error) -> Self {
        match error {
            Error::LockContention { .. } => Self::LockContended,
            _ => Self::Failed,
        }
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::LockContended => 1,
            Self::Failed => 2,
        }
    }
}

impl From<JobExit> for ExitCode {
    fn from(exit: JobExit) -> Self {
        Self::from(exit.code())
    }
}
