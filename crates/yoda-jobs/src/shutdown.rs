//! Cooperative cancellation for batch jobs
//!
//! Jobs check the [`Shutdown`] token between work items. On SIGINT or
//! SIGTERM the token trips, the job stops taking new items, and returning
//! from the run drops the job lock.

use tokio::sync::watch;
use tracing::info;
use yoda_common::Result;

/// Cancellation token observed by jobs
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Trips every [`Shutdown`] created with it
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// A linked trigger and token
    #[must_use]
    pub fn channel() -> (ShutdownTrigger, Self) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Self { rx })
    }

    /// A token that never trips
    #[must_use]
    pub fn never() -> Self {
        Self::channel().1
    }

    /// A token tripped by SIGINT or SIGTERM. Must be called inside a runtime.
    ///
    /// Both handlers are installed before this returns, so a signal arriving
    /// afterwards trips the token instead of killing the process.
    #[cfg(unix)]
    pub fn on_signals() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let (trigger, shutdown) = Self::channel();
        tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
            info!("Termination requested, stopping after in-flight items");
            trigger.trigger();
        });
        Ok(shutdown)
    }

    /// A token tripped by ctrl-c. Must be called inside a runtime.
    #[cfg(not(unix))]
    pub fn on_signals() -> Result<Self> {
        let (trigger, shutdown) = Self::channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Termination requested, stopping after in-flight items");
                trigger.trigger();
            }
        });
        Ok(shutdown)
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}
