//! # Scheduler
//!
//! Runs one pass at startup, then, if autosync is on, a pass after every
//! interval until shut down. Failures of a pass are logged and never stop
//! the schedule.

use super::{PassReport, SyncPass};
use kernsync_core::KernsyncError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default delay between automatic passes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Drives a [`SyncPass`] on a fixed delay.
pub struct Scheduler {
    pass: Arc<dyn SyncPass>,
    interval: Duration,
    autosync: bool,
}

impl Scheduler {
    /// Create a scheduler. Without `autosync` only the startup pass runs.
    #[must_use]
    pub fn new(pass: Arc<dyn SyncPass>, interval: Duration, autosync: bool) -> Self {
        Self {
            pass,
            interval,
            autosync,
        }
    }

    /// Run the startup pass, then spawn the periodic task if autosync is on.
    pub async fn start(self) -> SchedulerHandle {
        log_outcome("startup", self.pass.sync_managers().await);

        let (shutdown, mut stopped) = watch::channel(false);
        let task = if self.autosync {
            tracing::info!(interval = ?self.interval, "Autosync enabled");
            let pass = Arc::clone(&self.pass);
            let interval = self.interval;
            Some(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = tokio::time::sleep(interval) => {}
                        _ = stopped.changed() => break,
                    }
                    log_outcome("scheduled", pass.sync_managers().await);
                }
                tracing::debug!("Autosync stopped");
            }))
        } else {
            tracing::info!("Autosync disabled; passes run only on demand");
            None
        };

        SchedulerHandle { shutdown, task }
    }
}

fn log_outcome(trigger: &str, outcome: Result<PassReport, KernsyncError>) {
    match outcome {
        Ok(report) => tracing::debug!(trigger, report = ?report, "Sync pass finished"),
        Err(e) => tracing::error!(trigger, error = %e, "Sync pass failed"),
    }
}

/// Handle on a started [`Scheduler`].
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Whether the periodic task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the periodic task and wait for it to exit.
    ///
    /// A pass already in flight finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Autosync task ended abnormally");
            }
        }
    }
}
