//! # Reconciliation Engine
//!
//! One sync pass folds three views of "which kernels exist" into a fresh
//! record workspace and acts on the result.
//!
//! ## Kernel phases (in order)
//!
//! 1. Reset the workspace
//! 2. Fetch: remote service (alive), lifecycle manager (managed), table (recorded)
//! 3. Prune: drop members not alive, deleting their rows
//! 4. Hydrate: start tracking alive kernels that are not managed yet
//! 5. Persist: save alive, fully identified members that are not recorded
//!
//! ## Session phases
//!
//! 6. Delete sessions whose kernel is neither running nor pending
//! 7. Shut down running kernels that have no session
//!
//! A session is never deleted because its document is missing: a document
//! that has not been saved yet cannot be told apart from a deleted one.
//!
//! Per-item failures are logged and counted in the [`PassReport`]; they never
//! stop the remaining items. A failed remote fetch is logged and the pass goes
//! on without remote knowledge.

use super::{KernelManager, RemoteKernelSource, SessionStore};
use async_trait::async_trait;
use kernsync_core::{KERNEL_ID, KernelStore, KernsyncError, Record, RecordList};
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Default upper bound for a single collaborator call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// OPTIONS AND REPORT
// =============================================================================

/// Engine options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound for each collaborator call.
    pub call_timeout: Duration,
    /// Run the session phases after the kernel phases.
    pub sync_sessions: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            sync_sessions: true,
        }
    }
}

/// The collaborators a pass talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Local kernel lifecycle manager.
    pub kernels: Arc<dyn KernelManager>,
    /// Session store.
    pub sessions: Arc<dyn SessionStore>,
    /// Remote kernel service, if one is configured.
    pub remote: Option<Arc<dyn RemoteKernelSource>>,
}

/// What one pass saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Kernels listed by the remote service.
    pub remote_kernels: usize,
    /// Kernels tracked by the lifecycle manager at fetch time.
    pub managed_kernels: usize,
    /// Rows read from the kernel table.
    pub recorded_kernels: usize,
    /// The remote listing failed; the pass ran without it.
    pub remote_fetch_failed: bool,
    /// Workspace members dropped as not alive.
    pub pruned: usize,
    /// Table rows deleted while pruning.
    pub rows_deleted: usize,
    /// Kernels started in the lifecycle manager.
    pub hydrated: usize,
    /// Rows saved to the kernel table.
    pub recorded: usize,
    /// Session rows deleted.
    pub sessions_deleted: usize,
    /// Kernels shut down for lack of a session.
    pub kernels_shut_down: usize,
    /// Per-item failures that were logged and skipped.
    pub failures: usize,
}

async fn bounded<V>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<V, KernsyncError>>,
) -> Result<V, KernsyncError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(KernsyncError::Timeout(format!(
            "{} did not finish within {:?}",
            what, limit
        ))),
    }
}

// =============================================================================
// SYNCHRONIZER
// =============================================================================

/// The reconciliation engine for one record type and one kernel table.
pub struct Synchronizer<R: Record, T: KernelStore<R>> {
    table: T,
    records: RecordList<R>,
    collaborators: Collaborators,
    options: SyncOptions,
}

impl<R: Record, T: KernelStore<R>> Synchronizer<R, T> {
    /// Create an engine over `table` and the given collaborators.
    #[must_use]
    pub fn new(table: T, collaborators: Collaborators, options: SyncOptions) -> Self {
        Self {
            table,
            records: RecordList::new(),
            collaborators,
            options,
        }
    }

    /// The kernel table.
    #[must_use]
    pub fn table(&self) -> &T {
        &self.table
    }

    /// Workspace left by the last pass.
    #[must_use]
    pub fn records(&self) -> &RecordList<R> {
        &self.records
    }

    /// Engine options.
    #[must_use]
    pub fn options(&self) -> SyncOptions {
        self.options
    }

    fn kernels(&self) -> Arc<dyn KernelManager> {
        Arc::clone(&self.collaborators.kernels)
    }

    fn sessions(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.collaborators.sessions)
    }

    /// Full pass: kernel phases, then session phases.
    pub async fn sync_managers(&mut self) -> Result<PassReport, KernsyncError> {
        let mut report = PassReport::default();
        self.run_kernel_phases(&mut report).await?;
        if self.options.sync_sessions {
            self.run_session_phases(&mut report).await?;
        }
        Ok(report)
    }

    /// Kernel phases only.
    pub async fn sync_kernels(&mut self) -> Result<PassReport, KernsyncError> {
        let mut report = PassReport::default();
        self.run_kernel_phases(&mut report).await?;
        Ok(report)
    }

    /// Session phases only.
    pub async fn sync_sessions(&mut self) -> Result<PassReport, KernsyncError> {
        let mut report = PassReport::default();
        self.run_session_phases(&mut report).await?;
        Ok(report)
    }

    async fn run_kernel_phases(&mut self, report: &mut PassReport) -> Result<(), KernsyncError> {
        self.records = RecordList::new();
        self.fetch_kernel_records(report).await?;
        tracing::debug!(phase = "fetch", records = %self.records, "Kernel records fetched");
        self.remove_stale_kernels(report);
        self.hydrate_kernel_managers(report).await;
        self.record_kernels(report);
        Ok(())
    }

    async fn run_session_phases(&self, report: &mut PassReport) -> Result<(), KernsyncError> {
        self.delete_stale_sessions(report).await?;
        self.shutdown_kernels_without_sessions(report).await
    }

    // -------------------------------------------------------------------------
    // Fetch
    // -------------------------------------------------------------------------

    async fn fetch_kernel_records(&mut self, report: &mut PassReport) -> Result<(), KernsyncError> {
        let limit = self.options.call_timeout;

        if let Some(remote) = self.collaborators.remote.clone() {
            match bounded(limit, "remote kernel listing", remote.fetch()).await {
                Ok(kernels) => {
                    report.remote_kernels = kernels.len();
                    for kernel in &kernels {
                        self.records.update(R::from_remote(kernel))?;
                    }
                }
                Err(e) => {
                    report.remote_fetch_failed = true;
                    tracing::warn!(phase = "fetch", error = %e, "Could not fetch remote kernels");
                }
            }
        }

        let kernels = self.kernels();
        let managed = bounded(limit, "managed kernel listing", kernels.managed_kernels()).await?;
        report.managed_kernels = managed.len();
        for kernel in &managed {
            let mut record = R::from_managed(kernel);
            // Tracked kernels run in this process.
            record.status_mut().alive = Some(true);
            self.records.update(record)?;
        }

        let rows = self.table.list()?;
        report.recorded_kernels = rows.len();
        for mut record in rows {
            record.status_mut().recorded = Some(true);
            self.records.update(record)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Prune
    // -------------------------------------------------------------------------

    fn remove_stale_kernels(&mut self, report: &mut PassReport) {
        let stale = self.records.drain_where(|r| !r.status().is_alive());
        report.pruned = stale.len();

        for record in stale.iter().filter(|r| r.status().is_recorded()) {
            let key = R::identifier_fields()
                .into_iter()
                .find_map(|field| record.field(field).map(|value| (field, value)));
            let Some((field, value)) = key else {
                continue;
            };
            match self.table.delete(field, value) {
                Ok(()) => {
                    report.rows_deleted += 1;
                    tracing::debug!(phase = "prune", field, value, "Deleted stale kernel row");
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(
                        phase = "prune",
                        error = %e,
                        record = ?record,
                        "Could not remove kernel from records"
                    );
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Hydrate
    // -------------------------------------------------------------------------

    async fn hydrate_kernel_managers(&mut self, report: &mut PassReport) {
        let limit = self.options.call_timeout;
        let kernels = self.kernels();

        for record in self.records.iter_mut() {
            let status = *record.status();
            if !status.is_alive() || status.is_managed() {
                continue;
            }
            if record.kernel_id().is_none() {
                if let Err(e) = record.set_field(KERNEL_ID, Uuid::new_v4().to_string()) {
                    report.failures += 1;
                    tracing::error!(phase = "hydrate", error = %e, "Could not assign a kernel id");
                    continue;
                }
            }

            let params = record.active_fields();
            match bounded(limit, "kernel start", kernels.start_kernel(params)).await {
                Ok(kernel_id) => {
                    // The manager may track the kernel under its own id.
                    if record.kernel_id() != Some(kernel_id.as_str()) {
                        if let Err(e) = record.set_field(KERNEL_ID, kernel_id.clone()) {
                            report.failures += 1;
                            tracing::error!(
                                phase = "hydrate",
                                error = %e,
                                kernel_id = %kernel_id,
                                "Could not adopt the manager's kernel id"
                            );
                            continue;
                        }
                    }
                    record.status_mut().managed = Some(true);
                    report.hydrated += 1;
                    tracing::info!(phase = "hydrate", kernel_id = %kernel_id, "Hydrated kernel manager");
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(
                        phase = "hydrate",
                        error = %e,
                        record = ?record,
                        "Could not hydrate a manager for kernel"
                    );
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Persist
    // -------------------------------------------------------------------------

    fn record_kernels(&mut self, report: &mut PassReport) {
        for record in self.records.iter_mut() {
            let status = *record.status();
            if status.is_recorded() || !status.is_alive() || !record.is_fully_identified() {
                continue;
            }
            match self.table.save(record) {
                Ok(()) => {
                    record.status_mut().recorded = Some(true);
                    report.recorded += 1;
                    tracing::debug!(phase = "persist", record = ?record, "Recorded kernel");
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(
                        phase = "persist",
                        error = %e,
                        record = ?record,
                        "Could not record kernel"
                    );
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    async fn delete_stale_sessions(&self, report: &mut PassReport) -> Result<(), KernsyncError> {
        let limit = self.options.call_timeout;
        let kernels = self.kernels();
        let sessions = self.sessions();

        let rows = bounded(limit, "session listing", sessions.list_sessions()).await?;
        let mut known: BTreeSet<String> =
            bounded(limit, "kernel listing", kernels.list_kernel_ids())
                .await?
                .into_iter()
                .collect();
        known.extend(bounded(limit, "pending kernel listing", kernels.pending_kernel_ids()).await?);

        let mut cleared = BTreeSet::new();
        for session in &rows {
            if known.contains(&session.kernel_id) || !cleared.insert(session.kernel_id.as_str()) {
                continue;
            }
            tracing::debug!(
                phase = "sessions",
                kernel_id = %session.kernel_id,
                "Kernel found in the session store but not in the kernel manager; deleting its sessions"
            );
            match bounded(
                limit,
                "session deletion",
                sessions.delete_sessions_for_kernel(&session.kernel_id),
            )
            .await
            {
                Ok(count) => report.sessions_deleted += count,
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(
                        phase = "sessions",
                        kernel_id = %session.kernel_id,
                        error = %e,
                        "Could not delete stale sessions"
                    );
                }
            }
        }
        Ok(())
    }

    async fn shutdown_kernels_without_sessions(
        &self,
        report: &mut PassReport,
    ) -> Result<(), KernsyncError> {
        let limit = self.options.call_timeout;
        let kernels = self.kernels();
        let sessions = self.sessions();

        let kernel_ids = bounded(limit, "kernel listing", kernels.list_kernel_ids()).await?;
        let pending_sessions: BTreeSet<String> =
            bounded(limit, "pending session listing", sessions.pending_kernel_ids())
                .await?
                .into_iter()
                .collect();

        for kernel_id in &kernel_ids {
            match bounded(limit, "session lookup", sessions.get_session_by_kernel(kernel_id)).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    report.failures += 1;
                    tracing::info!(phase = "sessions", kernel_id = %kernel_id, error = %e, "Could not look up session");
                    continue;
                }
            }
            if pending_sessions.contains(kernel_id) {
                continue;
            }
            match bounded(limit, "kernel readiness", kernels.is_ready(kernel_id)).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    report.failures += 1;
                    tracing::info!(phase = "sessions", kernel_id = %kernel_id, error = %e, "Could not check kernel readiness");
                    continue;
                }
            }

            tracing::debug!(
                phase = "sessions",
                kernel_id = %kernel_id,
                "Kernel has no session; shutting it down"
            );
            match bounded(limit, "kernel shutdown", kernels.shutdown_kernel(kernel_id)).await {
                Ok(()) => report.kernels_shut_down += 1,
                Err(e) => {
                    report.failures += 1;
                    tracing::info!(phase = "sessions", kernel_id = %kernel_id, error = %e, "Could not shut down kernel");
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// SERIALIZED PASSES
// =============================================================================

/// A runnable sync pass, independent of record and table types.
///
/// The scheduler and the HTTP trigger both hold one of these.
#[async_trait]
pub trait SyncPass: Send + Sync {
    /// Run one full pass.
    async fn sync_managers(&self) -> Result<PassReport, KernsyncError>;
}

/// Passes queue on the mutex; at most one runs at a time.
#[async_trait]
impl<R, T> SyncPass for Mutex<Synchronizer<R, T>>
where
    R: Record,
    T: KernelStore<R> + 'static,
{
    async fn sync_managers(&self) -> Result<PassReport, KernsyncError> {
        let mut engine = self.lock().await;
        engine.sync_managers().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_times_out() {
        let err = bounded(Duration::from_millis(10), "slow call", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), KernsyncError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, KernsyncError::Timeout(_)));
        assert!(err.to_string().contains("slow call"));
    }

    #[tokio::test]
    async fn bounded_passes_result_through() {
        let value = bounded(DEFAULT_CALL_TIMEOUT, "fast call", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn default_options() {
        let options = SyncOptions::default();
        assert!(options.sync_sessions);
        assert_eq!(options.call_timeout, Duration::from_secs(30));
    }
}
