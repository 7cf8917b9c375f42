//! # Sync Module
//!
//! The reconciliation engine and the contracts of the collaborators it drives.
//!
//! The engine never owns a kernel host. It talks to three collaborators:
//! - [`KernelManager`] - the local kernel lifecycle manager
//! - [`SessionStore`] - session-to-kernel associations
//! - [`RemoteKernelSource`] - an optional remote kernel-hosting service
//!
//! Every collaborator call is async and may fail with a [`KernsyncError`].

mod engine;
mod scheduler;

pub use engine::{
    Collaborators, DEFAULT_CALL_TIMEOUT, PassReport, SyncOptions, SyncPass, Synchronizer,
};
pub use scheduler::{DEFAULT_INTERVAL, Scheduler, SchedulerHandle};

use async_trait::async_trait;
use kernsync_core::{KernsyncError, ManagedKernel, RemoteKernel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// SESSION
// =============================================================================

/// A session row: one document attached to one kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: String,
    /// Kernel the session is attached to.
    pub kernel_id: String,
    /// Path of the attached document.
    pub path: String,
}

impl Session {
    /// Create a session row.
    #[must_use]
    pub fn new(id: impl Into<String>, kernel_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kernel_id: kernel_id.into(),
            path: path.into(),
        }
    }
}

// =============================================================================
// COLLABORATOR CONTRACTS
// =============================================================================

/// Local kernel lifecycle manager.
#[async_trait]
pub trait KernelManager: Send + Sync {
    /// Ids of kernels currently tracked (running).
    async fn list_kernel_ids(&self) -> Result<Vec<String>, KernsyncError>;

    /// Tracked kernels with every attribute the manager knows about them.
    async fn managed_kernels(&self) -> Result<Vec<ManagedKernel>, KernsyncError>;

    /// Ids of kernels that are still starting.
    async fn pending_kernel_ids(&self) -> Result<Vec<String>, KernsyncError>;

    /// Whether a tracked kernel has finished starting.
    async fn is_ready(&self, kernel_id: &str) -> Result<bool, KernsyncError>;

    /// Start tracking a kernel. `params` always carries `kernel_id`.
    ///
    /// Returns the id the kernel is tracked under.
    async fn start_kernel(&self, params: BTreeMap<String, String>) -> Result<String, KernsyncError>;

    /// Stop and forget a tracked kernel.
    async fn shutdown_kernel(&self, kernel_id: &str) -> Result<(), KernsyncError>;
}

/// Session-to-kernel association store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All session rows.
    async fn list_sessions(&self) -> Result<Vec<Session>, KernsyncError>;

    /// The session attached to `kernel_id`, if any.
    async fn get_session_by_kernel(&self, kernel_id: &str) -> Result<Option<Session>, KernsyncError>;

    /// Delete one session by id.
    async fn delete_session(&self, session_id: &str) -> Result<(), KernsyncError>;

    /// Delete every session row attached to `kernel_id`, returning how many went.
    async fn delete_sessions_for_kernel(&self, kernel_id: &str) -> Result<usize, KernsyncError>;

    /// Kernel ids of sessions that are still being created.
    async fn pending_kernel_ids(&self) -> Result<Vec<String>, KernsyncError>;
}

/// Listing of kernels running on a remote kernel-hosting service.
#[async_trait]
pub trait RemoteKernelSource: Send + Sync {
    /// Kernels currently running remotely.
    async fn fetch(&self) -> Result<Vec<RemoteKernel>, KernsyncError>;
}
