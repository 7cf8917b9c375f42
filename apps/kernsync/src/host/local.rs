//! In-process kernel lifecycle manager.

use crate::sync::KernelManager;
use async_trait::async_trait;
use kernsync_core::{KERNEL_ID, KernsyncError, ManagedKernel};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct LocalKernel {
    attributes: BTreeMap<String, String>,
    ready: bool,
}

#[derive(Debug, Default)]
struct Registry {
    kernels: BTreeMap<String, LocalKernel>,
    pending: BTreeSet<String>,
    started: Vec<String>,
}

/// Registry of kernels tracked by this process.
///
/// Kernels started through [`KernelManager::start_kernel`] are ready at once.
/// Hosts that start kernels themselves register them with [`adopt`] and
/// flag them ready when the kernel answers.
///
/// [`adopt`]: LocalKernelManager::adopt
#[derive(Debug, Default)]
pub struct LocalKernelManager {
    registry: RwLock<Registry>,
}

impl LocalKernelManager {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a kernel started outside the engine.
    pub async fn adopt(&self, kernel: ManagedKernel, ready: bool) -> Result<(), KernsyncError> {
        let kernel_id = kernel
            .get(KERNEL_ID)
            .ok_or_else(|| KernsyncError::Lifecycle("managed kernel without a kernel_id".to_string()))?
            .to_string();
        let mut registry = self.registry.write().await;
        registry.pending.remove(&kernel_id);
        registry.kernels.insert(
            kernel_id,
            LocalKernel {
                attributes: kernel.attributes,
                ready,
            },
        );
        Ok(())
    }

    /// Mark a kernel as still starting. Pending kernels are not listed as running.
    pub async fn mark_pending(&self, kernel_id: &str) {
        self.registry.write().await.pending.insert(kernel_id.to_string());
    }

    /// Flag a tracked kernel as ready (or not).
    pub async fn set_ready(&self, kernel_id: &str, ready: bool) -> Result<(), KernsyncError> {
        let mut registry = self.registry.write().await;
        let kernel = registry
            .kernels
            .get_mut(kernel_id)
            .ok_or_else(|| unknown_kernel(kernel_id))?;
        kernel.ready = ready;
        Ok(())
    }

    /// Whether `kernel_id` is tracked.
    pub async fn contains(&self, kernel_id: &str) -> bool {
        self.registry.read().await.kernels.contains_key(kernel_id)
    }

    /// Number of tracked kernels.
    pub async fn len(&self) -> usize {
        self.registry.read().await.kernels.len()
    }

    /// Whether no kernel is tracked.
    pub async fn is_empty(&self) -> bool {
        self.registry.read().await.kernels.is_empty()
    }

    /// Ids passed to `start_kernel`, in call order.
    pub async fn started_ids(&self) -> Vec<String> {
        self.registry.read().await.started.clone()
    }
}

fn unknown_kernel(kernel_id: &str) -> KernsyncError {
    KernsyncError::NotFound(format!("kernel {} is not tracked", kernel_id))
}

#[async_trait]
impl KernelManager for LocalKernelManager {
    async fn list_kernel_ids(&self) -> Result<Vec<String>, KernsyncError> {
        Ok(self.registry.read().await.kernels.keys().cloned().collect())
    }

    async fn managed_kernels(&self) -> Result<Vec<ManagedKernel>, KernsyncError> {
        Ok(self
            .registry
            .read()
            .await
            .kernels
            .values()
            .map(|k| ManagedKernel {
                attributes: k.attributes.clone(),
            })
            .collect())
    }

    async fn pending_kernel_ids(&self) -> Result<Vec<String>, KernsyncError> {
        Ok(self.registry.read().await.pending.iter().cloned().collect())
    }

    async fn is_ready(&self, kernel_id: &str) -> Result<bool, KernsyncError> {
        self.registry
            .read()
            .await
            .kernels
            .get(kernel_id)
            .map(|k| k.ready)
            .ok_or_else(|| unknown_kernel(kernel_id))
    }

    async fn start_kernel(
        &self,
        mut params: BTreeMap<String, String>,
    ) -> Result<String, KernsyncError> {
        let kernel_id = params
            .entry(KERNEL_ID.to_string())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let mut registry = self.registry.write().await;
        if registry.kernels.contains_key(&kernel_id) {
            return Err(KernsyncError::Lifecycle(format!(
                "kernel {} is already running",
                kernel_id
            )));
        }
        registry.pending.remove(&kernel_id);
        registry.started.push(kernel_id.clone());
        registry.kernels.insert(
            kernel_id.clone(),
            LocalKernel {
                attributes: params,
                ready: true,
            },
        );
        tracing::debug!(kernel_id = %kernel_id, "Kernel started");
        Ok(kernel_id)
    }

    async fn shutdown_kernel(&self, kernel_id: &str) -> Result<(), KernsyncError> {
        let mut registry = self.registry.write().await;
        registry
            .kernels
            .remove(kernel_id)
            .map(|_| ())
            .ok_or_else(|| unknown_kernel(kernel_id))?;
        tracing::debug!(kernel_id = %kernel_id, "Kernel shut down");
        Ok(())
    }
}
