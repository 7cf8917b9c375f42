//! # Host Module
//!
//! Built-in collaborators for running kernsync on its own:
//! - [`LocalKernelManager`] - in-process kernel registry
//! - [`MemorySessionStore`] - session rows in memory
//! - [`GatewayClient`] - kernels listed by a remote kernel gateway
//!
//! Servers embedding kernsync supply their own implementations of the
//! [`crate::sync`] traits instead.

mod gateway;
mod local;
mod sessions;

pub use gateway::GatewayClient;
pub use local::LocalKernelManager;
pub use sessions::MemorySessionStore;
