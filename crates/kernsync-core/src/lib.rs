//! # kernsync-core
//!
//! Kernel record model and persistent kernel table for kernsync - THE LOGIC.
//!
//! This crate decides which kernels are the same kernel and remembers which
//! kernels existed across restarts. It never talks to a kernel host itself:
//! the reconciliation engine in the `kernsync` app feeds it records gathered
//! from the remote service, the local lifecycle manager and the table.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: NO async, NO network dependencies, NO logging
//! - Identity is decided by explicit schemas ([`schema::FieldSpec`]), never by
//!   field naming conventions
//! - Merging never erases a known value
//! - Storage goes through [`KernelStore`]; [`KernelTable`] is the redb backend

// =============================================================================
// MODULES
// =============================================================================

pub mod collection;
pub mod record;
pub mod schema;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{KernsyncError, ManagedKernel, RemoteKernel};

// =============================================================================
// RE-EXPORTS: Record Model
// =============================================================================

pub use collection::{RecordKey, RecordList};
pub use record::{KernelRecord, REMOTE_ID, Record, RemoteKernelRecord};
pub use schema::{FieldRole, FieldSpec, KERNEL_ID, KERNEL_NAME, KernelStatus, STATUS_FIELDS};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use storage::{DatabaseLocation, IN_MEMORY, KernelStore, KernelTable};
