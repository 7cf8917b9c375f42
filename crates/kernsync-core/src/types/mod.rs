//! # Core Type Definitions
//!
//! This module contains the plain data types shared by every kernsync layer:
//! - Kernel descriptions reported by outside sources (`RemoteKernel`, `ManagedKernel`)
//! - Error types (`KernsyncError`)
//!
//! Everything here is pure data. The record model that merges these
//! descriptions lives in [`crate::record`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// SOURCE DESCRIPTIONS
// =============================================================================

/// A kernel as reported by a remote kernel-hosting service.
///
/// Mirrors the `{id, name}` items returned by a gateway's kernel listing.
/// Extra keys in the payload are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteKernel {
    /// Identifier assigned by the remote service.
    pub id: String,
    /// Kernel spec name (e.g. `python3`), if reported.
    #[serde(default)]
    pub name: Option<String>,
}

impl RemoteKernel {
    /// Create a new remote kernel description.
    #[must_use]
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
        }
    }
}

/// A kernel currently tracked by the local lifecycle manager.
///
/// `attributes` holds every named value the manager knows about the kernel
/// (always `kernel_id`, usually `kernel_name`, plus whatever start parameters
/// it was given, such as `remote_id`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManagedKernel {
    /// Named values known to the manager.
    pub attributes: BTreeMap<String, String>,
}

impl ManagedKernel {
    /// Create a managed kernel description with only a kernel id.
    #[must_use]
    pub fn new(kernel_id: impl Into<String>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("kernel_id".to_string(), kernel_id.into());
        Self { attributes }
    }

    /// Add an attribute (builder style).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up an attribute by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur anywhere in kernsync.
///
/// - `Conflict` and `NotFound` come from the record model and table lookups
/// - `Transport`, `Lifecycle` and `Timeout` come from collaborator calls
/// - `Config` and `InvalidDatabasePath` are raised before any pass runs
#[derive(Debug, Error)]
pub enum KernsyncError {
    /// Two records agree on one identifier but disagree on another.
    #[error(
        "Two kernel records share an identifier but disagree on others; conflicting fields: {fields:?}"
    )]
    Conflict {
        /// Identifier fields whose populated values differ.
        fields: Vec<String>,
    },

    /// A lookup by identifier found nothing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A field name that the record schema does not declare.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// `update` was called for a record with no row in the table.
    #[error(
        "No kernel record found in the kernel table; use save to store a new record before updating it"
    )]
    NotRecorded,

    /// The table rejected an insert.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// The configured database location cannot be used.
    #[error("Invalid database path: {0}")]
    InvalidDatabasePath(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O or storage engine error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The remote kernel service could not be reached or answered badly.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The local lifecycle manager or session store failed.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// A collaborator call did not finish in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KernsyncError {
    /// Whether this error is an identity conflict between records.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_kernel_without_name() {
        let kernel = RemoteKernel::new("abc", None);
        assert_eq!(kernel.id, "abc");
        assert!(kernel.name.is_none());
    }

    #[test]
    fn managed_kernel_builder() {
        let km = ManagedKernel::new("k1").with("remote_id", "r1");
        assert_eq!(km.get("kernel_id"), Some("k1"));
        assert_eq!(km.get("remote_id"), Some("r1"));
        assert_eq!(km.get("kernel_name"), None);
    }

    #[test]
    fn conflict_message_lists_fields() {
        let err = KernsyncError::Conflict {
            fields: vec!["remote_id".to_string()],
        };
        assert!(err.is_conflict());
        assert!(err.to_string().contains("remote_id"));
    }
}
