//! # Record Schema
//!
//! Explicit field descriptors for kernel records.
//!
//! Every record type declares an ordered list of `(name, role)` pairs.
//! Identity, storage columns and hydration parameters are all derived from
//! that list; nothing is discovered from field naming.

use serde::{Deserialize, Serialize};

/// Role a field plays in a kernel record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldRole {
    /// Used to decide whether two records denote the same kernel. Persisted.
    Identifier,
    /// Descriptive value (e.g. kernel name). Persisted, never used for identity.
    Attribute,
    /// Transient sync flag. Never persisted.
    Status,
}

/// One entry of a record schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name, also used as the storage column name.
    pub name: &'static str,
    /// The role of the field.
    pub role: FieldRole,
}

impl FieldSpec {
    /// Declare an identifier field.
    #[must_use]
    pub const fn identifier(name: &'static str) -> Self {
        Self {
            name,
            role: FieldRole::Identifier,
        }
    }

    /// Declare a persisted attribute field.
    #[must_use]
    pub const fn attribute(name: &'static str) -> Self {
        Self {
            name,
            role: FieldRole::Attribute,
        }
    }

    /// Declare a transient status field.
    #[must_use]
    pub const fn status(name: &'static str) -> Self {
        Self {
            name,
            role: FieldRole::Status,
        }
    }

    /// Whether this field is stored in the kernel table.
    #[must_use]
    pub const fn is_column(&self) -> bool {
        !matches!(self.role, FieldRole::Status)
    }
}

/// Name of the local kernel identifier field.
///
/// Hydration assigns generated ids through this field.
pub const KERNEL_ID: &str = "kernel_id";

/// Name of the kernel spec name attribute.
pub const KERNEL_NAME: &str = "kernel_name";

/// Status fields shared by every record type, in schema order.
pub const STATUS_FIELDS: [FieldSpec; 3] = [
    FieldSpec::status("alive"),
    FieldSpec::status("recorded"),
    FieldSpec::status("managed"),
];

// =============================================================================
// STATUS FLAGS
// =============================================================================

/// Transient sync flags of a kernel record.
///
/// `None` means the reporting source said nothing about the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KernelStatus {
    /// The kernel is running according to the reporting source.
    pub alive: Option<bool>,
    /// A row for the kernel already exists in the kernel table.
    pub recorded: Option<bool>,
    /// The kernel is tracked by the local lifecycle manager.
    pub managed: Option<bool>,
}

impl KernelStatus {
    /// Copy every populated flag from `other`; absent flags never overwrite.
    pub fn merge(&mut self, other: &Self) {
        if other.alive.is_some() {
            self.alive = other.alive;
        }
        if other.recorded.is_some() {
            self.recorded = other.recorded;
        }
        if other.managed.is_some() {
            self.managed = other.managed;
        }
    }

    /// `alive` is set and true.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive == Some(true)
    }

    /// `recorded` is set and true.
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        self.recorded == Some(true)
    }

    /// `managed` is set and true.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.managed == Some(true)
    }
}
