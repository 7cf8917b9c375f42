//! # Kernel Records
//!
//! A record describes one kernel as known from a single source: the remote
//! kernel service, the local lifecycle manager, or the kernel table.
//!
//! ## Identity
//!
//! Two records denote the same kernel iff at least one identifier field is
//! populated on both sides with equal values. If another identifier is
//! populated on both sides with different values, the records collide and
//! [`KernsyncError::Conflict`] is returned instead of an answer.
//!
//! ## Merge
//!
//! [`Record::merge`] copies every populated field of the incoming record onto
//! the target. Absent values never erase known ones.

use crate::schema::{FieldRole, FieldSpec, KERNEL_ID, KERNEL_NAME, KernelStatus, STATUS_FIELDS};
use crate::{KernsyncError, ManagedKernel, RemoteKernel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

// =============================================================================
// RECORD TRAIT
// =============================================================================

/// Capability shared by all kernel record types.
///
/// Implementors provide the schema and field access; identity, merge and
/// conversions are provided on top of those.
pub trait Record: Clone + Debug + Default + Send + Sync + 'static {
    /// Ordered field descriptors, status fields included.
    fn schema() -> &'static [FieldSpec];

    /// Value of a text field (identifier or attribute).
    fn field(&self, name: &str) -> Option<&str>;

    /// Mutable slot of a text field, or `None` if the schema has no such field.
    fn field_slot(&mut self, name: &str) -> Option<&mut Option<String>>;

    /// Transient sync flags.
    fn status(&self) -> &KernelStatus;

    /// Mutable transient sync flags.
    fn status_mut(&mut self) -> &mut KernelStatus;

    /// Build a record from a remote kernel listing item (`alive = true`).
    fn from_remote(kernel: &RemoteKernel) -> Self;

    // -------------------------------------------------------------------------
    // Schema queries
    // -------------------------------------------------------------------------

    /// Names of the identifier fields, in schema order.
    fn identifier_fields() -> Vec<&'static str> {
        Self::schema()
            .iter()
            .filter(|f| f.role == FieldRole::Identifier)
            .map(|f| f.name)
            .collect()
    }

    /// Names of the persisted fields (identifiers and attributes).
    fn column_fields() -> Vec<&'static str> {
        Self::schema()
            .iter()
            .filter(|f| f.is_column())
            .map(|f| f.name)
            .collect()
    }

    /// Whether `name` is an identifier field of this schema.
    fn is_identifier_field(name: &str) -> bool {
        Self::schema()
            .iter()
            .any(|f| f.role == FieldRole::Identifier && f.name == name)
    }

    // -------------------------------------------------------------------------
    // Field access
    // -------------------------------------------------------------------------

    /// Set a text field by name.
    fn set_field(&mut self, name: &str, value: impl Into<String>) -> Result<(), KernsyncError> {
        let slot = self
            .field_slot(name)
            .ok_or_else(|| KernsyncError::UnknownField(name.to_string()))?;
        *slot = Some(value.into());
        Ok(())
    }

    /// The local kernel identifier, if the schema has one and it is set.
    fn kernel_id(&self) -> Option<&str> {
        self.field(KERNEL_ID)
    }

    /// Values of all identifier fields, in schema order.
    fn identifier_values(&self) -> Vec<Option<&str>> {
        Self::identifier_fields()
            .into_iter()
            .map(|name| self.field(name))
            .collect()
    }

    /// Populated identifiers only, in schema order.
    fn active_identifiers(&self) -> Vec<(&'static str, &str)> {
        Self::identifier_fields()
            .into_iter()
            .filter_map(|name| self.field(name).map(|v| (name, v)))
            .collect()
    }

    /// All populated text fields. Used as kernel start parameters.
    fn active_fields(&self) -> BTreeMap<String, String> {
        Self::column_fields()
            .into_iter()
            .filter_map(|name| self.field(name).map(|v| (name.to_string(), v.to_string())))
            .collect()
    }

    /// Every identifier field is populated.
    fn is_fully_identified(&self) -> bool {
        self.identifier_values().iter().all(Option::is_some)
    }

    /// Any identifier field holds exactly `value`.
    fn has_identifier_value(&self, value: &str) -> bool {
        self.identifier_values().contains(&Some(value))
    }

    // -------------------------------------------------------------------------
    // Identity and merge
    // -------------------------------------------------------------------------

    /// Whether `self` and `other` denote the same kernel.
    ///
    /// Returns `Conflict` when one shared identifier matches and another differs.
    fn same_kernel(&self, other: &Self) -> Result<bool, KernsyncError> {
        let mut equivalent = false;
        let mut conflicts = Vec::new();

        for name in Self::identifier_fields() {
            match (self.field(name), other.field(name)) {
                (Some(a), Some(b)) if a == b => equivalent = true,
                (Some(_), Some(_)) => conflicts.push(name.to_string()),
                _ => {}
            }
        }

        if equivalent && !conflicts.is_empty() {
            return Err(KernsyncError::Conflict { fields: conflicts });
        }
        Ok(equivalent)
    }

    /// Merge `other` into `self`, field by field.
    ///
    /// Fails with `Conflict` (leaving `self` untouched) if any identifier is
    /// populated on both sides with different values.
    fn merge(&mut self, other: &Self) -> Result<(), KernsyncError> {
        let conflicts: Vec<String> = Self::identifier_fields()
            .into_iter()
            .filter(|name| matches!((self.field(name), other.field(name)), (Some(a), Some(b)) if a != b))
            .map(str::to_string)
            .collect();
        if !conflicts.is_empty() {
            return Err(KernsyncError::Conflict { fields: conflicts });
        }

        for name in Self::column_fields() {
            if let Some(value) = other.field(name) {
                let value = value.to_string();
                if let Some(slot) = self.field_slot(name) {
                    *slot = Some(value);
                }
            }
        }
        let status = *other.status();
        self.status_mut().merge(&status);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Conversions
    // -------------------------------------------------------------------------

    /// Build a record from a kernel tracked by the lifecycle manager.
    ///
    /// Each schema field takes the manager attribute of the same name.
    fn from_managed(kernel: &ManagedKernel) -> Self {
        let mut record = Self::default();
        for name in Self::column_fields() {
            if let (Some(value), Some(slot)) = (kernel.get(name), record.field_slot(name)) {
                *slot = Some(value.to_string());
            }
        }
        record.status_mut().managed = Some(true);
        record
    }

    /// Build a record from stored columns. Unknown columns are ignored.
    fn from_columns(columns: &BTreeMap<String, String>) -> Self {
        let mut record = Self::default();
        for (name, value) in columns {
            if let Some(slot) = record.field_slot(name) {
                *slot = Some(value.clone());
            }
        }
        record
    }
}

// =============================================================================
// KERNEL RECORD
// =============================================================================

const KERNEL_RECORD_SCHEMA: [FieldSpec; 5] = [
    FieldSpec::identifier(KERNEL_ID),
    FieldSpec::attribute(KERNEL_NAME),
    STATUS_FIELDS[0],
    STATUS_FIELDS[1],
    STATUS_FIELDS[2],
];

/// The default record: kernels identified only by their local kernel id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KernelRecord {
    pub kernel_id: Option<String>,
    pub kernel_name: Option<String>,
    #[serde(flatten)]
    pub status: KernelStatus,
}

impl KernelRecord {
    /// Create a record with only a kernel id.
    #[must_use]
    pub fn with_id(kernel_id: impl Into<String>) -> Self {
        Self {
            kernel_id: Some(kernel_id.into()),
            ..Self::default()
        }
    }
}

impl Record for KernelRecord {
    fn schema() -> &'static [FieldSpec] {
        &KERNEL_RECORD_SCHEMA
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            KERNEL_ID => self.kernel_id.as_deref(),
            KERNEL_NAME => self.kernel_name.as_deref(),
            _ => None,
        }
    }

    fn field_slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            KERNEL_ID => Some(&mut self.kernel_id),
            KERNEL_NAME => Some(&mut self.kernel_name),
            _ => None,
        }
    }

    fn status(&self) -> &KernelStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut KernelStatus {
        &mut self.status
    }

    fn from_remote(kernel: &RemoteKernel) -> Self {
        Self {
            kernel_id: Some(kernel.id.clone()),
            kernel_name: kernel.name.clone(),
            status: KernelStatus {
                alive: Some(true),
                ..KernelStatus::default()
            },
        }
    }
}

// =============================================================================
// REMOTE KERNEL RECORD
// =============================================================================

/// Name of the remote identifier field.
pub const REMOTE_ID: &str = "remote_id";

const REMOTE_KERNEL_RECORD_SCHEMA: [FieldSpec; 6] = [
    FieldSpec::identifier(KERNEL_ID),
    FieldSpec::identifier(REMOTE_ID),
    FieldSpec::attribute(KERNEL_NAME),
    STATUS_FIELDS[0],
    STATUS_FIELDS[1],
    STATUS_FIELDS[2],
];

/// A record for kernels hosted by a remote service that assigns its own ids.
///
/// The local `kernel_id` and the service's `remote_id` are both identifiers;
/// a record is only persisted once both are known.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteKernelRecord {
    pub kernel_id: Option<String>,
    pub remote_id: Option<String>,
    pub kernel_name: Option<String>,
    #[serde(flatten)]
    pub status: KernelStatus,
}

impl RemoteKernelRecord {
    /// Create a record from optional local and remote ids.
    #[must_use]
    pub fn new(kernel_id: Option<&str>, remote_id: Option<&str>) -> Self {
        Self {
            kernel_id: kernel_id.map(str::to_string),
            remote_id: remote_id.map(str::to_string),
            ..Self::default()
        }
    }
}

impl Record for RemoteKernelRecord {
    fn schema() -> &'static [FieldSpec] {
        &REMOTE_KERNEL_RECORD_SCHEMA
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            KERNEL_ID => self.kernel_id.as_deref(),
            REMOTE_ID => self.remote_id.as_deref(),
            KERNEL_NAME => self.kernel_name.as_deref(),
            _ => None,
        }
    }

    fn field_slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            KERNEL_ID => Some(&mut self.kernel_id),
            REMOTE_ID => Some(&mut self.remote_id),
            KERNEL_NAME => Some(&mut self.kernel_name),
            _ => None,
        }
    }

    fn status(&self) -> &KernelStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut KernelStatus {
        &mut self.status
    }

    fn from_remote(kernel: &RemoteKernel) -> Self {
        Self {
            kernel_id: None,
            remote_id: Some(kernel.id.clone()),
            kernel_name: kernel.name.clone(),
            status: KernelStatus {
                alive: Some(true),
                ..KernelStatus::default()
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn remote(kernel_id: Option<&str>, remote_id: Option<&str>) -> RemoteKernelRecord {
        RemoteKernelRecord::new(kernel_id, remote_id)
    }

    fn alive(mut record: KernelRecord) -> KernelRecord {
        record.status.alive = Some(true);
        record
    }

    #[test]
    fn kernel_record_schema() {
        assert_eq!(KernelRecord::identifier_fields(), vec!["kernel_id"]);
        assert_eq!(
            KernelRecord::column_fields(),
            vec!["kernel_id", "kernel_name"]
        );
        let record = KernelRecord::with_id("kernel1");
        assert_eq!(record.identifier_values(), vec![Some("kernel1")]);
    }

    #[test]
    fn remote_record_schema() {
        assert_eq!(
            RemoteKernelRecord::identifier_fields(),
            vec!["kernel_id", "remote_id"]
        );
        assert!(RemoteKernelRecord::is_identifier_field("remote_id"));
        assert!(!RemoteKernelRecord::is_identifier_field("kernel_name"));
    }

    #[test]
    fn kernel_record_equality() {
        let record0 = KernelRecord::with_id("kernel1");
        let record1 = KernelRecord::with_id("kernel2");
        let record2 = alive(KernelRecord::with_id("kernel1"));
        let record3 = alive(KernelRecord::with_id("kernel2"));

        assert!(!record0.same_kernel(&record1).unwrap());
        assert!(record0.same_kernel(&record2).unwrap());
        assert!(!record0.same_kernel(&record3).unwrap());
    }

    #[test]
    fn records_without_identifiers_are_never_equal() {
        let a = KernelRecord::default();
        let b = KernelRecord::default();
        assert!(!a.same_kernel(&b).unwrap());
    }

    #[test]
    fn remote_record_equality() {
        let record0 = remote(Some("kernel1"), None);
        let record1 = remote(None, Some("remote1"));
        let record2 = remote(Some("kernel1"), Some("remote1"));
        let record3 = remote(Some("kernel1"), Some("remote2"));
        let record4 = remote(Some("kernel2"), Some("remote1"));
        let record5 = remote(Some("kernel1"), Some("remote1"));

        assert!(record0.same_kernel(&record2).unwrap());
        assert!(record1.same_kernel(&record2).unwrap());
        assert!(!record3.same_kernel(&record4).unwrap());
        assert!(!record1.same_kernel(&record3).unwrap());
        assert!(record2.same_kernel(&record5).unwrap());

        assert!(record2.same_kernel(&record3).unwrap_err().is_conflict());
        assert!(record2.same_kernel(&record4).unwrap_err().is_conflict());
    }

    #[test]
    fn merge_sets_status_flags() {
        let mut record = KernelRecord::with_id("kernel1");
        record.merge(&alive(KernelRecord::with_id("kernel1"))).unwrap();
        assert!(record.status.is_alive());

        let mut recorded = KernelRecord::with_id("kernel1");
        recorded.status.recorded = Some(true);
        record.merge(&recorded).unwrap();
        assert!(record.status.is_recorded());
        assert!(record.status.is_alive());
    }

    #[test]
    fn merge_fills_missing_identifiers() {
        let mut record = remote(None, Some("remote1"));
        record.merge(&remote(Some("kernel1"), Some("remote1"))).unwrap();
        assert_eq!(record.kernel_id.as_deref(), Some("kernel1"));

        let mut record = remote(None, Some("remote1"));
        record.merge(&remote(Some("kernel1"), None)).unwrap();
        assert_eq!(record.kernel_id.as_deref(), Some("kernel1"));

        let mut record = remote(Some("kernel1"), None);
        record.merge(&remote(None, Some("remote1"))).unwrap();
        assert_eq!(record.remote_id.as_deref(), Some("remote1"));
    }

    #[test]
    fn merge_rejects_differing_identifiers() {
        let mut record = remote(Some("kernel1"), None);
        assert!(
            record
                .merge(&remote(Some("kernel2"), Some("remote1")))
                .unwrap_err()
                .is_conflict()
        );
        // Target is untouched after a failed merge.
        assert_eq!(record, remote(Some("kernel1"), None));

        let mut record = remote(Some("kernel1"), Some("remote1"));
        assert!(record.merge(&remote(Some("kernel2"), None)).is_err());

        let mut record = remote(Some("kernel1"), Some("remote1"));
        assert!(record.merge(&remote(Some("kernel2"), Some("remote1"))).is_err());

        let mut record = remote(Some("kernel1"), Some("remote1"));
        assert!(record.merge(&remote(Some("kernel1"), Some("remote2"))).is_err());
    }

    #[test]
    fn merge_never_erases() {
        let mut record = KernelRecord {
            kernel_id: Some("k1".into()),
            kernel_name: Some("python3".into()),
            status: KernelStatus {
                managed: Some(true),
                ..KernelStatus::default()
            },
        };
        record.merge(&KernelRecord::with_id("k1")).unwrap();
        assert_eq!(record.kernel_name.as_deref(), Some("python3"));
        assert!(record.status.is_managed());
    }

    #[test]
    fn from_remote_marks_alive() {
        let kernel = RemoteKernel::new("abc", Some("python3"));

        let local = KernelRecord::from_remote(&kernel);
        assert_eq!(local.kernel_id.as_deref(), Some("abc"));
        assert!(local.status.is_alive());

        let hosted = RemoteKernelRecord::from_remote(&kernel);
        assert_eq!(hosted.remote_id.as_deref(), Some("abc"));
        assert!(hosted.kernel_id.is_none());
        assert_eq!(hosted.kernel_name.as_deref(), Some("python3"));
    }

    #[test]
    fn from_managed_copies_schema_fields() {
        let km = ManagedKernel::new("k1")
            .with("remote_id", "r1")
            .with("kernel_name", "python3")
            .with("cwd", "/tmp");
        let record = RemoteKernelRecord::from_managed(&km);
        assert_eq!(record.kernel_id.as_deref(), Some("k1"));
        assert_eq!(record.remote_id.as_deref(), Some("r1"));
        assert_eq!(record.kernel_name.as_deref(), Some("python3"));
        assert!(record.status.is_managed());
        assert!(record.status.alive.is_none());
    }

    #[test]
    fn active_fields_and_full_identification() {
        let mut record = remote(Some("k1"), None);
        assert!(!record.is_fully_identified());
        assert_eq!(record.active_fields().len(), 1);

        record.set_field("remote_id", "r1").unwrap();
        assert!(record.is_fully_identified());
        assert!(record.has_identifier_value("r1"));
        assert!(record.set_field("bogus", "x").is_err());
    }

    #[test]
    fn active_identifiers_follow_schema_order() {
        let record = remote(Some("zzz"), Some("aaa"));
        assert_eq!(
            record.active_identifiers(),
            vec![("kernel_id", "zzz"), ("remote_id", "aaa")]
        );
        assert_eq!(
            remote(None, Some("aaa")).active_identifiers(),
            vec![("remote_id", "aaa")]
        );
    }
}
