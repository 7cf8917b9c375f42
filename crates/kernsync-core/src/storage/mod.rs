//! # Storage Module
//!
//! The persistent kernel table and its location.
//!
//! [`KernelStore`] is the CRUD contract the reconciliation engine depends on;
//! [`KernelTable`] implements it on redb.

mod location;
mod redb_table;

pub use location::{DatabaseLocation, IN_MEMORY, REDB_MAGIC_PREFIX};
pub use redb_table::KernelTable;

use crate::{KernsyncError, Record};

/// CRUD contract of the persistent kernel table.
///
/// Identifier arguments are `(field, value)` pairs; `field` must be one of the
/// record type's identifier fields.
pub trait KernelStore<R: Record>: Send + Sync {
    /// All stored rows as records. An empty table yields an empty vector.
    fn list(&self) -> Result<Vec<R>, KernsyncError>;

    /// Insert one row from the record's populated columns.
    fn save(&self, record: &R) -> Result<(), KernsyncError>;

    /// Whether a row has `field == value`.
    fn exists(&self, field: &str, value: &str) -> Result<bool, KernsyncError>;

    /// Merge the record's populated columns into its existing row.
    ///
    /// The row is located through the record's first populated identifier
    /// present in storage; `NotRecorded` if there is none. Changing an
    /// identifier the row holds is a `Conflict`; taking one held by another
    /// row is a `Constraint` error.
    fn update(&self, record: &R) -> Result<(), KernsyncError>;

    /// Remove every row with `field == value`. No-op if none match.
    fn delete(&self, field: &str, value: &str) -> Result<(), KernsyncError>;

    /// The row with `field == value`, or `NotFound`.
    fn get(&self, field: &str, value: &str) -> Result<R, KernsyncError>;
}
