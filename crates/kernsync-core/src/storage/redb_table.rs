//! # redb-backed Kernel Table
//!
//! Durable storage of kernel records using the redb embedded database.
//!
//! Layout:
//! - `kernels`: row number (u64) -> postcard-encoded column map
//! - `metadata`: `next_row` -> u64
//!
//! Only populated storage columns are written; status flags are never
//! stored. Lookups compare identifier columns by exact value, and the
//! database handle is opened on first use and kept for the life of the table.

use crate::storage::{DatabaseLocation, KernelStore};
use crate::{KernsyncError, Record};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::OnceLock;

/// Table for kernel rows: row number -> serialized column map.
const KERNELS: TableDefinition<u64, &[u8]> = TableDefinition::new("kernels");

/// Table for metadata: key string -> value u64.
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_ROW: &str = "next_row";

type Columns = BTreeMap<String, String>;

fn storage_err(e: impl std::fmt::Display) -> KernsyncError {
    KernsyncError::IoError(e.to_string())
}

fn holds(columns: &Columns, field: &str, value: &str) -> bool {
    columns.get(field).map(String::as_str) == Some(value)
}

/// Persistent table of kernel records.
pub struct KernelTable<R: Record> {
    location: DatabaseLocation,
    db: OnceLock<Database>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> std::fmt::Debug for KernelTable<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelTable")
            .field("location", &self.location)
            .field("open", &self.db.get().is_some())
            .finish_non_exhaustive()
    }
}

impl<R: Record> Default for KernelTable<R> {
    fn default() -> Self {
        Self {
            location: DatabaseLocation::InMemory,
            db: OnceLock::new(),
            _record: PhantomData,
        }
    }
}

impl<R: Record> KernelTable<R> {
    /// Configure a table at `location`.
    ///
    /// The location is validated immediately; the database itself is opened
    /// on first use.
    pub fn new(location: DatabaseLocation) -> Result<Self, KernsyncError> {
        location.validate()?;
        Ok(Self {
            location,
            db: OnceLock::new(),
            _record: PhantomData,
        })
    }

    /// Non-durable table.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Where this table is stored.
    #[must_use]
    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    /// Whether the database handle has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.db.get().is_some()
    }

    fn db(&self) -> Result<&Database, KernsyncError> {
        if let Some(db) = self.db.get() {
            return Ok(db);
        }
        let db = open_database(&self.location)?;
        Ok(self.db.get_or_init(|| db))
    }

    fn check_identifier(field: &str) -> Result<(), KernsyncError> {
        if R::is_identifier_field(field) {
            Ok(())
        } else {
            Err(KernsyncError::UnknownField(format!(
                "'{}' is not an identifying field of a kernel record; examples include: {:?}",
                field,
                R::identifier_fields()
            )))
        }
    }

    /// All rows with their row numbers, in row order.
    fn rows(&self) -> Result<Vec<(u64, Columns)>, KernsyncError> {
        let read_txn = self.db()?.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(KERNELS).map_err(storage_err)?;

        let mut rows = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (key, value) = entry.map_err(storage_err)?;
            let columns: Columns = postcard::from_bytes(value.value())
                .map_err(|e| KernsyncError::SerializationError(e.to_string()))?;
            rows.push((key.value(), columns));
        }
        Ok(rows)
    }

    fn matching_rows(&self, field: &str, value: &str) -> Result<Vec<(u64, Columns)>, KernsyncError> {
        Ok(self
            .rows()?
            .into_iter()
            .filter(|(_, columns)| holds(columns, field, value))
            .collect())
    }

    fn columns_of(record: &R) -> Columns {
        record.active_fields()
    }

    fn write_row(&self, row: Option<u64>, columns: &Columns) -> Result<(), KernsyncError> {
        let bytes = postcard::to_allocvec(columns)
            .map_err(|e| KernsyncError::SerializationError(e.to_string()))?;

        let write_txn = self.db()?.begin_write().map_err(storage_err)?;
        {
            let mut kernels = write_txn.open_table(KERNELS).map_err(storage_err)?;
            let mut meta = write_txn.open_table(METADATA).map_err(storage_err)?;

            let row = match row {
                Some(row) => row,
                None => {
                    let next = meta
                        .get(NEXT_ROW)
                        .map_err(storage_err)?
                        .map(|v| v.value())
                        .unwrap_or(0);
                    meta.insert(NEXT_ROW, next.saturating_add(1))
                        .map_err(storage_err)?;
                    next
                }
            };
            kernels
                .insert(row, bytes.as_slice())
                .map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)
    }
}

fn open_database(location: &DatabaseLocation) -> Result<Database, KernsyncError> {
    let db = match location {
        DatabaseLocation::InMemory => Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(storage_err)?,
        DatabaseLocation::File(path) => Database::create(path).map_err(storage_err)?,
    };

    // Initialize tables if they don't exist
    let write_txn = db.begin_write().map_err(storage_err)?;
    let _ = write_txn.open_table(KERNELS).map_err(storage_err)?;
    let _ = write_txn.open_table(METADATA).map_err(storage_err)?;
    write_txn.commit().map_err(storage_err)?;
    Ok(db)
}

// =============================================================================
// KERNELSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl<R: Record> KernelStore<R> for KernelTable<R> {
    fn list(&self) -> Result<Vec<R>, KernsyncError> {
        Ok(self
            .rows()?
            .iter()
            .map(|(_, columns)| R::from_columns(columns))
            .collect())
    }

    fn save(&self, record: &R) -> Result<(), KernsyncError> {
        let identifiers = record.active_identifiers();
        if identifiers.is_empty() {
            return Err(KernsyncError::Constraint(
                "a kernel record needs at least one identifier to be saved".to_string(),
            ));
        }

        let rows = self.rows()?;
        for (field, value) in &identifiers {
            if rows.iter().any(|(_, columns)| holds(columns, field, value)) {
                return Err(KernsyncError::Constraint(format!(
                    "a row with {}={} already exists",
                    field, value
                )));
            }
        }

        self.write_row(None, &Self::columns_of(record))
    }

    fn exists(&self, field: &str, value: &str) -> Result<bool, KernsyncError> {
        Self::check_identifier(field)?;
        Ok(!self.matching_rows(field, value)?.is_empty())
    }

    fn update(&self, record: &R) -> Result<(), KernsyncError> {
        let rows = self.rows()?;
        let identifiers = record.active_identifiers();
        let (row, columns) = identifiers
            .iter()
            .find_map(|(field, value)| {
                rows.iter()
                    .find(|(_, columns)| holds(columns, field, value))
            })
            .ok_or(KernsyncError::NotRecorded)?;

        // An identifier the row already holds may not change.
        R::from_columns(columns).merge(record)?;

        for (field, value) in &identifiers {
            let taken = rows
                .iter()
                .any(|(other, columns)| other != row && holds(columns, field, value));
            if taken {
                return Err(KernsyncError::Constraint(format!(
                    "another row already has {}={}",
                    field, value
                )));
            }
        }

        let mut columns = columns.clone();
        columns.extend(Self::columns_of(record));
        self.write_row(Some(*row), &columns)
    }

    fn delete(&self, field: &str, value: &str) -> Result<(), KernsyncError> {
        Self::check_identifier(field)?;
        let doomed = self.matching_rows(field, value)?;
        if doomed.is_empty() {
            return Ok(());
        }

        let write_txn = self.db()?.begin_write().map_err(storage_err)?;
        {
            let mut kernels = write_txn.open_table(KERNELS).map_err(storage_err)?;
            for (row, _) in &doomed {
                kernels.remove(*row).map_err(storage_err)?;
            }
        }
        write_txn.commit().map_err(storage_err)
    }

    fn get(&self, field: &str, value: &str) -> Result<R, KernsyncError> {
        Self::check_identifier(field)?;
        self.matching_rows(field, value)?
            .first()
            .map(|(_, columns)| R::from_columns(columns))
            .ok_or_else(|| {
                KernsyncError::NotFound(format!("no kernel row with {}={}", field, value))
            })
    }
}

// =============================================================================
// TESTS
// =============================================================================
