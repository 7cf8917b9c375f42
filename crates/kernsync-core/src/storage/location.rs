//! # Database Location
//!
//! Where the kernel table lives: an in-memory sentinel or a file path.
//!
//! Validation happens at configuration time, before any pass runs:
//! - a directory is rejected
//! - a non-empty file that does not start with the redb file magic is rejected
//! - a missing or empty file is accepted and initialized on first use

use crate::KernsyncError;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Sentinel string selecting the non-durable in-memory backend.
pub const IN_MEMORY: &str = ":memory:";

/// Leading bytes of every redb database file.
pub const REDB_MAGIC_PREFIX: &[u8; 4] = b"redb";

/// Storage location of the kernel table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DatabaseLocation {
    /// Non-durable; contents are lost when the process exits.
    #[default]
    InMemory,
    /// Durable file-backed database.
    File(PathBuf),
}

impl DatabaseLocation {
    /// File-backed location.
    #[must_use]
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    /// Whether the table survives process restarts.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::File(_))
    }

    /// Check that the location can hold a kernel table.
    pub fn validate(&self) -> Result<(), KernsyncError> {
        let Self::File(path) = self else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        if path.is_dir() {
            return Err(KernsyncError::InvalidDatabasePath(format!(
                "expected a file path, but '{}' is a directory",
                path.display()
            )));
        }

        let mut header = Vec::with_capacity(REDB_MAGIC_PREFIX.len());
        std::fs::File::open(path)
            .and_then(|f| {
                f.take(REDB_MAGIC_PREFIX.len() as u64)
                    .read_to_end(&mut header)
            })
            .map_err(|e| {
                KernsyncError::InvalidDatabasePath(format!(
                    "cannot read '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        if header.is_empty() || header.as_slice() == REDB_MAGIC_PREFIX {
            Ok(())
        } else {
            Err(KernsyncError::InvalidDatabasePath(format!(
                "'{}' is not a kernel database file",
                path.display()
            )))
        }
    }
}

impl FromStr for DatabaseLocation {
    type Err = KernsyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(KernsyncError::InvalidDatabasePath(
                "database path is empty".to_string(),
            ));
        }
        if trimmed == IN_MEMORY {
            Ok(Self::InMemory)
        } else {
            Ok(Self::File(PathBuf::from(trimmed)))
        }
    }
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory => write!(f, "{}", IN_MEMORY),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_memory_sentinel() {
        assert_eq!(
            ":memory:".parse::<DatabaseLocation>().unwrap(),
            DatabaseLocation::InMemory
        );
        assert_eq!(
            "/tmp/kernels.redb".parse::<DatabaseLocation>().unwrap(),
            DatabaseLocation::file("/tmp/kernels.redb")
        );
        assert!("  ".parse::<DatabaseLocation>().is_err());
    }

    #[test]
    fn directory_rejected() {
        let temp = tempdir().expect("temp dir");
        let err = DatabaseLocation::file(temp.path()).validate().unwrap_err();
        assert!(matches!(err, KernsyncError::InvalidDatabasePath(_)));
    }

    #[test]
    fn missing_and_empty_files_accepted() {
        let temp = tempdir().expect("temp dir");
        let missing = temp.path().join("missing.redb");
        assert!(DatabaseLocation::file(&missing).validate().is_ok());

        let empty = temp.path().join("empty.redb");
        std::fs::write(&empty, b"").expect("write");
        assert!(DatabaseLocation::file(&empty).validate().is_ok());
    }

    #[test]
    fn foreign_file_rejected() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, b"hello, not a database").expect("write");
        let err = DatabaseLocation::file(&path).validate().unwrap_err();
        assert!(err.to_string().contains("not a kernel database"));
    }

    #[test]
    fn display_round_trips_sentinel() {
        assert_eq!(DatabaseLocation::InMemory.to_string(), IN_MEMORY);
        assert!(!DatabaseLocation::InMemory.is_durable());
    }
}
