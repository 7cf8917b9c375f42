//! # Record Collection
//!
//! The per-pass workspace: an ordered list of records, unique by identity.
//!
//! Inserting a record that denotes a kernel already in the list merges it into
//! that member; otherwise it is appended. Identity lookups can surface a
//! `Conflict`, so every lookup returns a `Result`.

use crate::{KernsyncError, Record};
use std::fmt;

/// Key used to find a member of a [`RecordList`].
#[derive(Debug)]
pub enum RecordKey<'a, R> {
    /// Match by record identity.
    Record(&'a R),
    /// Match any member having this value in one of its identifier fields.
    Id(&'a str),
}

impl<R> Clone for RecordKey<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for RecordKey<'_, R> {}

impl<'a, R: Record> From<&'a R> for RecordKey<'a, R> {
    fn from(record: &'a R) -> Self {
        Self::Record(record)
    }
}

impl<'a, R: Record> From<&'a str> for RecordKey<'a, R> {
    fn from(id: &'a str) -> Self {
        Self::Id(id)
    }
}

/// Ordered, identity-deduplicated collection of records.
#[derive(Debug, Clone)]
pub struct RecordList<R: Record> {
    records: Vec<R>,
}

impl<R: Record> Default for RecordList<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<R: Record> RecordList<R> {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection by inserting each record in turn.
    pub fn from_records(records: impl IntoIterator<Item = R>) -> Result<Self, KernsyncError> {
        let mut list = Self::new();
        for record in records {
            list.update(record)?;
        }
        Ok(list)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate members in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.records.iter()
    }

    /// Iterate members mutably in insertion order.
    ///
    /// Callers must not change identifier values in a way that makes two
    /// members equal.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, R> {
        self.records.iter_mut()
    }

    fn position<'a>(&self, key: impl Into<RecordKey<'a, R>>) -> Result<Option<usize>, KernsyncError>
    where
        R: 'a,
    {
        match key.into() {
            RecordKey::Record(record) => {
                for (idx, member) in self.records.iter().enumerate() {
                    if member.same_kernel(record)? {
                        return Ok(Some(idx));
                    }
                }
                Ok(None)
            }
            RecordKey::Id(id) => Ok(self.records.iter().position(|r| r.has_identifier_value(id))),
        }
    }

    /// Whether a member matches `key`.
    pub fn contains<'a>(&self, key: impl Into<RecordKey<'a, R>>) -> Result<bool, KernsyncError>
    where
        R: 'a,
    {
        Ok(self.position(key)?.is_some())
    }

    /// The member matching `key`, or `NotFound`.
    pub fn get<'a>(&self, key: impl Into<RecordKey<'a, R>>) -> Result<&R, KernsyncError>
    where
        R: 'a,
    {
        let key = key.into();
        match self.position(key)? {
            Some(idx) => Ok(&self.records[idx]),
            None => Err(not_found(key)),
        }
    }

    /// Mutable access to the member matching `key`, or `NotFound`.
    pub fn get_mut<'a>(&mut self, key: impl Into<RecordKey<'a, R>>) -> Result<&mut R, KernsyncError>
    where
        R: 'a,
    {
        let key = key.into();
        match self.position(key)? {
            Some(idx) => Ok(&mut self.records[idx]),
            None => Err(not_found(key)),
        }
    }

    /// Merge `record` into its equivalent member, or append it.
    ///
    /// A `Conflict` propagates and leaves the collection unchanged.
    pub fn update(&mut self, record: R) -> Result<(), KernsyncError> {
        match self.position(&record)? {
            Some(idx) => self.records[idx].merge(&record),
            None => {
                self.records.push(record);
                Ok(())
            }
        }
    }

    /// Remove the member equivalent to `record`. Absent records are a no-op.
    pub fn remove(&mut self, record: &R) -> Result<Option<R>, KernsyncError> {
        Ok(self.position(record)?.map(|idx| self.records.remove(idx)))
    }

    /// Remove and return every member for which `stale` holds.
    pub fn drain_where(&mut self, mut stale: impl FnMut(&R) -> bool) -> Vec<R> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.records.len());
        for record in self.records.drain(..) {
            if stale(&record) {
                removed.push(record);
            } else {
                kept.push(record);
            }
        }
        self.records = kept;
        removed
    }
}

fn not_found<R: Record>(key: RecordKey<'_, R>) -> KernsyncError {
    match key {
        RecordKey::Record(record) => {
            KernsyncError::NotFound(format!("{:?} not found in record list", record))
        }
        RecordKey::Id(id) => KernsyncError::NotFound(format!("{} not found in record list", id)),
    }
}

impl<'a, R: Record> IntoIterator for &'a RecordList<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl<R: Record> fmt::Display for RecordList<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, record) in self.records.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", record)?;
        }
        write!(f, "]")
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{KernelRecord, RemoteKernelRecord};

    #[test]
    fn kernel_record_list() {
        let mut records = RecordList::new();
        let r = KernelRecord::with_id("kernel1");
        records.update(r.clone()).unwrap();
        assert!(records.contains(&r).unwrap());
        assert!(records.contains("kernel1").unwrap());
        assert_eq!(records.len(), 1);

        assert_eq!(records.get(&r).unwrap(), &r);
        assert_eq!(records.get("kernel1").unwrap(), &r);
        assert!(matches!(
            records.get("badkernel"),
            Err(KernsyncError::NotFound(_))
        ));

        let mut r_update = KernelRecord::with_id("kernel1");
        r_update.status.alive = Some(true);
        records.update(r_update).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records.get("kernel1").unwrap().status.is_alive());

        let r2 = KernelRecord::with_id("kernel2");
        records.update(r2.clone()).unwrap();
        assert!(records.contains(&r2).unwrap());
        assert_eq!(records.len(), 2);

        records.remove(&r2).unwrap();
        assert!(!records.contains(&r2).unwrap());
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut records = RecordList::new();
        records.update(KernelRecord::with_id("k1")).unwrap();
        let removed = records.remove(&KernelRecord::with_id("k9")).unwrap();
        assert!(removed.is_none());
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn list_of_remote_records() {
        let mut records = RecordList::new();
        let r = RemoteKernelRecord::new(Some("kernel1"), None);
        records.update(r.clone()).unwrap();
        assert!(records.contains("kernel1").unwrap());

        records
            .update(RemoteKernelRecord::new(Some("kernel1"), Some("remote1")))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records.contains("remote1").unwrap());

        records
            .update(RemoteKernelRecord::new(None, Some("remote2")))
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn conflicting_insert_propagates() {
        let mut records = RecordList::new();
        records
            .update(RemoteKernelRecord::new(Some("k1"), Some("r1")))
            .unwrap();
        let err = records
            .update(RemoteKernelRecord::new(Some("k1"), Some("r2")))
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            records.get("k1").unwrap().remote_id.as_deref(),
            Some("r1")
        );
    }

    #[test]
    fn drain_where_splits_members() {
        let mut records = RecordList::from_records([
            KernelRecord::with_id("k1"),
            KernelRecord::with_id("k2"),
            KernelRecord::with_id("k3"),
        ])
        .unwrap();
        let removed = records.drain_where(|r| r.kernel_id.as_deref() == Some("k2"));
        assert_eq!(removed.len(), 1);
        assert_eq!(records.len(), 2);
        let ids: Vec<_> = records.iter().filter_map(|r| r.kernel_id.clone()).collect();
        assert_eq!(ids, vec!["k1".to_string(), "k3".to_string()]);
    }

    #[test]
    fn display_lists_members() {
        let records = RecordList::from_records([KernelRecord::with_id("k1")]).unwrap();
        assert!(records.to_string().contains("k1"));
    }
}
