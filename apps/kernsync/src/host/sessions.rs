//! In-memory session store.

use crate::sync::{Session, SessionStore};
use async_trait::async_trait;
use kernsync_core::KernsyncError;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Rows {
    sessions: BTreeMap<String, Session>,
    pending: BTreeSet<String>,
}

/// Session rows held in memory, keyed by session id.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    rows: RwLock<Rows>,
}

impl MemorySessionStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a session row.
    pub async fn insert(&self, session: Session) {
        let mut rows = self.rows.write().await;
        rows.pending.remove(&session.kernel_id);
        rows.sessions.insert(session.id.clone(), session);
    }

    /// Mark a session for `kernel_id` as being created.
    pub async fn mark_pending(&self, kernel_id: &str) {
        self.rows.write().await.pending.insert(kernel_id.to_string());
    }

    /// Number of session rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.sessions.len()
    }

    /// Whether the store has no session rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn list_sessions(&self) -> Result<Vec<Session>, KernsyncError> {
        Ok(self.rows.read().await.sessions.values().cloned().collect())
    }

    async fn get_session_by_kernel(&self, kernel_id: &str) -> Result<Option<Session>, KernsyncError> {
        Ok(self
            .rows
            .read()
            .await
            .sessions
            .values()
            .find(|s| s.kernel_id == kernel_id)
            .cloned())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), KernsyncError> {
        self.rows
            .write()
            .await
            .sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| KernsyncError::NotFound(format!("session {}", session_id)))
    }

    async fn delete_sessions_for_kernel(&self, kernel_id: &str) -> Result<usize, KernsyncError> {
        let mut rows = self.rows.write().await;
        let before = rows.sessions.len();
        rows.sessions.retain(|_, s| s.kernel_id != kernel_id);
        Ok(before - rows.sessions.len())
    }

    async fn pending_kernel_ids(&self) -> Result<Vec<String>, KernsyncError> {
        Ok(self.rows.read().await.pending.iter().cloned().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_by_kernel_removes_all_rows() {
        let store = MemorySessionStore::new();
        store.insert(Session::new("s1", "k1", "a.ipynb")).await;
        store.insert(Session::new("s2", "k1", "b.ipynb")).await;
        store.insert(Session::new("s3", "k2", "c.ipynb")).await;

        assert_eq!(store.delete_sessions_for_kernel("k1").await.unwrap(), 2);
        assert_eq!(store.len().await, 1);
        assert!(store.get_session_by_kernel("k1").await.unwrap().is_none());
        assert_eq!(
            store.get_session_by_kernel("k2").await.unwrap().map(|s| s.id),
            Some("s3".to_string())
        );
    }

    #[tokio::test]
    async fn delete_missing_session_fails() {
        let store = MemorySessionStore::new();
        assert!(store.delete_session("nope").await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn insert_clears_pending() {
        let store = MemorySessionStore::new();
        store.mark_pending("k1").await;
        assert_eq!(store.pending_kernel_ids().await.unwrap(), vec!["k1"]);
        store.insert(Session::new("s1", "k1", "a.ipynb")).await;
        assert!(store.pending_kernel_ids().await.unwrap().is_empty());
    }
}
