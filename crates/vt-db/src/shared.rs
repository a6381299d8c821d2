//! Async [`PresenceStore`] over a shared SQLite connection.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::warn;

use vt_core::{AuditEntry, CumulativeTimeRecord, PersistenceError, PresenceStore, UserId};

use crate::{Database, DbError};

/// A cloneable handle to one [`Database`].
///
/// Queries run on tokio's blocking pool so a slow disk never stalls the
/// gateway event loop.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Runs `f` against the database on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, DbError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let db = inner.lock().unwrap_or_else(PoisonError::into_inner);
            f(&db)
        })
        .await
        .map_err(|err| {
            warn!(error = %err, "database task did not complete");
            DbError::Task(err.to_string())
        })?
    }
}

impl std::fmt::Debug for SharedDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDatabase").finish_non_exhaustive()
    }
}

#[async_trait]
impl PresenceStore for SharedDatabase {
    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), PersistenceError> {
        let entry = entry.clone();
        self.run(move |db| db.append_audit_entry(&entry).map(|_| ()))
            .await
            .map_err(PersistenceError::new)
    }

    async fn upsert_cumulative_time(
        &self,
        user_id: &UserId,
        record: &CumulativeTimeRecord,
    ) -> Result<(), PersistenceError> {
        let user_id = user_id.clone();
        let record = record.clone();
        self.run(move |db| db.upsert_cumulative_time(&user_id, &record))
            .await
            .map_err(PersistenceError::new)
    }

    async fn find_cumulative_time(
        &self,
        user_id: &UserId,
    ) -> Result<Option<CumulativeTimeRecord>, PersistenceError> {
        let user_id = user_id.clone();
        self.run(move |db| db.find_cumulative_time(&user_id))
            .await
            .map_err(PersistenceError::new)
    }
}
