//! Snapshot stores: one JSON document per (kind, aggregate id).

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::error::StoreError;

/// Keyed snapshot storage. `upsert` is the only write.
pub trait SnapshotStore: Send + Sync {
    fn upsert<T>(
        &self,
        kind: &str,
        aggregate_id: &str,
        snapshot: &T,
    ) -> impl Future<Output = Result<(), StoreError>> + Send
    where
        T: Serialize + Sync;

    fn get<T>(
        &self,
        kind: &str,
        aggregate_id: &str,
    ) -> impl Future<Output = Result<Option<T>, StoreError>> + Send
    where
        T: DeserializeOwned + Send;

    fn all<T>(&self, kind: &str) -> impl Future<Output = Result<Vec<T>, StoreError>> + Send
    where
        T: DeserializeOwned + Send;
}

#[derive(Clone, Debug)]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Drop every snapshot of `kind`. The event log can always rebuild them.
    pub async fn clear(&self, kind: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM snapshots WHERE kind = ?1")
            .bind(kind)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    async fn upsert<T>(&self, kind: &str, aggregate_id: &str, snapshot: &T) -> Result<(), StoreError>
    where
        T: Serialize + Sync,
    {
        let body = serde_json::to_string(snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO snapshots (kind, aggregate_id, body) VALUES (?1, ?2, ?3)
            ON CONFLICT(kind, aggregate_id) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(kind)
        .bind(aggregate_id)
        .bind(&body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get<T>(&self, kind: &str, aggregate_id: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM snapshots WHERE kind = ?1 AND aggregate_id = ?2")
                .bind(kind)
                .bind(aggregate_id)
                .fetch_optional(&self.pool)
                .await?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn all<T>(&self, kind: &str) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let bodies: Vec<String> =
            sqlx::query_scalar("SELECT body FROM snapshots WHERE kind = ?1 ORDER BY aggregate_id")
                .bind(kind)
                .fetch_all(&self.pool)
                .await?;
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }
}

/// In-process snapshot store. Keeps documents as JSON so it behaves like the
/// SQLite store with respect to serialization.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    docs: Arc<Mutex<BTreeMap<(String, String), Value>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let docs = self.docs.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(docs.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    async fn upsert<T>(&self, kind: &str, aggregate_id: &str, snapshot: &T) -> Result<(), StoreError>
    where
        T: Serialize + Sync,
    {
        let doc = serde_json::to_value(snapshot)?;
        let mut docs = self.docs.lock().map_err(|_| StoreError::Poisoned)?;
        docs.insert((kind.to_string(), aggregate_id.to_string()), doc);
        Ok(())
    }

    async fn get<T>(&self, kind: &str, aggregate_id: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let docs = self.docs.lock().map_err(|_| StoreError::Poisoned)?;
        match docs.get(&(kind.to_string(), aggregate_id.to_string())) {
            Some(doc) => Ok(Some(serde_json::from_value(doc.clone())?)),
            None => Ok(None),
        }
    }

    async fn all<T>(&self, kind: &str) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let docs = self.docs.lock().map_err(|_| StoreError::Poisoned)?;
        docs.iter()
            .filter(|((k, _), _)| k == kind)
            .map(|(_, doc)| serde_json::from_value(doc.clone()).map_err(StoreError::from))
            .collect()
    }
}
