//! In-memory implementation of `TaskStore`.
//!
//! Snapshots live in a `HashMap` behind an `Arc<Mutex<_>>`. Clones share the
//! same map, so a test can hand one clone to an engine and inspect another.
//! Nothing survives the process.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use tracing::debug;

use stepwise_contracts::{
    error::{StoreError, StoreResult},
    task::TaskId,
};
use stepwise_core::traits::TaskStore;

#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    entries: Arc<Mutex<HashMap<TaskId, Vec<u8>>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every stored task, in no particular order.
    pub fn task_ids(&self) -> StoreResult<Vec<TaskId>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<TaskId, Vec<u8>>>> {
        self.entries.lock().map_err(|_| StoreError::Io {
            reason: "in-memory store lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task_id: &TaskId, snapshot: &[u8]) -> StoreResult<()> {
        self.lock()?.insert(task_id.clone(), snapshot.to_vec());
        debug!(task_id = %task_id, bytes = snapshot.len(), "snapshot stored in memory");
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> StoreResult<Vec<u8>> {
        self.lock()?
            .get(task_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { task_id: task_id.to_string() })
    }

    async fn take(&self, task_id: &TaskId) -> StoreResult<Vec<u8>> {
        self.lock()?
            .remove(task_id)
            .ok_or_else(|| StoreError::NotFound { task_id: task_id.to_string() })
    }

    async fn delete(&self, task_id: &TaskId) -> StoreResult<bool> {
        Ok(self.lock()?.remove(task_id).is_some())
    }
}
