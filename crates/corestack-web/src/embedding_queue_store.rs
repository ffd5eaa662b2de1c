//! Async, IndexedDB-backed equivalent of
//! [`corestack_core::embedding::EmbeddingQueueStore`], see
//! [`crate::version_store`] for why this isn't that trait directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corestack_core::embedding::{EmbeddingTask, TaskStatus};
use corestack_core::error::Error;
use idb::{KeyRange, TransactionMode};

use crate::store::WebStore;

pub struct WebEmbeddingQueueStore {
    store: Arc<WebStore>,
    next_id: AtomicU64,
}

impl WebEmbeddingQueueStore {
    pub fn new(store: Arc<WebStore>) -> Self {
        Self { store, next_id: AtomicU64::new(0) }
    }

    async fn load(&self, id: u64) -> Result<EmbeddingTask, Error> {
        let transaction = self
            .store
            .db()
            .transaction(&["_embedding_tasks"], TransactionMode::ReadOnly)
            .map_err(|e| Error::persistence("EmbeddingTask", format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store("_embedding_tasks")
            .map_err(|e| Error::persistence("EmbeddingTask", format!("open object store: {e:?}"), None))?;
        let value = object_store
            .get(
                serde_wasm_bindgen::to_value(&id)
                    .map_err(|e| Error::persistence("EmbeddingTask", format!("encode id {id}: {e}"), None))?,
            )
            .map_err(|e| Error::persistence("EmbeddingTask", format!("get {id}: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence("EmbeddingTask", format!("get {id}: {e:?}"), None))?
            .ok_or_else(|| Error::not_found("EmbeddingTask", id))?;
        serde_wasm_bindgen::from_value(value).map_err(|e| Error::persistence("EmbeddingTask", format!("decode {id}: {e}"), None))
    }

    async fn store_task(&self, task: &EmbeddingTask) -> Result<(), Error> {
        let transaction = self
            .store
            .db()
            .transaction(&["_embedding_tasks"], TransactionMode::ReadWrite)
            .map_err(|e| Error::persistence("EmbeddingTask", format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store("_embedding_tasks")
            .map_err(|e| Error::persistence("EmbeddingTask", format!("open object store: {e:?}"), None))?;
        let value = serde_wasm_bindgen::to_value(task)
            .map_err(|e| Error::persistence("EmbeddingTask", format!("encode {}: {e}", task.id), None))?;
        object_store
            .put(&value, None)
            .map_err(|e| Error::persistence("EmbeddingTask", format!("save {}: {e:?}", task.id), None))?
            .await
            .map_err(|e| Error::persistence("EmbeddingTask", format!("save {}: {e:?}", task.id), None))?;
        Ok(())
    }

    pub async fn enqueue(&self, mut task: EmbeddingTask) -> Result<EmbeddingTask, Error> {
        task.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        task.status = TaskStatus::Pending;
        self.store_task(&task).await?;
        Ok(task)
    }

    pub async fn next_pending(&self, limit: usize) -> Result<Vec<EmbeddingTask>, Error> {
        let transaction = self
            .store
            .db()
            .transaction(&["_embedding_tasks"], TransactionMode::ReadOnly)
            .map_err(|e| Error::persistence("EmbeddingTask", format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store("_embedding_tasks")
            .map_err(|e| Error::persistence("EmbeddingTask", format!("open object store: {e:?}"), None))?;
        let index = object_store
            .index("status")
            .map_err(|e| Error::persistence("EmbeddingTask", format!("open status index: {e:?}"), None))?;
        let status_value = serde_wasm_bindgen::to_value(&TaskStatus::Pending)
            .map_err(|e| Error::persistence("EmbeddingTask", format!("encode status: {e}"), None))?;
        let values = index
            .get_all(
                Some(idb::Query::KeyRange(KeyRange::only(&status_value).map_err(|e| {
                    Error::persistence("EmbeddingTask", format!("build key range: {e:?}"), None)
                })?)),
                Some(limit as u32),
            )
            .map_err(|e| Error::persistence("EmbeddingTask", format!("scan pending: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence("EmbeddingTask", format!("scan pending: {e:?}"), None))?;
        values
            .into_iter()
            .map(|v| serde_wasm_bindgen::from_value(v).map_err(|e| Error::persistence("EmbeddingTask", format!("decode: {e}"), None)))
            .collect()
    }

    pub async fn mark_in_flight(&self, id: u64) -> Result<(), Error> {
        let mut task = self.load(id).await?;
        task.status = TaskStatus::InFlight;
        self.store_task(&task).await
    }

    pub async fn mark_completed(&self, id: u64) -> Result<(), Error> {
        let mut task = self.load(id).await?;
        task.status = TaskStatus::Completed;
        self.store_task(&task).await
    }

    pub async fn mark_failed(&self, id: u64, error: &str) -> Result<(), Error> {
        let mut task = self.load(id).await?;
        task.status = TaskStatus::Failed;
        task.attempts += 1;
        task.last_error = Some(error.to_string());
        self.store_task(&task).await
    }
}
