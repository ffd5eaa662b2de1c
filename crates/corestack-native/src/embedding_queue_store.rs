//! sled-backed [`EmbeddingQueueStore`]: tasks keyed by id, with a
//! `pending` tree mirroring just the pending ids in insertion order so
//! `next_pending` doesn't need a full scan.

use std::sync::Arc;

use corestack_core::embedding::{EmbeddingQueueStore, EmbeddingTask, TaskStatus};
use corestack_core::error::Error;

use crate::store::NativeStore;

const TASKS_TREE: &str = "_embedding_tasks";
const PENDING_TREE: &str = "_embedding_pending";
const COUNTER: &str = "_embedding_tasks";

pub struct SledEmbeddingQueueStore {
    store: Arc<NativeStore>,
}

impl SledEmbeddingQueueStore {
    pub fn new(store: Arc<NativeStore>) -> Self {
        Self { store }
    }

    fn tasks(&self) -> Result<sled::Tree, Error> {
        self.store.open_tree(TASKS_TREE)
    }

    fn pending(&self) -> Result<sled::Tree, Error> {
        self.store.open_tree(PENDING_TREE)
    }

    fn load(&self, id: u64) -> Result<EmbeddingTask, Error> {
        let bytes = self
            .tasks()?
            .get(id.to_be_bytes())
            .map_err(|e| Error::persistence("EmbeddingTask", format!("lookup {id}: {e}"), Some(Box::new(e))))?
            .ok_or_else(|| Error::not_found("EmbeddingTask", id))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::persistence("EmbeddingTask", format!("decode {id}: {e}"), Some(Box::new(e))))
    }

    fn store_task(&self, task: &EmbeddingTask) -> Result<(), Error> {
        let bytes = serde_json::to_vec(task)
            .map_err(|e| Error::persistence("EmbeddingTask", format!("encode {}: {e}", task.id), Some(Box::new(e))))?;
        self.tasks()?
            .insert(task.id.to_be_bytes(), bytes)
            .map_err(|e| Error::persistence("EmbeddingTask", format!("save {}: {e}", task.id), Some(Box::new(e))))?;
        Ok(())
    }
}

impl EmbeddingQueueStore for SledEmbeddingQueueStore {
    fn enqueue(&self, mut task: EmbeddingTask) -> Result<EmbeddingTask, Error> {
        task.id = self.store.next_id(COUNTER)?;
        task.status = TaskStatus::Pending;
        self.store_task(&task)?;
        self.pending()?
            .insert(task.id.to_be_bytes(), &[])
            .map_err(|e| Error::persistence("EmbeddingTask", format!("enqueue {}: {e}", task.id), Some(Box::new(e))))?;
        Ok(task)
    }

    fn next_pending(&self, limit: usize) -> Result<Vec<EmbeddingTask>, Error> {
        let ids: Vec<u64> = self
            .pending()?
            .iter()
            .keys()
            .take(limit)
            .map(|res| {
                res.map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0; 8])))
                    .map_err(|e| Error::persistence("EmbeddingTask", format!("scan pending: {e}"), Some(Box::new(e))))
            })
            .collect::<Result<_, _>>()?;
        ids.into_iter().map(|id| self.load(id)).collect()
    }

    fn mark_in_flight(&self, id: u64) -> Result<(), Error> {
        let mut task = self.load(id)?;
        task.status = TaskStatus::InFlight;
        self.store_task(&task)
    }

    fn mark_completed(&self, id: u64) -> Result<(), Error> {
        let mut task = self.load(id)?;
        task.status = TaskStatus::Completed;
        self.store_task(&task)?;
        self.pending()?
            .remove(id.to_be_bytes())
            .map_err(|e| Error::persistence("EmbeddingTask", format!("dequeue {id}: {e}"), Some(Box::new(e))))?;
        Ok(())
    }

    fn mark_failed(&self, id: u64, error: &str) -> Result<(), Error> {
        let mut task = self.load(id)?;
        task.status = TaskStatus::Failed;
        task.attempts += 1;
        task.last_error = Some(error.to_string());
        self.store_task(&task)?;
        self.pending()?
            .remove(id.to_be_bytes())
            .map_err(|e| Error::persistence("EmbeddingTask", format!("dequeue {id}: {e}"), Some(Box::new(e))))?;
        Ok(())
    }
}
