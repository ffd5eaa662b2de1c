//! Durable background embedding queue.
//!
//! An append-only log of tasks with a monotonic id counter, the same
//! shape as a replication changelog but repurposed as a persisted work
//! queue instead of a replication log.

use serde::{Deserialize, Serialize};

use crate::adapter::BackendAdapter;
use crate::capability::Embeddable;
use crate::entity::BaseEntity;
use crate::error::Error;

/// Lifecycle state of one queued embedding job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
}

/// One unit of embedding work: "compute and store the embedding for
/// entity `entity_uuid` of type `entity_type`."
///
/// `text` is the entity's `toEmbeddingInput()` output captured at
/// enqueue time, not recomputed when the task is processed: the entity
/// row may have changed (or been deleted) by then, and the queue's job
/// is to embed what was true when the save that triggered it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingTask {
    pub id: u64,
    pub entity_type: String,
    pub entity_uuid: String,
    pub text: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
}

impl EmbeddingTask {
    pub fn new(entity_type: impl Into<String>, entity_uuid: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.into(),
            entity_uuid: entity_uuid.into(),
            text: text.into(),
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            enqueued_at: chrono::Utc::now(),
        }
    }
}

/// A provider of embedding vectors for arbitrary input text.
///
/// Deliberately synchronous: callers (the queue's `process_batch`) run
/// on a background worker, not inside a transaction, so there is no
/// "no suspension" constraint here, but the embedding services this
/// crate ships against are local models invoked synchronously, matching
/// how the corpus's own synchronous adapters behave.
pub trait EmbeddingService: Send + Sync {
    /// Compute an embedding for `text`, or `None` if the service is
    /// unavailable (queue treats this as a retryable failure, not a
    /// permanent one).
    fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Durable storage for the queue itself, independent of which backend
/// persists the entities being embedded.
pub trait EmbeddingQueueStore: Send + Sync {
    /// Append a new pending task, assigning it an id.
    fn enqueue(&self, task: EmbeddingTask) -> Result<EmbeddingTask, Error>;
    /// The oldest `limit` pending tasks, oldest first.
    fn next_pending(&self, limit: usize) -> Result<Vec<EmbeddingTask>, Error>;
    /// Mark a task in-flight before processing it.
    fn mark_in_flight(&self, id: u64) -> Result<(), Error>;
    /// Mark a task completed.
    fn mark_completed(&self, id: u64) -> Result<(), Error>;
    /// Mark a task failed, recording `error` and incrementing attempts.
    fn mark_failed(&self, id: u64, error: &str) -> Result<(), Error>;
}

/// Upper bound on tasks drained by one [`EmbeddingQueue::flush`] call,
/// guarding against an unavailable embedding service spinning forever
/// re-queuing the same failures.
pub const MAX_FLUSH_BATCH: usize = 64;

/// Drains queued embedding work for entities of type `T`, writing
/// resulting vectors back through `adapter`.
pub struct EmbeddingQueue<T, A> {
    store: Box<dyn EmbeddingQueueStore>,
    service: Box<dyn EmbeddingService>,
    adapter: A,
    _marker: std::marker::PhantomData<T>,
}

impl<T, A> EmbeddingQueue<T, A>
where
    T: BaseEntity + Embeddable,
    A: BackendAdapter<T>,
{
    pub fn new(
        store: Box<dyn EmbeddingQueueStore>,
        service: Box<dyn EmbeddingService>,
        adapter: A,
    ) -> Self {
        Self {
            store,
            service,
            adapter,
            _marker: std::marker::PhantomData,
        }
    }

    /// Enqueue embedding work for `entity`. Called by
    /// [`crate::handlers::EmbeddableHandler`] after save.
    pub fn enqueue(&self, entity: &T) -> Result<(), Error> {
        self.store.enqueue(EmbeddingTask::new(
            T::ENTITY_TYPE,
            entity.uuid(),
            entity.to_embedding_input(),
        ))?;
        Ok(())
    }

    /// Synchronously drain up to [`MAX_FLUSH_BATCH`] pending tasks.
    ///
    /// Used by background workers on a timer, and directly by tests
    /// that need deterministic queue draining.
    pub fn flush(&self) -> Result<usize, Error> {
        self.process_batch(MAX_FLUSH_BATCH)
    }

    /// Drain up to `limit` pending tasks, returning the number
    /// processed (completed or failed, not re-queued).
    pub fn process_batch(&self, limit: usize) -> Result<usize, Error> {
        let tasks = self.store.next_pending(limit)?;
        let mut processed = 0;
        for task in tasks {
            self.store.mark_in_flight(task.id)?;
            match self.adapter.find_by_uuid(&task.entity_uuid)? {
                None => {
                    // Entity was deleted before its embedding ran; this is
                    // not a failure of the embedding pipeline.
                    self.store.mark_completed(task.id)?;
                }
                Some(mut entity) => {
                    match self.service.embed(&task.text) {
                        Some(vector) => {
                            entity.set_embedding(Some(vector));
                            self.adapter.save(entity)?;
                            self.store.mark_completed(task.id)?;
                        }
                        None => {
                            self.store
                                .mark_failed(task.id, "embedding service unavailable")?;
                        }
                    }
                }
            }
            processed += 1;
        }
        Ok(processed)
    }
}
