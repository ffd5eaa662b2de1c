//! Persistence for the web backend's software HNSW index:
//! an in-memory [`HnswIndex`] backed by a `{key, bytes, version,
//! entityCount, lastUpdated}` blob record in the `_hnsw_index` store.
//!
//! The in-memory index is always the source of truth between flushes;
//! the blob only needs to be current enough to avoid a full rebuild on
//! the next page load.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use corestack_ann::HnswIndex;
use corestack_core::ann::AnnIndex;
use corestack_core::error::Error;
use idb::{KeyRange, TransactionMode};
use serde::{Deserialize, Serialize};

use crate::store::WebStore;

#[derive(Debug, Serialize, Deserialize)]
struct HnswBlobRecord {
    key: String,
    bytes: Vec<u8>,
    version: u32,
    entity_count: u64,
    last_updated: chrono::DateTime<Utc>,
}

/// A named HNSW index (e.g. `"notes_index"`), flushed to IndexedDB
/// every `flush_every` mutations.
pub struct WebHnswIndex {
    store: Arc<WebStore>,
    key: String,
    index: HnswIndex,
    flush_every: u32,
    dirty_ops: AtomicU32,
}

impl WebHnswIndex {
    /// Load `key`'s blob if present and decodable; otherwise start
    /// empty. Callers should follow up with [`Self::rebuild`] when this
    /// returns with an empty index but the entity store is non-empty.
    pub async fn open(store: Arc<WebStore>, key: impl Into<String>, flush_every: u32) -> Result<Self, Error> {
        let key = key.into();
        let transaction = store
            .db()
            .transaction(&["_hnsw_index"], TransactionMode::ReadOnly)
            .map_err(|e| Error::persistence(&key, format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store("_hnsw_index")
            .map_err(|e| Error::persistence(&key, format!("open object store: {e:?}"), None))?;
        let value = object_store
            .get(KeyRange::only(&wasm_bindgen::JsValue::from_str(&key)).map_err(|e| {
                Error::persistence(&key, format!("build key range: {e:?}"), None)
            })?)
            .map_err(|e| Error::persistence(&key, format!("get blob: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence(&key, format!("get blob: {e:?}"), None))?;

        let index = match value {
            Some(v) => {
                let record: HnswBlobRecord = serde_wasm_bindgen::from_value(v)
                    .map_err(|e| Error::persistence(&key, format!("decode blob: {e}"), None))?;
                match HnswIndex::load(&record.bytes) {
                    Ok(index) => index,
                    Err(err) => {
                        tracing::warn!(%err, %key, "failed to decode stored HNSW blob, starting empty");
                        HnswIndex::new()
                    }
                }
            }
            None => HnswIndex::new(),
        };

        Ok(Self {
            store,
            key,
            index,
            flush_every: flush_every.max(1),
            dirty_ops: AtomicU32::new(0),
        })
    }

    pub fn index(&self) -> &HnswIndex {
        &self.index
    }

    /// Mirrors the in-memory index's `add`/`delete`, flushing to
    /// IndexedDB every `flush_every` mutations.
    pub async fn add(&self, id: &str, vector: &[f32]) -> Result<(), Error> {
        self.index.add(id, vector)?;
        self.maybe_flush().await
    }

    pub async fn remove(&self, id: &str) -> Result<(), Error> {
        self.index.remove(id)?;
        self.maybe_flush().await
    }

    async fn maybe_flush(&self) -> Result<(), Error> {
        let ops = self.dirty_ops.fetch_add(1, Ordering::SeqCst) + 1;
        if ops >= self.flush_every {
            self.dirty_ops.store(0, Ordering::SeqCst);
            self.flush().await?;
        }
        Ok(())
    }

    /// Force a re-serialization regardless of the dirty-op counter;
    /// callers should also call this on graceful shutdown.
    pub async fn flush(&self) -> Result<(), Error> {
        let record = HnswBlobRecord {
            key: self.key.clone(),
            bytes: self.index.save(),
            version: 1,
            entity_count: self.index.total_len() as u64,
            last_updated: Utc::now(),
        };
        let transaction = self
            .store
            .db()
            .transaction(&["_hnsw_index"], TransactionMode::ReadWrite)
            .map_err(|e| Error::persistence(&self.key, format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store("_hnsw_index")
            .map_err(|e| Error::persistence(&self.key, format!("open object store: {e:?}"), None))?;
        let value = serde_wasm_bindgen::to_value(&record)
            .map_err(|e| Error::persistence(&self.key, format!("encode blob: {e}"), None))?;
        object_store
            .put(&value, None)
            .map_err(|e| Error::persistence(&self.key, format!("flush blob: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence(&self.key, format!("flush blob: {e:?}"), None))?;
        Ok(())
    }

    /// Scan the entity store and re-add every entity whose embedding is
    /// present, recovery procedure.
    pub fn rebuild<T: corestack_core::entity::BaseEntity>(
        &mut self,
        rows: &[T],
        embedding_of: impl Fn(&T) -> Option<Vec<f32>>,
    ) -> Result<(), Error> {
        let fresh = HnswIndex::new();
        for row in rows {
            if let Some(embedding) = embedding_of(row) {
                fresh.add(row.uuid(), &embedding)?;
            }
        }
        self.index = fresh;
        Ok(())
    }
}
