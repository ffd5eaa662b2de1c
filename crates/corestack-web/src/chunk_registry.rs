//! Async, IndexedDB-backed equivalent of [`corestack_core::ann::ChunkRegistry`].

use std::sync::Arc;

use corestack_core::error::Error;
use idb::TransactionMode;
use serde::{Deserialize, Serialize};

use crate::store::WebStore;

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    entity_uuid: String,
    chunk_ids: Vec<String>,
}

pub struct WebChunkRegistry {
    store: Arc<WebStore>,
}

impl WebChunkRegistry {
    pub fn new(store: Arc<WebStore>) -> Self {
        Self { store }
    }

    pub async fn set(&self, entity_uuid: &str, chunk_ids: Vec<String>) -> Result<(), Error> {
        let transaction = self
            .store
            .db()
            .transaction(&["_chunk_registry"], TransactionMode::ReadWrite)
            .map_err(|e| Error::persistence("ChunkRegistry", format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store("_chunk_registry")
            .map_err(|e| Error::persistence("ChunkRegistry", format!("open object store: {e:?}"), None))?;
        let row = Row { entity_uuid: entity_uuid.to_string(), chunk_ids };
        let value = serde_wasm_bindgen::to_value(&row)
            .map_err(|e| Error::persistence("ChunkRegistry", format!("encode {entity_uuid}: {e}"), None))?;
        object_store
            .put(&value, None)
            .map_err(|e| Error::persistence("ChunkRegistry", format!("set {entity_uuid}: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence("ChunkRegistry", format!("set {entity_uuid}: {e:?}"), None))?;
        Ok(())
    }

    pub async fn get(&self, entity_uuid: &str) -> Result<Vec<String>, Error> {
        let transaction = self
            .store
            .db()
            .transaction(&["_chunk_registry"], TransactionMode::ReadOnly)
            .map_err(|e| Error::persistence("ChunkRegistry", format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store("_chunk_registry")
            .map_err(|e| Error::persistence("ChunkRegistry", format!("open object store: {e:?}"), None))?;
        let value = object_store
            .get(
                serde_wasm_bindgen::to_value(entity_uuid)
                    .map_err(|e| Error::persistence("ChunkRegistry", format!("encode {entity_uuid}: {e}"), None))?,
            )
            .map_err(|e| Error::persistence("ChunkRegistry", format!("get {entity_uuid}: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence("ChunkRegistry", format!("get {entity_uuid}: {e:?}"), None))?;
        match value {
            Some(v) => {
                let row: Row = serde_wasm_bindgen::from_value(v)
                    .map_err(|e| Error::persistence("ChunkRegistry", format!("decode {entity_uuid}: {e}"), None))?;
                Ok(row.chunk_ids)
            }
            None => Ok(Vec::new()),
        }
    }

    pub async fn clear(&self, entity_uuid: &str) -> Result<Vec<String>, Error> {
        let current = self.get(entity_uuid).await?;
        let transaction = self
            .store
            .db()
            .transaction(&["_chunk_registry"], TransactionMode::ReadWrite)
            .map_err(|e| Error::persistence("ChunkRegistry", format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store("_chunk_registry")
            .map_err(|e| Error::persistence("ChunkRegistry", format!("open object store: {e:?}"), None))?;
        object_store
            .delete(
                serde_wasm_bindgen::to_value(entity_uuid)
                    .map_err(|e| Error::persistence("ChunkRegistry", format!("encode {entity_uuid}: {e}"), None))?,
            )
            .map_err(|e| Error::persistence("ChunkRegistry", format!("clear {entity_uuid}: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence("ChunkRegistry", format!("clear {entity_uuid}: {e:?}"), None))?;
        Ok(current)
    }
}
