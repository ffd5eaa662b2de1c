//! sled-backed [`ChunkRegistry`]: one row per entity uuid holding its
//! current chunk id list as a JSON array.

use std::sync::Arc;

use corestack_core::ann::ChunkRegistry;
use corestack_core::error::Error;

use crate::store::NativeStore;

const TREE: &str = "_chunk_registry";

pub struct SledChunkRegistry {
    store: Arc<NativeStore>,
}

impl SledChunkRegistry {
    pub fn new(store: Arc<NativeStore>) -> Self {
        Self { store }
    }

    fn tree(&self) -> Result<sled::Tree, Error> {
        self.store.open_tree(TREE)
    }
}

impl ChunkRegistry for SledChunkRegistry {
    fn set(&self, entity_uuid: &str, chunk_ids: Vec<String>) -> Result<(), Error> {
        let bytes = serde_json::to_vec(&chunk_ids)
            .map_err(|e| Error::persistence("ChunkRegistry", format!("encode {entity_uuid}: {e}"), Some(Box::new(e))))?;
        self.tree()?
            .insert(entity_uuid.as_bytes(), bytes)
            .map_err(|e| Error::persistence("ChunkRegistry", format!("set {entity_uuid}: {e}"), Some(Box::new(e))))?;
        Ok(())
    }

    fn get(&self, entity_uuid: &str) -> Result<Vec<String>, Error> {
        match self
            .tree()?
            .get(entity_uuid.as_bytes())
            .map_err(|e| Error::persistence("ChunkRegistry", format!("get {entity_uuid}: {e}"), Some(Box::new(e))))?
        {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::persistence("ChunkRegistry", format!("decode {entity_uuid}: {e}"), Some(Box::new(e)))),
            None => Ok(Vec::new()),
        }
    }

    fn clear(&self, entity_uuid: &str) -> Result<Vec<String>, Error> {
        let current = self.get(entity_uuid)?;
        self.tree()?
            .remove(entity_uuid.as_bytes())
            .map_err(|e| Error::persistence("ChunkRegistry", format!("clear {entity_uuid}: {e}"), Some(Box::new(e))))?;
        Ok(current)
    }
}
