//! Async, IndexedDB-backed equivalent of [`corestack_core::version::VersionStore`].
//!
//! Not implemented as that (synchronous) trait for the same reason
//! [`crate::adapter::IdbAdapter`] isn't: every IndexedDB read needs to
//! suspend. Application glue on this backend calls these methods
//! directly rather than going through [`corestack_core::version::record_version`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corestack_core::error::Error;
use corestack_core::version::EntityVersion;
use idb::TransactionMode;

use crate::store::WebStore;

pub struct WebVersionStore {
    store: Arc<WebStore>,
    next_id: AtomicU64,
}

impl WebVersionStore {
    pub fn new(store: Arc<WebStore>) -> Self {
        Self { store, next_id: AtomicU64::new(0) }
    }

    pub async fn versions_for(&self, entity_type: &str, entity_uuid: &str) -> Result<Vec<EntityVersion>, Error> {
        let transaction = self
            .store
            .db()
            .transaction(&["_versions"], TransactionMode::ReadOnly)
            .map_err(|e| Error::persistence("EntityVersion", format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store("_versions")
            .map_err(|e| Error::persistence("EntityVersion", format!("open object store: {e:?}"), None))?;
        let index = object_store
            .index("entityUuid")
            .map_err(|e| Error::persistence("EntityVersion", format!("open entityUuid index: {e:?}"), None))?;
        let values = index
            .get_all(
                Some(idb::Query::Key(
                    serde_wasm_bindgen::to_value(entity_uuid)
                        .map_err(|e| Error::persistence("EntityVersion", format!("encode uuid: {e}"), None))?,
                )),
                None,
            )
            .map_err(|e| Error::persistence("EntityVersion", format!("scan: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence("EntityVersion", format!("scan: {e:?}"), None))?;

        let mut rows: Vec<EntityVersion> = values
            .into_iter()
            .map(|v| {
                serde_wasm_bindgen::from_value::<EntityVersion>(v)
                    .map_err(|e| Error::persistence("EntityVersion", format!("decode: {e}"), None))
            })
            .collect::<Result<_, _>>()?;
        rows.retain(|v| v.entity_type == entity_type);
        rows.sort_by_key(|v| v.version_number);
        Ok(rows)
    }

    pub async fn latest_version_number(&self, entity_type: &str, entity_uuid: &str) -> Result<u64, Error> {
        Ok(self
            .versions_for(entity_type, entity_uuid)
            .await?
            .iter()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0))
    }

    pub async fn append(&self, mut version: EntityVersion) -> Result<EntityVersion, Error> {
        version.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let transaction = self
            .store
            .db()
            .transaction(&["_versions"], TransactionMode::ReadWrite)
            .map_err(|e| Error::persistence("EntityVersion", format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store("_versions")
            .map_err(|e| Error::persistence("EntityVersion", format!("open object store: {e:?}"), None))?;
        let value = serde_wasm_bindgen::to_value(&version)
            .map_err(|e| Error::persistence("EntityVersion", format!("encode: {e}"), None))?;
        object_store
            .put(&value, None)
            .map_err(|e| Error::persistence("EntityVersion", format!("append: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence("EntityVersion", format!("append: {e:?}"), None))?;
        Ok(version)
    }
}
