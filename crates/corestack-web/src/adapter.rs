//! `IndexedDB`-backed adapter.
//!
//! Point lookups and scans on this backend are genuinely asynchronous
//! (`IDBRequest` resolves on `onsuccess`), so [`IdbAdapter`] exposes its
//! real API as `async fn`s. It also implements the synchronous
//! [`BackendAdapter`] trait for interop with [`corestack_core::repository::Repository`],
//! but most of that surface cannot be satisfied without suspending, so
//! those methods fail fast with a `QueryError` pointing callers at the
//! async methods instead. Only the operations explicitly supported
//! inside a transaction (`saveInTx`, `deleteByUuidInTx`) are
//! implemented for real: issuing an IndexedDB request is itself a
//! synchronous call (only its result is awaited), so a write can be
//! staged without suspending.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corestack_core::adapter::BackendAdapter;
use corestack_core::entity::{assign_identity_defaults, BaseEntity, SyncStatus};
use corestack_core::error::Error;
use idb::{KeyRange, TransactionMode};

use crate::store::WebStore;
use crate::transaction::WebTxContext;

const NOT_SUPPORTED: &str =
    "not supported synchronously on the web backend outside a transaction; use IdbAdapter's async methods";

pub struct IdbAdapter<T: BaseEntity> {
    store: Arc<WebStore>,
    next_id: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: BaseEntity> IdbAdapter<T> {
    /// Open the adapter, seeding its client-side id counter from the
    /// highest `id` currently stored (IndexedDB has no atomic
    /// auto-increment-and-fetch primitive usable from Rust the way
    /// `sled::Tree::update_and_fetch` is on the native backend).
    pub async fn open(store: Arc<WebStore>) -> Result<Self, Error> {
        let transaction = store
            .db()
            .transaction(&[T::ENTITY_TYPE], TransactionMode::ReadOnly)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store(T::ENTITY_TYPE)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open object store: {e:?}"), None))?;
        let index = object_store
            .index("id")
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open id index: {e:?}"), None))?;
        let cursor = index
            .open_cursor(None, Some(idb::CursorDirection::Prev))
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open id cursor: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("seek max id: {e:?}"), None))?;

        let seed = match cursor {
            Some(cursor) => serde_wasm_bindgen::from_value::<u64>(cursor.key().unwrap_or(wasm_bindgen::JsValue::NULL)).unwrap_or(0),
            None => 0,
        };

        Ok(Self {
            store,
            next_id: AtomicU64::new(seed),
            _marker: PhantomData,
        })
    }

    fn decode(&self, value: wasm_bindgen::JsValue) -> Result<T, Error> {
        let json: serde_json::Value = serde_wasm_bindgen::from_value(value)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("decode row: {e}"), None))?;
        T::from_json(&json).map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("decode row: {e}"), Some(Box::new(e))))
    }

    fn encode(&self, entity: &T) -> Result<wasm_bindgen::JsValue, Error> {
        let json = entity
            .to_json()
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("encode row: {e}"), Some(Box::new(e))))?;
        serde_wasm_bindgen::to_value(&json).map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("encode row: {e}"), None))
    }

    fn prepare_for_save(&self, mut entity: T, touch: bool) -> T {
        let now = chrono::Utc::now();
        assign_identity_defaults(&mut entity, now);
        if entity.id() == 0 {
            entity.set_id(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        }
        if touch {
            entity.set_updated_at(now);
        }
        entity
    }

    pub async fn find_by_uuid(&self, uuid: &str) -> Result<Option<T>, Error> {
        let transaction = self
            .store
            .db()
            .transaction(&[T::ENTITY_TYPE], TransactionMode::ReadOnly)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store(T::ENTITY_TYPE)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open object store: {e:?}"), None))?;
        let value = object_store
            .get(KeyRange::only(&wasm_bindgen::JsValue::from_str(uuid)).map_err(|e| {
                Error::persistence(T::ENTITY_TYPE, format!("build key range: {e:?}"), None)
            })?)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("get {uuid}: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("get {uuid}: {e:?}"), None))?;

        match value {
            Some(v) => Ok(Some(self.decode(v)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_id(&self, id: u64) -> Result<Option<T>, Error> {
        let transaction = self
            .store
            .db()
            .transaction(&[T::ENTITY_TYPE], TransactionMode::ReadOnly)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store(T::ENTITY_TYPE)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open object store: {e:?}"), None))?;
        let index = object_store
            .index("id")
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open id index: {e:?}"), None))?;
        let value = index
            .get(
                serde_wasm_bindgen::to_value(&id)
                    .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("encode id {id}: {e}"), None))?,
            )
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("get id {id}: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("get id {id}: {e:?}"), None))?;

        match value {
            Some(v) => Ok(Some(self.decode(v)?)),
            None => Ok(None),
        }
    }

    pub async fn find_all(&self) -> Result<Vec<T>, Error> {
        let transaction = self
            .store
            .db()
            .transaction(&[T::ENTITY_TYPE], TransactionMode::ReadOnly)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store(T::ENTITY_TYPE)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open object store: {e:?}"), None))?;
        let values = object_store
            .get_all(None, None)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("scan: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("scan: {e:?}"), None))?;
        values.into_iter().map(|v| self.decode(v)).collect()
    }

    pub async fn find_unsynced(&self) -> Result<Vec<T>, Error> {
        Ok(self.find_all().await?.into_iter().filter(|e| e.sync_status() == SyncStatus::Local).collect())
    }

    pub async fn count(&self) -> Result<u64, Error> {
        Ok(self.find_all().await?.len() as u64)
    }

    pub async fn save(&self, entity: T) -> Result<T, Error> {
        let entity = self.prepare_for_save(entity, T::TOUCH_ON_SAVE);
        let transaction = self
            .store
            .db()
            .transaction(&[T::ENTITY_TYPE], TransactionMode::ReadWrite)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store(T::ENTITY_TYPE)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open object store: {e:?}"), None))?;
        let value = self.encode(&entity)?;
        object_store
            .put(&value, None)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("save: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("save: {e:?}"), None))?;
        Ok(entity)
    }

    pub async fn delete_by_uuid(&self, uuid: &str) -> Result<bool, Error> {
        if self.find_by_uuid(uuid).await?.is_none() {
            return Ok(false);
        }
        let transaction = self
            .store
            .db()
            .transaction(&[T::ENTITY_TYPE], TransactionMode::ReadWrite)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open transaction: {e:?}"), None))?;
        let object_store = transaction
            .object_store(T::ENTITY_TYPE)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("open object store: {e:?}"), None))?;
        object_store
            .delete(KeyRange::only(&wasm_bindgen::JsValue::from_str(uuid)).map_err(|e| {
                Error::persistence(T::ENTITY_TYPE, format!("build key range: {e:?}"), None)
            })?)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("delete {uuid}: {e:?}"), None))?
            .await
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("delete {uuid}: {e:?}"), None))?;
        Ok(true)
    }

    pub async fn delete(&self, id: u64) -> Result<bool, Error> {
        match self.find_by_id(id).await? {
            Some(entity) => self.delete_by_uuid(entity.uuid()).await,
            None => Ok(false),
        }
    }
}

impl<T: BaseEntity> BackendAdapter<T> for IdbAdapter<T> {
    type Ctx = WebTxContext;

    fn find_by_id(&self, _id: u64) -> Result<Option<T>, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }
    fn find_by_uuid(&self, _uuid: &str) -> Result<Option<T>, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }
    fn find_all(&self) -> Result<Vec<T>, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }
    fn find_unsynced(&self) -> Result<Vec<T>, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }
    fn count(&self) -> Result<u64, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }
    fn save_with_touch(&self, _entity: T, _touch: bool) -> Result<T, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }
    fn delete(&self, _id: u64) -> Result<bool, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }
    fn delete_by_uuid(&self, _uuid: &str) -> Result<bool, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }

    /// Supported: enqueuing an IndexedDB `put` is itself a synchronous
    /// call.
    fn save_in_tx(&self, ctx: &mut Self::Ctx, entity: T, touch: bool) -> Result<T, Error> {
        let entity = self.prepare_for_save(entity, touch);
        let value = self.encode(&entity)?;
        let object_store = ctx.object_store(T::ENTITY_TYPE)?;
        object_store
            .put(&value, None)
            .map_err(|e| Error::transaction(T::ENTITY_TYPE, format!("stage save: {e:?}"), None))?;
        Ok(entity)
    }

    /// Not supported: requires a synchronous id-index
    /// lookup this backend cannot resolve without suspending.
    fn find_by_id_in_tx(&self, _ctx: &mut Self::Ctx, _id: u64) -> Result<Option<T>, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }
    /// Not supported.
    fn find_by_uuid_in_tx(&self, _ctx: &mut Self::Ctx, _uuid: &str) -> Result<Option<T>, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }
    /// Not supported.
    fn find_all_in_tx(&self, _ctx: &mut Self::Ctx) -> Result<Vec<T>, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }
    /// Not supported: delete-by-integer-id needs the same
    /// synchronous id-index lookup `findByIdInTx` lacks.
    fn delete_in_tx(&self, _ctx: &mut Self::Ctx, _id: u64) -> Result<bool, Error> {
        Err(Error::QueryError { entity_type: T::ENTITY_TYPE.to_string(), message: NOT_SUPPORTED.to_string() })
    }

    /// Supported: deletes by the uuid primary key, requiring no index lookup.
    fn delete_by_uuid_in_tx(&self, ctx: &mut Self::Ctx, uuid: &str) -> Result<bool, Error> {
        let object_store = ctx.object_store(T::ENTITY_TYPE)?;
        object_store
            .delete(KeyRange::only(&wasm_bindgen::JsValue::from_str(uuid)).map_err(|e| {
                Error::transaction(T::ENTITY_TYPE, format!("build key range: {e:?}"), None)
            })?)
            .map_err(|e| Error::transaction(T::ENTITY_TYPE, format!("stage delete {uuid}: {e:?}"), None))?;
        Ok(true)
    }
}
