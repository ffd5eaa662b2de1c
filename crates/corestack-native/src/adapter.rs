//! `sled`-backed [`BackendAdapter`] plus an [`Embeddable`]-specific
//! wrapper that layers a [`HnswIndex`] on top for semantic search.
//!
//! Rows are keyed by uuid, a secondary tree maps integer id to uuid,
//! and a per-entity-type counter tree hands out fresh ids.

use std::sync::Arc;

use chrono::Utc;
use corestack_core::adapter::{BackendAdapter, SemanticSearchAdapter};
use corestack_core::ann::AnnIndex;
use corestack_core::capability::Embeddable;
use corestack_core::entity::{assign_identity_defaults, BaseEntity};
use corestack_core::error::Error;
use corestack_ann::HnswIndex;
use parking_lot::RwLock;

use crate::store::NativeStore;
use crate::transaction::NativeTxContext;

/// Plain CRUD over one entity type's rows/ids/counter trees.
pub struct SledAdapter<T: BaseEntity> {
    store: Arc<NativeStore>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: BaseEntity> SledAdapter<T> {
    pub fn new(store: Arc<NativeStore>) -> Self {
        Self {
            store,
            _marker: std::marker::PhantomData,
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, Error> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("decode row: {e}"), Some(Box::new(e))))?;
        T::from_json(&value).map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("decode row: {e}"), Some(Box::new(e))))
    }

    fn encode(&self, entity: &T) -> Result<Vec<u8>, Error> {
        let value = entity
            .to_json()
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("encode row: {e}"), Some(Box::new(e))))?;
        serde_json::to_vec(&value).map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("encode row: {e}"), Some(Box::new(e))))
    }

    fn id_key(id: u64) -> [u8; 8] {
        id.to_be_bytes()
    }

    fn prepare_for_save(&self, mut entity: T, touch: bool) -> Result<T, Error> {
        let now = Utc::now();
        assign_identity_defaults(&mut entity, now);
        if entity.id() == 0 {
            entity.set_id(self.store.next_id(T::ENTITY_TYPE)?);
        }
        if touch {
            entity.set_updated_at(now);
        }
        Ok(entity)
    }
}

impl<T: BaseEntity> BackendAdapter<T> for SledAdapter<T> {
    type Ctx = NativeTxContext;

    fn find_by_id(&self, id: u64) -> Result<Option<T>, Error> {
        let ids = self.store.ids_tree(T::ENTITY_TYPE)?;
        let Some(uuid_bytes) = ids
            .get(Self::id_key(id))
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("lookup id {id}: {e}"), Some(Box::new(e))))?
        else {
            return Ok(None);
        };
        let uuid = String::from_utf8_lossy(&uuid_bytes).into_owned();
        self.find_by_uuid(&uuid)
    }

    fn find_by_uuid(&self, uuid: &str) -> Result<Option<T>, Error> {
        let rows = self.store.rows_tree(T::ENTITY_TYPE)?;
        let Some(bytes) = rows
            .get(uuid.as_bytes())
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("lookup uuid {uuid}: {e}"), Some(Box::new(e))))?
        else {
            return Ok(None);
        };
        Ok(Some(self.decode(&bytes)?))
    }

    fn find_all(&self) -> Result<Vec<T>, Error> {
        let rows = self.store.rows_tree(T::ENTITY_TYPE)?;
        rows.iter()
            .values()
            .map(|res| {
                let bytes = res.map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("scan: {e}"), Some(Box::new(e))))?;
                self.decode(&bytes)
            })
            .collect()
    }

    fn find_unsynced(&self) -> Result<Vec<T>, Error> {
        Ok(self
            .find_all()?
            .into_iter()
            .filter(|e| e.sync_status() == corestack_core::entity::SyncStatus::Local)
            .collect())
    }

    fn count(&self) -> Result<u64, Error> {
        let rows = self.store.rows_tree(T::ENTITY_TYPE)?;
        Ok(rows.len() as u64)
    }

    fn save_with_touch(&self, entity: T, touch: bool) -> Result<T, Error> {
        let entity = self.prepare_for_save(entity, touch)?;
        let rows = self.store.rows_tree(T::ENTITY_TYPE)?;
        let ids = self.store.ids_tree(T::ENTITY_TYPE)?;
        let bytes = self.encode(&entity)?;
        rows.insert(entity.uuid().as_bytes(), bytes)
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("save: {e}"), Some(Box::new(e))))?;
        ids.insert(Self::id_key(entity.id()), entity.uuid().as_bytes())
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("save: {e}"), Some(Box::new(e))))?;
        Ok(entity)
    }

    fn delete(&self, id: u64) -> Result<bool, Error> {
        let Some(entity) = self.find_by_id(id)? else {
            return Ok(false);
        };
        self.delete_by_uuid(entity.uuid())
    }

    fn delete_by_uuid(&self, uuid: &str) -> Result<bool, Error> {
        let Some(entity) = self.find_by_uuid(uuid)? else {
            return Ok(false);
        };
        let rows = self.store.rows_tree(T::ENTITY_TYPE)?;
        let ids = self.store.ids_tree(T::ENTITY_TYPE)?;
        rows.remove(uuid.as_bytes())
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("delete: {e}"), Some(Box::new(e))))?;
        ids.remove(Self::id_key(entity.id()))
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("delete: {e}"), Some(Box::new(e))))?;
        Ok(true)
    }

    fn save_in_tx(&self, ctx: &mut Self::Ctx, entity: T, touch: bool) -> Result<T, Error> {
        let entity = self.prepare_for_save(entity, touch)?;
        let bytes = self.encode(&entity)?;
        ctx.stage_put(&NativeStore::rows_tree_name(T::ENTITY_TYPE), entity.uuid().as_bytes().to_vec(), bytes);
        ctx.stage_put(
            &NativeStore::ids_tree_name(T::ENTITY_TYPE),
            Self::id_key(entity.id()).to_vec(),
            entity.uuid().as_bytes().to_vec(),
        );
        Ok(entity)
    }

    fn find_by_id_in_tx(&self, ctx: &mut Self::Ctx, id: u64) -> Result<Option<T>, Error> {
        let ids_tree_name = NativeStore::ids_tree_name(T::ENTITY_TYPE);
        let uuid = match ctx.staged_value(&ids_tree_name, &Self::id_key(id)) {
            Some(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(None) => return Ok(None),
            None => {
                let ids = ctx.store().ids_tree(T::ENTITY_TYPE)?;
                match ids
                    .get(Self::id_key(id))
                    .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("lookup id {id}: {e}"), Some(Box::new(e))))?
                {
                    Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    None => return Ok(None),
                }
            }
        };
        self.find_by_uuid_in_tx(ctx, &uuid)
    }

    fn find_by_uuid_in_tx(&self, ctx: &mut Self::Ctx, uuid: &str) -> Result<Option<T>, Error> {
        let rows_tree_name = NativeStore::rows_tree_name(T::ENTITY_TYPE);
        match ctx.staged_value(&rows_tree_name, uuid.as_bytes()) {
            Some(Some(bytes)) => Ok(Some(self.decode(&bytes)?)),
            Some(None) => Ok(None),
            None => {
                let rows = ctx.store().rows_tree(T::ENTITY_TYPE)?;
                match rows
                    .get(uuid.as_bytes())
                    .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("lookup uuid {uuid}: {e}"), Some(Box::new(e))))?
                {
                    Some(bytes) => Ok(Some(self.decode(&bytes)?)),
                    None => Ok(None),
                }
            }
        }
    }

    fn find_all_in_tx(&self, ctx: &mut Self::Ctx) -> Result<Vec<T>, Error> {
        // Staged writes are folded onto the last-committed scan so a
        // save-then-scan within the same transaction observes itself.
        let mut by_uuid: std::collections::BTreeMap<String, T> = self
            .find_all()?
            .into_iter()
            .map(|e| (e.uuid().to_string(), e))
            .collect();
        let rows_tree_name = NativeStore::rows_tree_name(T::ENTITY_TYPE);
        for entity in self.find_all()? {
            match ctx.staged_value(&rows_tree_name, entity.uuid().as_bytes()) {
                Some(Some(bytes)) => {
                    by_uuid.insert(entity.uuid().to_string(), self.decode(&bytes)?);
                }
                Some(None) => {
                    by_uuid.remove(entity.uuid());
                }
                None => {}
            }
        }
        Ok(by_uuid.into_values().collect())
    }

    fn delete_in_tx(&self, ctx: &mut Self::Ctx, id: u64) -> Result<bool, Error> {
        let Some(entity) = self.find_by_id_in_tx(ctx, id)? else {
            return Ok(false);
        };
        self.delete_by_uuid_in_tx(ctx, entity.uuid())
    }

    fn delete_by_uuid_in_tx(&self, ctx: &mut Self::Ctx, uuid: &str) -> Result<bool, Error> {
        let Some(entity) = self.find_by_uuid_in_tx(ctx, uuid)? else {
            return Ok(false);
        };
        ctx.stage_delete(&NativeStore::rows_tree_name(T::ENTITY_TYPE), uuid.as_bytes().to_vec());
        ctx.stage_delete(&NativeStore::ids_tree_name(T::ENTITY_TYPE), Self::id_key(entity.id()).to_vec());
        Ok(true)
    }
}

/// A [`SledAdapter`] plus an in-memory [`HnswIndex`] kept current on
/// every save/delete, for [`Embeddable`] entity types. The index is
/// not persisted separately, [`SemanticSledAdapter::rebuild_index`]
/// reconstructs it from stored rows on startup, matching the native
/// backend's "built-in ANN facility".
pub struct SemanticSledAdapter<T: Embeddable> {
    inner: SledAdapter<T>,
    index: Arc<RwLock<HnswIndex>>,
}

impl<T: Embeddable> SemanticSledAdapter<T> {
    pub fn new(store: Arc<NativeStore>) -> Self {
        Self {
            inner: SledAdapter::new(store),
            index: Arc::new(RwLock::new(HnswIndex::new())),
        }
    }

    fn reindex(&self, entity: &T) -> Result<(), Error> {
        if let Some(embedding) = entity.embedding() {
            self.index.write().add(entity.uuid(), embedding)
        } else {
            self.index.write().remove(entity.uuid())
        }
    }
}

impl<T: Embeddable> BackendAdapter<T> for SemanticSledAdapter<T> {
    type Ctx = NativeTxContext;

    fn find_by_id(&self, id: u64) -> Result<Option<T>, Error> {
        self.inner.find_by_id(id)
    }
    fn find_by_uuid(&self, uuid: &str) -> Result<Option<T>, Error> {
        self.inner.find_by_uuid(uuid)
    }
    fn find_all(&self) -> Result<Vec<T>, Error> {
        self.inner.find_all()
    }
    fn find_unsynced(&self) -> Result<Vec<T>, Error> {
        self.inner.find_unsynced()
    }
    fn count(&self) -> Result<u64, Error> {
        self.inner.count()
    }
    fn save_with_touch(&self, entity: T, touch: bool) -> Result<T, Error> {
        let saved = self.inner.save_with_touch(entity, touch)?;
        self.reindex(&saved)?;
        Ok(saved)
    }
    fn delete(&self, id: u64) -> Result<bool, Error> {
        if let Some(entity) = self.inner.find_by_id(id)? {
            self.index.write().remove(entity.uuid())?;
        }
        self.inner.delete(id)
    }
    fn delete_by_uuid(&self, uuid: &str) -> Result<bool, Error> {
        self.index.write().remove(uuid)?;
        self.inner.delete_by_uuid(uuid)
    }
    fn save_in_tx(&self, ctx: &mut Self::Ctx, entity: T, touch: bool) -> Result<T, Error> {
        let saved = self.inner.save_in_tx(ctx, entity, touch)?;
        self.reindex(&saved)?;
        Ok(saved)
    }
    fn find_by_id_in_tx(&self, ctx: &mut Self::Ctx, id: u64) -> Result<Option<T>, Error> {
        self.inner.find_by_id_in_tx(ctx, id)
    }
    fn find_by_uuid_in_tx(&self, ctx: &mut Self::Ctx, uuid: &str) -> Result<Option<T>, Error> {
        self.inner.find_by_uuid_in_tx(ctx, uuid)
    }
    fn find_all_in_tx(&self, ctx: &mut Self::Ctx) -> Result<Vec<T>, Error> {
        self.inner.find_all_in_tx(ctx)
    }
    fn delete_in_tx(&self, ctx: &mut Self::Ctx, id: u64) -> Result<bool, Error> {
        if let Some(entity) = self.inner.find_by_id_in_tx(ctx, id)? {
            self.index.write().remove(entity.uuid())?;
        }
        self.inner.delete_in_tx(ctx, id)
    }
    fn delete_by_uuid_in_tx(&self, ctx: &mut Self::Ctx, uuid: &str) -> Result<bool, Error> {
        self.index.write().remove(uuid)?;
        self.inner.delete_by_uuid_in_tx(ctx, uuid)
    }
}

impl<T: Embeddable> SemanticSearchAdapter<T> for SemanticSledAdapter<T> {
    fn semantic_search(&self, query: &[f32], k: usize, min_similarity: f32) -> Result<Vec<T>, Error> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let hits = self.index.read().search(query, k, min_similarity)?;
        hits.into_iter()
            .filter_map(|(uuid, _similarity)| self.inner.find_by_uuid(&uuid).transpose())
            .collect()
    }

    fn index_size(&self) -> Result<usize, Error> {
        Ok(self.index.read().len())
    }

    fn rebuild_index(&self, generate_embedding: &dyn Fn(&T) -> Option<Vec<f32>>) -> Result<(), Error> {
        let fresh = HnswIndex::new();
        for entity in self.inner.find_all()? {
            let embedding = entity.embedding().map(|e| e.to_vec()).or_else(|| generate_embedding(&entity));
            if let Some(embedding) = embedding {
                fresh.add(entity.uuid(), &embedding)?;
            }
        }
        *self.index.write() = fresh;
        Ok(())
    }
}
