//! Per-entity-type CRUD plus transactional CRUD, on one backend.
//!
//! An adapter is the one place backend-native errors are translated
//! into the closed taxonomy of [`crate::error::Error`].

use crate::entity::BaseEntity;
use crate::error::Error;

/// An opaque handle to an open transaction, downcast by adapters to
/// their backend-specific type. Callers never inspect it.
pub trait TransactionContext: Send {}

/// Typed CRUD for one entity type `T` on one backend, plus the same
/// operations executed inside an open transaction.
///
/// `find*` never fails for "not found" (`Option::None`); `get*` fails
/// with [`Error::EntityNotFound`]. `save`/`delete` propagate
/// `DuplicateEntity`/`StorageLimitError`/`TransactionError`/`PersistenceError`
/// unchanged, adapters never catch these.
pub trait BackendAdapter<T: BaseEntity>: Send + Sync {
    /// The transaction context type this adapter's backend produces.
    type Ctx: TransactionContext;

    /// Look up by backend-local integer id. Never fails for "not found."
    fn find_by_id(&self, id: u64) -> Result<Option<T>, Error>;
    /// Look up by uuid. Never fails for "not found."
    fn find_by_uuid(&self, uuid: &str) -> Result<Option<T>, Error>;

    /// Look up by id, failing with [`Error::EntityNotFound`] when absent.
    fn get_by_id(&self, id: u64) -> Result<T, Error> {
        self.find_by_id(id)?
            .ok_or_else(|| Error::not_found(T::ENTITY_TYPE, id))
    }

    /// Look up by uuid, failing with [`Error::EntityNotFound`] when absent.
    fn get_by_uuid(&self, uuid: &str) -> Result<T, Error> {
        self.find_by_uuid(uuid)?
            .ok_or_else(|| Error::not_found(T::ENTITY_TYPE, uuid))
    }

    /// Full scan. Implementations may stream internally.
    fn find_all(&self) -> Result<Vec<T>, Error>;

    /// Rows whose `syncStatus == local`.
    fn find_unsynced(&self) -> Result<Vec<T>, Error>;

    /// Row count.
    fn count(&self) -> Result<u64, Error>;

    /// Upsert by uuid, assigning an id if `entity.id() == 0` and
    /// refreshing `updatedAt` according to `touch`. Returns the
    /// persisted entity (with id/uuid/timestamps filled in).
    fn save_with_touch(&self, entity: T, touch: bool) -> Result<T, Error>;

    /// Upsert, refreshing `updatedAt` iff `T::TOUCH_ON_SAVE`.
    fn save(&self, entity: T) -> Result<T, Error> {
        let touch = T::TOUCH_ON_SAVE;
        self.save_with_touch(entity, touch)
    }

    /// Batched `save`, atomic per backend conventions.
    fn save_all(&self, entities: Vec<T>) -> Result<Vec<T>, Error> {
        entities.into_iter().map(|e| self.save(e)).collect()
    }

    /// Remove by integer id. Does not cascade. Returns whether a row
    /// was removed.
    fn delete(&self, id: u64) -> Result<bool, Error>;
    /// Remove by uuid. Does not cascade.
    fn delete_by_uuid(&self, uuid: &str) -> Result<bool, Error>;

    /// Same semantics as [`BackendAdapter::save_with_touch`], executed
    /// inside `ctx`.
    fn save_in_tx(&self, ctx: &mut Self::Ctx, entity: T, touch: bool) -> Result<T, Error>;
    /// Batched transactional save.
    fn save_all_in_tx(&self, ctx: &mut Self::Ctx, entities: Vec<T>, touch: bool) -> Result<Vec<T>, Error> {
        entities
            .into_iter()
            .map(|e| self.save_in_tx(ctx, e, touch))
            .collect()
    }
    /// Transactional id lookup. Not supported on backends whose
    /// transactions cannot resolve a secondary integer-id index
    /// synchronously; such adapters return [`Error::QueryError`]
    /// immediately.
    fn find_by_id_in_tx(&self, ctx: &mut Self::Ctx, id: u64) -> Result<Option<T>, Error>;
    /// Transactional uuid lookup. Read-your-writes within `ctx`.
    fn find_by_uuid_in_tx(&self, ctx: &mut Self::Ctx, uuid: &str) -> Result<Option<T>, Error>;
    /// Transactional full scan.
    fn find_all_in_tx(&self, ctx: &mut Self::Ctx) -> Result<Vec<T>, Error>;
    /// Transactional delete by integer id.
    fn delete_in_tx(&self, ctx: &mut Self::Ctx, id: u64) -> Result<bool, Error>;
    /// Transactional delete by uuid.
    fn delete_by_uuid_in_tx(&self, ctx: &mut Self::Ctx, uuid: &str) -> Result<bool, Error>;
    /// Transactional batched delete by integer id.
    fn delete_all_in_tx(&self, ctx: &mut Self::Ctx, ids: &[u64]) -> Result<usize, Error> {
        let mut count = 0;
        for id in ids {
            if self.delete_in_tx(ctx, *id)? {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Extension implemented by adapters for [`crate::capability::Embeddable`]
/// entity types, backing [`crate::repository::Repository::semantic_search`].
pub trait SemanticSearchAdapter<T: BaseEntity>: BackendAdapter<T> {
    /// Entities ranked by descending cosine similarity to `query`,
    /// filtered to similarity `>= min_similarity`, capped at `k`.
    /// `k == 0` returns `[]`.
    fn semantic_search(&self, query: &[f32], k: usize, min_similarity: f32) -> Result<Vec<T>, Error>;

    /// Count of indexed entities.
    fn index_size(&self) -> Result<usize, Error>;

    /// Idempotent rebuild of the vector index from stored rows, using
    /// `generate_embedding` wherever a row's embedding is present.
    fn rebuild_index(
        &self,
        generate_embedding: &dyn Fn(&T) -> Option<Vec<f32>>,
    ) -> Result<(), Error>;
}
