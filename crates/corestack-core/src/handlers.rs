//! Lifecycle handlers the repository drives around backend CRUD.
//! Built-in handlers for each capability trait, run in the canonical
//! order: SemanticIndexable, Embeddable, Versionable, EdgeCascadeDelete.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::adapter::BackendAdapter;
use crate::ann::{AnnIndex, ChunkRegistry};
use crate::capability::{Embeddable, SemanticIndexable, Versionable};
use crate::chunk::Chunk;
use crate::edge::Edge;
use crate::embedding::EmbeddingService;
use crate::entity::BaseEntity;
use crate::error::Error;
use crate::version::{record_version, state_at, VersionStore};

/// One named slot in the repository's ordered handler chain, run
/// around `save`/`delete` for entity type `T` whose transaction
/// context type is `Ctx`.
///
/// All six hooks default to a no-op so a handler only overrides the
/// ones its capability needs. `beforeSave`/`afterSave`/`beforeDelete`
/// are async (permitted to suspend for external I/O); the
/// `*InTransaction` hooks are synchronous, matching the "no suspension
/// inside a transaction" rule.
#[async_trait]
pub trait LifecycleHandler<T: BaseEntity, Ctx>: Send + Sync {
    /// Outside any transaction, before the save is attempted. An `Err`
    /// aborts the save before anything is written.
    async fn before_save(&self, _entity: &mut T) -> Result<(), Error> {
        Ok(())
    }

    /// Inside the transaction, before the row write. An `Err` rolls
    /// the transaction back.
    fn before_save_in_transaction(&self, _ctx: &mut Ctx, _entity: &mut T) -> Result<(), Error> {
        Ok(())
    }

    /// Inside the transaction, after the row write.
    fn after_save_in_transaction(&self, _ctx: &mut Ctx, _entity: &mut T) -> Result<(), Error> {
        Ok(())
    }

    /// Outside the transaction, after commit. Best-effort: failures
    /// are logged by the repository and never fail the save.
    async fn after_save(&self, _entity: &T) {}

    /// Outside any transaction, before delete is attempted. An `Err`
    /// aborts the delete before the transaction opens.
    async fn before_delete(&self, _entity: &T) -> Result<(), Error> {
        Ok(())
    }

    /// Inside the transaction, before the row is removed.
    fn before_delete_in_transaction(&self, _ctx: &mut Ctx, _entity: &T) -> Result<(), Error> {
        Ok(())
    }
}

/// Runs the two-level chunking algorithm around save/delete for
/// [`SemanticIndexable`] entities.
///
/// Chunk ids generated in `before_save` are stashed per entity uuid
/// until `before_save_in_transaction` commits them to the registry;
/// this is the only state this handler carries between hooks.
pub struct SemanticIndexableHandler<'a> {
    embedder: &'a dyn EmbeddingService,
    index: &'a dyn AnnIndex,
    registry: &'a dyn ChunkRegistry,
    persist: Option<&'a (dyn Fn() -> Result<(), Error> + Send + Sync)>,
    staged: DashMap<String, Vec<Chunk>>,
    pending_delete: DashMap<String, Vec<String>>,
}

impl<'a> SemanticIndexableHandler<'a> {
    pub fn new(
        embedder: &'a dyn EmbeddingService,
        index: &'a dyn AnnIndex,
        registry: &'a dyn ChunkRegistry,
        persist: Option<&'a (dyn Fn() -> Result<(), Error> + Send + Sync)>,
    ) -> Self {
        Self {
            embedder,
            index,
            registry,
            persist,
            staged: DashMap::new(),
            pending_delete: DashMap::new(),
        }
    }
}

#[async_trait]
impl<'a, T, Ctx> LifecycleHandler<T, Ctx> for SemanticIndexableHandler<'a>
where
    T: BaseEntity + SemanticIndexable,
    Ctx: Send,
{
    async fn before_save(&self, entity: &mut T) -> Result<(), Error> {
        let uuid = entity.uuid().to_string();
        for old_id in self.registry.clear(&uuid)? {
            self.index.remove(&old_id)?;
        }
        let text = entity.to_chunkable_input();
        let new_chunks = crate::chunking::index_entity(&text, &uuid, T::ENTITY_TYPE, self.embedder, self.index)?;
        self.staged.insert(uuid, new_chunks);
        Ok(())
    }

    fn before_save_in_transaction(&self, _ctx: &mut Ctx, entity: &mut T) -> Result<(), Error> {
        let uuid = entity.uuid().to_string();
        if let Some((_, chunks)) = self.staged.remove(&uuid) {
            let ids = chunks.into_iter().map(|c| c.id).collect();
            self.registry.set(&uuid, ids)?;
        }
        Ok(())
    }

    async fn after_save(&self, _entity: &T) {
        if let Some(persist) = self.persist {
            if let Err(err) = persist() {
                tracing::warn!(error = %err, "best-effort HNSW blob persist failed");
            }
        }
    }

    async fn before_delete(&self, entity: &T) -> Result<(), Error> {
        let uuid = entity.uuid().to_string();
        let ids = self.registry.clear(&uuid)?;
        self.pending_delete.insert(uuid, ids);
        Ok(())
    }

    fn before_delete_in_transaction(&self, _ctx: &mut Ctx, entity: &T) -> Result<(), Error> {
        let uuid = entity.uuid().to_string();
        if let Some((_, ids)) = self.pending_delete.remove(&uuid) {
            for id in ids {
                self.index.remove(&id)?;
            }
        }
        Ok(())
    }
}

/// Attaches a synchronous embedding to [`Embeddable`] entities on save
///. Bypassed entirely when a background embedding
/// queue is configured.
pub struct EmbeddableHandler<'a> {
    embedder: &'a dyn EmbeddingService,
}

impl<'a> EmbeddableHandler<'a> {
    pub fn new(embedder: &'a dyn EmbeddingService) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl<'a, T, Ctx> LifecycleHandler<T, Ctx> for EmbeddableHandler<'a>
where
    T: BaseEntity + Embeddable,
    Ctx: Send,
{
    async fn before_save(&self, entity: &mut T) -> Result<(), Error> {
        let input = entity.to_embedding_input();
        if input.trim().is_empty() {
            entity.set_embedding(None);
        } else {
            entity.set_embedding(self.embedder.embed(&input));
        }
        Ok(())
    }
}

/// Records a version row inside the transaction for [`Versionable`]
/// entities.
///
/// Reconstructs the previous state itself via [`state_at`] on the
/// entity's latest recorded version, so callers never need to track
/// "what the entity looked like before this save."
pub struct VersionableHandler<'a, VS: VersionStore> {
    store: &'a VS,
}

impl<'a, VS: VersionStore> VersionableHandler<'a, VS> {
    pub fn new(store: &'a VS) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<'a, T, VS> LifecycleHandler<T, VS::Ctx> for VersionableHandler<'a, VS>
where
    T: BaseEntity + Versionable,
    VS: VersionStore,
{
    fn before_save_in_transaction(&self, ctx: &mut VS::Ctx, entity: &mut T) -> Result<(), Error> {
        let latest = self.store.latest_version_number(T::ENTITY_TYPE, entity.uuid())?;
        let previous = if latest > 0 {
            state_at(self.store, T::ENTITY_TYPE, entity.uuid(), latest)?
        } else {
            None
        };
        record_version(self.store, ctx, entity, previous)?;
        Ok(())
    }
}

/// Deletes edges incident to an [`Edgeable`](crate::capability::Edgeable)
/// entity as part of its own deletion.
///
/// `EA` is the edge adapter sharing the same transaction context type
/// as the entity adapter the repository is built around.
pub struct EdgeCascadeDeleteHandler<'a, EA> {
    edge_adapter: &'a EA,
    pending: DashMap<String, Vec<String>>,
}

impl<'a, EA> EdgeCascadeDeleteHandler<'a, EA> {
    pub fn new(edge_adapter: &'a EA) -> Self {
        Self {
            edge_adapter,
            pending: DashMap::new(),
        }
    }
}

#[async_trait]
impl<'a, T, Ctx, EA> LifecycleHandler<T, Ctx> for EdgeCascadeDeleteHandler<'a, EA>
where
    T: BaseEntity,
    Ctx: Send,
    EA: BackendAdapter<Edge, Ctx = Ctx> + Send + Sync,
{
    async fn before_delete(&self, entity: &T) -> Result<(), Error> {
        let uuid = entity.uuid().to_string();
        let incident: Vec<String> = self
            .edge_adapter
            .find_all()?
            .into_iter()
            .filter(|e| e.source_uuid == uuid || e.target_uuid == uuid)
            .map(|e| e.uuid)
            .collect();
        self.pending.insert(uuid, incident);
        Ok(())
    }

    fn before_delete_in_transaction(&self, ctx: &mut Ctx, entity: &T) -> Result<(), Error> {
        let uuid = entity.uuid().to_string();
        if let Some((_, edge_uuids)) = self.pending.remove(&uuid) {
            for edge_uuid in edge_uuids {
                self.edge_adapter.delete_by_uuid_in_tx(ctx, &edge_uuid)?;
            }
        }
        Ok(())
    }
}
