//! The per-entity-type orchestrator tying adapter, handlers, and an
//! optional transaction coordinator together.

use crate::adapter::{BackendAdapter, SemanticSearchAdapter};
use crate::entity::{assign_identity_defaults, BaseEntity};
use crate::error::Error;
use crate::handlers::LifecycleHandler;
use crate::transaction::TransactionCoordinator;

/// `save`/`delete` orchestration for one entity type `T` on one
/// backend adapter `A`.
///
/// Handlers run in the order they were registered, callers are
/// expected to register them in the canonical order from
/// (SemanticIndexable, Embeddable, Versionable, EdgeCascadeDelete) when
/// the entity type implements the corresponding capability.
pub struct Repository<T, A, C = crate::transaction::NoCoordinator<<A as BackendAdapter<T>>::Ctx>>
where
    T: BaseEntity,
    A: BackendAdapter<T>,
    C: TransactionCoordinator<Ctx = A::Ctx>,
{
    adapter: A,
    handlers: Vec<Box<dyn LifecycleHandler<T, A::Ctx>>>,
    coordinator: Option<C>,
    transaction_stores: Vec<&'static str>,
    /// When set, `save` enqueues background embedding work instead of
    /// invoking a synchronous Embeddable handler. Bypasses the
    /// Embeddable handler entirely when present.
    embedding_enqueue: Option<Box<dyn Fn(&T) -> Result<(), Error> + Send + Sync>>,
}

impl<T, A, C> Repository<T, A, C>
where
    T: BaseEntity,
    A: BackendAdapter<T>,
    C: TransactionCoordinator<Ctx = A::Ctx>,
{
    pub fn new(adapter: A, transaction_stores: Vec<&'static str>) -> Self {
        Self {
            adapter,
            handlers: Vec::new(),
            coordinator: None,
            transaction_stores,
            embedding_enqueue: None,
        }
    }

    pub fn with_coordinator(mut self, coordinator: C) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn with_handler(mut self, handler: Box<dyn LifecycleHandler<T, A::Ctx>>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_background_embedding(
        mut self,
        enqueue: impl Fn(&T) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.embedding_enqueue = Some(Box::new(enqueue));
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Upsert `entity`, running all registered handlers around the
    /// save, and return its assigned id.
    pub async fn save(&self, mut entity: T) -> Result<u64, Error> {
        // Handlers key chunk/version/embedding state off the uuid, so it
        // has to exist before any of them see the entity, not just by
        // the time the adapter itself writes the row.
        assign_identity_defaults(&mut entity, chrono::Utc::now());

        for handler in &self.handlers {
            handler.before_save(&mut entity).await?;
        }

        let saved = if let Some(coordinator) = &self.coordinator {
            let handlers = &self.handlers;
            let adapter = &self.adapter;
            coordinator.transaction(&self.transaction_stores, move |ctx| {
                let mut entity = entity;
                for handler in handlers {
                    handler.before_save_in_transaction(ctx, &mut entity)?;
                }
                let mut saved = adapter.save_in_tx(ctx, entity, T::TOUCH_ON_SAVE)?;
                for handler in handlers {
                    handler.after_save_in_transaction(ctx, &mut saved)?;
                }
                Ok(saved)
            })?
        } else {
            self.adapter.save(entity)?
        };

        if let Some(enqueue) = &self.embedding_enqueue {
            enqueue(&saved)?;
        }

        for handler in &self.handlers {
            handler.after_save(&saved).await;
        }

        Ok(saved.id())
    }

    /// Upsert every entity in `entities`, returning their assigned ids
    /// in order.
    pub async fn save_all(&self, entities: Vec<T>) -> Result<Vec<u64>, Error> {
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            ids.push(self.save(entity).await?);
        }
        Ok(ids)
    }

    pub fn find_by_id(&self, id: u64) -> Result<Option<T>, Error> {
        self.adapter.find_by_id(id)
    }

    pub fn find_by_uuid(&self, uuid: &str) -> Result<Option<T>, Error> {
        self.adapter.find_by_uuid(uuid)
    }

    pub fn get_by_id(&self, id: u64) -> Result<T, Error> {
        self.adapter.get_by_id(id)
    }

    pub fn get_by_uuid(&self, uuid: &str) -> Result<T, Error> {
        self.adapter.get_by_uuid(uuid)
    }

    pub fn find_all(&self) -> Result<Vec<T>, Error> {
        self.adapter.find_all()
    }

    pub fn find_unsynced(&self) -> Result<Vec<T>, Error> {
        self.adapter.find_unsynced()
    }

    /// Delete by uuid, running all registered handlers around the
    /// delete. Returns `false` if no such entity exists, without
    /// invoking any handler.
    pub async fn delete_by_uuid(&self, uuid: &str) -> Result<bool, Error> {
        let entity = match self.adapter.find_by_uuid(uuid)? {
            None => return Ok(false),
            Some(e) => e,
        };

        for handler in &self.handlers {
            handler.before_delete(&entity).await?;
        }

        if let Some(coordinator) = &self.coordinator {
            let handlers = &self.handlers;
            let adapter = &self.adapter;
            let uuid_owned = uuid.to_string();
            coordinator.transaction(&self.transaction_stores, move |ctx| {
                for handler in handlers {
                    handler.before_delete_in_transaction(ctx, &entity)?;
                }
                adapter.delete_by_uuid_in_tx(ctx, &uuid_owned)?;
                Ok(())
            })?;
        } else {
            self.adapter.delete_by_uuid(uuid)?;
        }

        Ok(true)
    }

    pub fn delete(&self, id: u64) -> Result<bool, Error> {
        self.adapter.delete(id)
    }
}

impl<T, A, C> Repository<T, A, C>
where
    T: BaseEntity,
    A: SemanticSearchAdapter<T>,
    C: TransactionCoordinator<Ctx = A::Ctx>,
{
    /// Delegate to the adapter's vector search. Returns `[]` rather
    /// than erroring when the adapter doesn't support vectors, see
    /// [`SemanticSearchAdapter`] for the concrete adapters that do.
    pub fn semantic_search(&self, query: &[f32], k: usize, min_similarity: f32) -> Result<Vec<T>, Error> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.adapter.semantic_search(query, k, min_similarity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::SyncStatus;
    use std::sync::Mutex;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct Widget {
        id: u64,
        uuid: String,
        name: String,
        created_at: chrono::DateTime<chrono::Utc>,
        updated_at: chrono::DateTime<chrono::Utc>,
    }

    impl BaseEntity for Widget {
        const ENTITY_TYPE: &'static str = "Widget";
        fn id(&self) -> u64 {
            self.id
        }
        fn set_id(&mut self, id: u64) {
            self.id = id;
        }
        fn uuid(&self) -> &str {
            &self.uuid
        }
        fn set_uuid(&mut self, uuid: String) {
            self.uuid = uuid;
        }
        fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
            self.created_at
        }
        fn set_created_at(&mut self, at: chrono::DateTime<chrono::Utc>) {
            self.created_at = at;
        }
        fn updated_at(&self) -> chrono::DateTime<chrono::Utc> {
            self.updated_at
        }
        fn set_updated_at(&mut self, at: chrono::DateTime<chrono::Utc>) {
            self.updated_at = at;
        }
        fn sync_correlation_id(&self) -> Option<&str> {
            None
        }
        fn sync_status(&self) -> SyncStatus {
            SyncStatus::Local
        }
        fn set_sync_status(&mut self, _status: SyncStatus) {}
        fn to_json(&self) -> serde_json::Result<serde_json::Value> {
            serde_json::to_value(self)
        }
        fn from_json(value: &serde_json::Value) -> serde_json::Result<Self> {
            serde_json::from_value(value.clone())
        }
    }

    // `TransactionContext for ()` is implemented once, in
    // `embedding`'s test module, and shared crate-wide across test
    // binaries.

    struct InMemoryAdapter {
        rows: Mutex<Vec<Widget>>,
        next_id: Mutex<u64>,
    }

    impl InMemoryAdapter {
        fn new() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                next_id: Mutex::new(1),
            }
        }
    }

    impl BackendAdapter<Widget> for InMemoryAdapter {
        type Ctx = ();
        fn find_by_id(&self, id: u64) -> Result<Option<Widget>, Error> {
            Ok(self.rows.lock().unwrap().iter().find(|w| w.id == id).cloned())
        }
        fn find_by_uuid(&self, uuid: &str) -> Result<Option<Widget>, Error> {
            Ok(self.rows.lock().unwrap().iter().find(|w| w.uuid == uuid).cloned())
        }
        fn find_all(&self) -> Result<Vec<Widget>, Error> {
            Ok(self.rows.lock().unwrap().clone())
        }
        fn find_unsynced(&self) -> Result<Vec<Widget>, Error> {
            Ok(vec![])
        }
        fn count(&self) -> Result<u64, Error> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }
        fn save_with_touch(&self, mut entity: Widget, touch: bool) -> Result<Widget, Error> {
            let mut rows = self.rows.lock().unwrap();
            let mut next_id = self.next_id.lock().unwrap();
            if entity.id == 0 {
                entity.id = *next_id;
                *next_id += 1;
            }
            if entity.uuid.is_empty() {
                entity.uuid = uuid::Uuid::new_v4().to_string();
            }
            if touch {
                entity.updated_at = chrono::Utc::now();
            }
            if let Some(existing) = rows.iter_mut().find(|w| w.id == entity.id) {
                *existing = entity.clone();
            } else {
                rows.push(entity.clone());
            }
            Ok(entity)
        }
        fn delete(&self, id: u64) -> Result<bool, Error> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|w| w.id != id);
            Ok(rows.len() != before)
        }
        fn delete_by_uuid(&self, uuid: &str) -> Result<bool, Error> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|w| w.uuid != uuid);
            Ok(rows.len() != before)
        }
        fn save_in_tx(&self, _ctx: &mut (), entity: Widget, touch: bool) -> Result<Widget, Error> {
            self.save_with_touch(entity, touch)
        }
        fn find_by_id_in_tx(&self, _ctx: &mut (), id: u64) -> Result<Option<Widget>, Error> {
            self.find_by_id(id)
        }
        fn find_by_uuid_in_tx(&self, _ctx: &mut (), uuid: &str) -> Result<Option<Widget>, Error> {
            self.find_by_uuid(uuid)
        }
        fn find_all_in_tx(&self, _ctx: &mut ()) -> Result<Vec<Widget>, Error> {
            self.find_all()
        }
        fn delete_in_tx(&self, _ctx: &mut (), id: u64) -> Result<bool, Error> {
            self.delete(id)
        }
        fn delete_by_uuid_in_tx(&self, _ctx: &mut (), uuid: &str) -> Result<bool, Error> {
            self.delete_by_uuid(uuid)
        }
    }

    fn widget(name: &str) -> Widget {
        let now = chrono::Utc::now();
        Widget {
            id: 0,
            uuid: String::new(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_without_coordinator_assigns_id_and_uuid() {
        let repo: Repository<Widget, InMemoryAdapter> =
            Repository::new(InMemoryAdapter::new(), vec!["widgets"]);
        let id = repo.save(widget("gadget")).await.unwrap();
        assert_eq!(id, 1);
        let found = repo.find_by_id(1).unwrap().unwrap();
        assert_eq!(found.name, "gadget");
        assert!(!found.uuid.is_empty());
    }

    #[tokio::test]
    async fn delete_by_uuid_returns_false_when_absent() {
        let repo: Repository<Widget, InMemoryAdapter> =
            Repository::new(InMemoryAdapter::new(), vec!["widgets"]);
        assert!(!repo.delete_by_uuid("nope").await.unwrap());
    }

    #[tokio::test]
    async fn delete_by_uuid_removes_existing_row() {
        let repo: Repository<Widget, InMemoryAdapter> =
            Repository::new(InMemoryAdapter::new(), vec!["widgets"]);
        repo.save(widget("gadget")).await.unwrap();
        let saved = repo.find_by_id(1).unwrap().unwrap();
        assert!(repo.delete_by_uuid(&saved.uuid).await.unwrap());
        assert!(repo.find_by_id(1).unwrap().is_none());
    }
}
