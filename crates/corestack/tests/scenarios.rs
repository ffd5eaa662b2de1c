//! End-to-end scenarios S1-S5, run against the native
//! (`sled`) backend so the whole stack (repository, lifecycle
//! handlers, version/embedding/chunk stores, and a real transaction
//! coordinator) is exercised together. S6 (Backend B sync-lookup
//! rejection) lives in `corestack-web`'s own test suite, since it's
//! specific to that backend.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use corestack::adapter::BackendAdapter;
use corestack::ann::{AnnIndex, ChunkRegistry};
use corestack::capability::{ChunkPreset, Embeddable, Edgeable, SemanticIndexable, Versionable};
use corestack::embedding::{EmbeddingQueue, EmbeddingService};
use corestack::entity::{BaseEntity, SyncStatus};
use corestack::error::Error;
use corestack::handlers::{
    EdgeCascadeDeleteHandler, EmbeddableHandler, LifecycleHandler, SemanticIndexableHandler, VersionableHandler,
};
use corestack::repository::Repository;
use corestack::transaction::TransactionCoordinator;
use corestack::version::{self, EntityVersion, VersionStore};
use corestack_ann::HnswIndex;
use corestack_native::{NativeConfig, NativeStore, NativeTransactionCoordinator, SledAdapter, SledVersionStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Article {
    id: u64,
    uuid: String,
    title: String,
    body: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sync_correlation_id: Option<String>,
    sync_status: SyncStatus,
}

impl Article {
    fn new(title: &str, body: &str) -> Self {
        let now = DateTime::<Utc>::default();
        Self {
            id: 0,
            uuid: String::new(),
            title: title.to_string(),
            body: body.to_string(),
            created_at: now,
            updated_at: now,
            sync_correlation_id: None,
            sync_status: SyncStatus::Local,
        }
    }
}

impl BaseEntity for Article {
    const ENTITY_TYPE: &'static str = "Article";
    const TOUCH_ON_SAVE: bool = true;

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
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = at;
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    fn sync_correlation_id(&self) -> Option<&str> {
        self.sync_correlation_id.as_deref()
    }
    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }
    fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }
    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
    fn from_json(value: &Value) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }
}

impl Versionable for Article {}
impl Edgeable for Article {}

impl SemanticIndexable for Article {
    fn to_chunkable_input(&self) -> String {
        self.body.clone()
    }
    fn chunk_preset(&self) -> ChunkPreset {
        ChunkPreset::Parent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Memo {
    id: u64,
    uuid: String,
    text: String,
    embedding: Option<Vec<f32>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sync_correlation_id: Option<String>,
    sync_status: SyncStatus,
}

impl Memo {
    fn new(text: &str) -> Self {
        let now = DateTime::<Utc>::default();
        Self {
            id: 0,
            uuid: String::new(),
            text: text.to_string(),
            embedding: None,
            created_at: now,
            updated_at: now,
            sync_correlation_id: None,
            sync_status: SyncStatus::Local,
        }
    }
}

impl BaseEntity for Memo {
    const ENTITY_TYPE: &'static str = "Memo";

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
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = at;
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    fn sync_correlation_id(&self) -> Option<&str> {
        self.sync_correlation_id.as_deref()
    }
    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }
    fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }
    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
    fn from_json(value: &Value) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }
}

impl Embeddable for Memo {
    const EMBEDDING_DIM: usize = 3;
    fn to_embedding_input(&self) -> String {
        self.text.clone()
    }
    fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }
    fn set_embedding(&mut self, embedding: Option<Vec<f32>>) {
        self.embedding = embedding;
    }
}

struct StubEmbedder;

impl EmbeddingService for StubEmbedder {
    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if text.trim().is_empty() {
            return None;
        }
        Some(vec![text.len() as f32, text.chars().filter(|c| *c == ' ').count() as f32, 1.0])
    }
}

fn open_store() -> Arc<NativeStore> {
    Arc::new(NativeStore::open(&NativeConfig::temporary()).expect("open temporary sled db"))
}

fn article_repo(
    store: Arc<NativeStore>,
) -> Repository<Article, SledAdapter<Article>, NativeTransactionCoordinator> {
    let adapter = SledAdapter::<Article>::new(store.clone());
    let coordinator = NativeTransactionCoordinator::new(store.clone());
    Repository::new(adapter, vec!["Article:rows", "Article:ids", "_versions"]).with_coordinator(coordinator)
}

/// S1. Versioned save + reconstruction.
#[tokio::test]
async fn s1_versioned_save_and_reconstruction() {
    let store = open_store();
    let version_store = SledVersionStore::new(store.clone());
    let handler = VersionableHandler::new(&version_store);

    let repo = article_repo(store).with_handler(Box::new(handler));

    let a = Article::new("A", "1");
    let uuid = {
        let id = repo.save(a).await.unwrap();
        repo.find_by_id(id).unwrap().unwrap().uuid
    };

    let mut a2 = repo.find_by_uuid(&uuid).unwrap().unwrap();
    a2.body = "2".to_string();
    repo.save(a2).await.unwrap();

    let mut a3 = repo.find_by_uuid(&uuid).unwrap().unwrap();
    a3.title = "B".to_string();
    repo.save(a3).await.unwrap();

    assert_eq!(version_store.latest_version_number("Article", &uuid).unwrap(), 3);
    let versions = version_store.versions_for("Article", &uuid).unwrap();
    assert_eq!(versions.len(), 3);
    assert!(versions[0].snapshot.is_some());
    assert!(versions[1].delta.is_some());
    assert!(versions[2].delta.is_some());

    let state_at_2 = version::state_at(&version_store, "Article", &uuid, 2).unwrap().unwrap();
    assert_eq!(state_at_2["title"], "A");
    assert_eq!(state_at_2["body"], "2");
}

/// A `VersionStore` wrapper that fails `append_in_tx` for a specific
/// `version_number`, letting S2 inject a mid-save failure.
struct FailingAtVersion<'a, VS: VersionStore> {
    inner: &'a VS,
    fail_at: u64,
}

impl<'a, VS: VersionStore> VersionStore for FailingAtVersion<'a, VS> {
    type Ctx = VS::Ctx;

    fn versions_for(&self, entity_type: &str, entity_uuid: &str) -> Result<Vec<EntityVersion>, Error> {
        self.inner.versions_for(entity_type, entity_uuid)
    }
    fn latest_version_number(&self, entity_type: &str, entity_uuid: &str) -> Result<u64, Error> {
        self.inner.latest_version_number(entity_type, entity_uuid)
    }
    fn append_in_tx(&self, ctx: &mut VS::Ctx, version: EntityVersion) -> Result<EntityVersion, Error> {
        if version.version_number == self.fail_at {
            return Err(Error::transaction("Article", "injected version-store failure", None));
        }
        self.inner.append_in_tx(ctx, version)
    }
}

/// S2. Rollback on transactional failure.
#[tokio::test]
async fn s2_rollback_on_transactional_failure() {
    let store = open_store();
    let version_store = SledVersionStore::new(store.clone());
    let failing = FailingAtVersion { inner: &version_store, fail_at: 2 };
    let handler = VersionableHandler::new(&failing);

    let repo = article_repo(store).with_handler(Box::new(handler));

    let uuid = {
        let id = repo.save(Article::new("A", "1")).await.unwrap();
        repo.find_by_id(id).unwrap().unwrap().uuid
    };

    let mut a2 = repo.find_by_uuid(&uuid).unwrap().unwrap();
    a2.body = "2".to_string();
    let result = repo.save(a2).await;
    assert!(result.is_err());

    let current = repo.find_by_uuid(&uuid).unwrap().unwrap();
    assert_eq!(current.body, "1", "second save must not have landed");
    assert_eq!(version_store.latest_version_number("Article", &uuid).unwrap(), 1);
}

/// A handler whose `after_save_in_transaction` fails on its `fail_at`-th
/// call, letting S2b inject a failure downstream of the version row
/// already having been staged.
struct FailAfterSaveHandler {
    calls: std::sync::atomic::AtomicU32,
    fail_at: u32,
}

impl FailAfterSaveHandler {
    fn new(fail_at: u32) -> Self {
        Self {
            calls: std::sync::atomic::AtomicU32::new(0),
            fail_at,
        }
    }
}

impl<T: BaseEntity, Ctx: Send> LifecycleHandler<T, Ctx> for FailAfterSaveHandler {
    fn after_save_in_transaction(&self, _ctx: &mut Ctx, _entity: &mut T) -> Result<(), Error> {
        let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        if call == self.fail_at {
            return Err(Error::transaction(T::ENTITY_TYPE, "injected after-save failure", None));
        }
        Ok(())
    }
}

/// S2b. A failure in a handler downstream of `VersionableHandler`,
/// inside the same transaction, must not let the version row it
/// already staged survive the rollback. S2's injected append failure
/// can't exercise this: a failing `append_in_tx` never stages a row in
/// the first place, so the case of "version row staged, entity write
/// rolled back by something else" needs its own failure source.
#[tokio::test]
async fn s2b_version_row_does_not_outlive_a_later_rollback() {
    let store = open_store();
    let version_store = SledVersionStore::new(store.clone());
    let version_handler = VersionableHandler::new(&version_store);
    let failing_handler = FailAfterSaveHandler::new(2);

    let repo = article_repo(store)
        .with_handler(Box::new(version_handler))
        .with_handler(Box::new(failing_handler));

    let uuid = {
        let id = repo.save(Article::new("A", "1")).await.unwrap();
        repo.find_by_id(id).unwrap().unwrap().uuid
    };
    assert_eq!(version_store.latest_version_number("Article", &uuid).unwrap(), 1);

    let mut a2 = repo.find_by_uuid(&uuid).unwrap().unwrap();
    a2.body = "2".to_string();
    let result = repo.save(a2).await;
    assert!(result.is_err(), "downstream handler failure must fail the save");

    let current = repo.find_by_uuid(&uuid).unwrap().unwrap();
    assert_eq!(current.body, "1", "entity write must not have landed");
    assert_eq!(
        version_store.latest_version_number("Article", &uuid).unwrap(),
        1,
        "version row staged before the row write must not outlive a later rollback"
    );
}

/// S3. Cascade delete.
#[tokio::test]
async fn s3_cascade_delete_removes_incident_edges() {
    let store = open_store();
    let edge_adapter =
        corestack::edge::UniqueEdgeAdapter::new(SledAdapter::<corestack::edge::Edge>::new(store.clone()));

    let a_uuid = {
        let adapter = SledAdapter::<Article>::new(store.clone());
        adapter.save(Article::new("A", "body a")).unwrap().uuid
    };
    let b_uuid = {
        let adapter = SledAdapter::<Article>::new(store.clone());
        adapter.save(Article::new("B", "body b")).unwrap().uuid
    };

    edge_adapter.save(corestack::edge::Edge::new(&a_uuid, &b_uuid, "links_to")).unwrap();
    edge_adapter.save(corestack::edge::Edge::new(&b_uuid, &a_uuid, "references")).unwrap();

    let handler = EdgeCascadeDeleteHandler::new(&edge_adapter);
    let repo = article_repo(store).with_handler(Box::new(handler));

    assert!(repo.delete_by_uuid(&a_uuid).await.unwrap());
    assert!(repo.find_by_uuid(&a_uuid).unwrap().is_none());

    let remaining = edge_adapter.find_all().unwrap();
    assert!(remaining.iter().all(|e| e.source_uuid != a_uuid && e.target_uuid != a_uuid));
}

/// S3b. Duplicate edge composite keys: exactly one of two concurrent
/// attempts to save the same `(source_uuid, target_uuid, edge_type)`
/// survives, the other is rejected.
#[tokio::test]
async fn s3b_duplicate_edge_composite_key_is_rejected() {
    let store = open_store();
    let edge_adapter =
        corestack::edge::UniqueEdgeAdapter::new(SledAdapter::<corestack::edge::Edge>::new(store));

    edge_adapter.save(corestack::edge::Edge::new("a", "b", "links_to")).unwrap();
    let err = edge_adapter.save(corestack::edge::Edge::new("a", "b", "links_to")).unwrap_err();
    assert!(matches!(err, Error::DuplicateEntity { .. }));

    assert_eq!(edge_adapter.find_all().unwrap().len(), 1, "only the first edge should have been committed");
}

/// S4. Chunk eviction on update: re-saving with new, shorter text
/// fully replaces the registered chunk set and nothing from the first
/// generation remains queryable.
#[tokio::test]
async fn s4_chunk_eviction_on_update() {
    let store = open_store();
    let registry = corestack_native::SledChunkRegistry::new(store.clone());
    let index = HnswIndex::new();
    let embedder = StubEmbedder;

    let handler = SemanticIndexableHandler::new(&embedder, &index, &registry, None);
    let repo = article_repo(store).with_handler(Box::new(handler));

    let long_body: String = std::iter::repeat("The quick fox jumps over the lazy dog. ").take(40).collect();
    let uuid = {
        let id = repo.save(Article::new("A", &long_body)).await.unwrap();
        repo.find_by_id(id).unwrap().unwrap().uuid
    };

    let first_generation_count = index.len();
    assert!(first_generation_count > 0, "first save should have produced chunks");
    let first_generation_ids: Vec<String> = registry.get(&uuid).unwrap();
    assert_eq!(first_generation_ids.len(), first_generation_count);

    let mut a2 = repo.find_by_uuid(&uuid).unwrap().unwrap();
    a2.body = "Short update.".to_string();
    repo.save(a2).await.unwrap();

    let second_generation_ids = registry.get(&uuid).unwrap();
    assert_eq!(index.len(), second_generation_ids.len());
    for old_id in &first_generation_ids {
        assert!(!second_generation_ids.contains(old_id));
        assert!(index.search(&[1.0, 0.0, 1.0], 100, -1.0).unwrap().iter().all(|(id, _)| id != old_id));
    }
}

/// S5. Background embedding fill-in.
#[tokio::test]
async fn s5_background_embedding_fill_in() {
    let store = open_store();
    let adapter = SledAdapter::<Memo>::new(store.clone());
    let queue_store = corestack_native::SledEmbeddingQueueStore::new(store.clone());
    let queue = EmbeddingQueue::new(Box::new(queue_store), Box::new(StubEmbedder), SledAdapter::<Memo>::new(store));

    let queue_ref = &queue;
    let repo: Repository<Memo, SledAdapter<Memo>> = Repository::new(adapter, vec!["Memo:rows", "Memo:ids"])
        .with_background_embedding(move |entity: &Memo| queue_ref.enqueue(entity));

    let id = repo.save(Memo::new("remember the milk")).await.unwrap();
    let saved = repo.find_by_id(id).unwrap().unwrap();
    assert!(saved.embedding.is_none(), "embedding must not be filled in synchronously");
    let saved_updated_at = saved.updated_at;

    let processed = queue.flush().unwrap();
    assert_eq!(processed, 1);

    let after = repo.find_by_id(id).unwrap().unwrap();
    assert!(after.embedding.is_some());
    assert_eq!(after.updated_at, saved_updated_at, "background fill-in must not touch updatedAt");
}
