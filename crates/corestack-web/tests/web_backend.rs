//! End-to-end scenarios against a real IndexedDB, run in a headless
//! browser via `wasm-bindgen-test` (no native fake: the crate's only
//! purpose is to talk to IndexedDB, so its tests talk to IndexedDB).
//!
//! Covers scenario S6 (sync lookup variants on Backend B fail fast
//! without touching the transaction) plus basic CRUD, transactional
//! staging, and HNSW blob persistence round trips.

use chrono::{DateTime, Utc};
use corestack_core::adapter::BackendAdapter;
use corestack_core::ann::AnnIndex;
use corestack_core::entity::{BaseEntity, SyncStatus};
use corestack_core::error::Error;
use corestack_core::transaction::TransactionCoordinator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use wasm_bindgen_test::*;

use corestack_web::{EntitySchema, WebConfig, WebStore, WebTransactionCoordinator};

wasm_bindgen_test_configure!(run_in_browser);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Note {
    id: u64,
    uuid: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sync_correlation_id: Option<String>,
    sync_status: SyncStatus,
}

impl Note {
    fn new(title: &str) -> Self {
        Self {
            id: 0,
            uuid: String::new(),
            title: title.to_string(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            sync_correlation_id: None,
            sync_status: SyncStatus::Local,
        }
    }
}

impl BaseEntity for Note {
    const ENTITY_TYPE: &'static str = "Note";

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

static NOTE_SCHEMA: [EntitySchema; 1] = [EntitySchema::new("Note")];

/// Each test opens its own database name so browser-persisted state
/// from one test can't leak into another.
async fn open_store(db_name: &str) -> Arc<WebStore> {
    let config = WebConfig::new(db_name);
    Arc::new(WebStore::open(&config, &NOTE_SCHEMA).await.expect("open indexeddb"))
}

#[wasm_bindgen_test]
async fn save_then_find_by_uuid_round_trips() {
    let store = open_store("corestack-test-crud").await;
    let adapter = corestack_web::IdbAdapter::<Note>::open(store).await.expect("open adapter");

    let saved = adapter.save(Note::new("groceries")).await.expect("save");
    assert_ne!(saved.uuid, "");
    assert_ne!(saved.id, 0);

    let found = adapter.find_by_uuid(&saved.uuid).await.expect("find").expect("present");
    assert_eq!(found.title, "groceries");

    let by_id = adapter.find_by_id(saved.id).await.expect("find by id").expect("present");
    assert_eq!(by_id.uuid, saved.uuid);
}

#[wasm_bindgen_test]
async fn delete_by_uuid_removes_the_row() {
    let store = open_store("corestack-test-delete").await;
    let adapter = corestack_web::IdbAdapter::<Note>::open(store).await.expect("open adapter");

    let saved = adapter.save(Note::new("temp")).await.expect("save");
    assert!(adapter.delete_by_uuid(&saved.uuid).await.expect("delete"));
    assert!(adapter.find_by_uuid(&saved.uuid).await.expect("find").is_none());
}

#[wasm_bindgen_test]
async fn transaction_commits_staged_save_and_delete() {
    let store = open_store("corestack-test-tx").await;
    let adapter = corestack_web::IdbAdapter::<Note>::open(store.clone()).await.expect("open adapter");
    let coordinator = WebTransactionCoordinator::new(store);

    let saved = coordinator
        .transaction(&[Note::ENTITY_TYPE], |ctx| adapter.save_in_tx(ctx, Note::new("staged"), true))
        .expect("commit save");
    assert!(adapter.find_by_uuid(&saved.uuid).await.expect("find").is_some());

    coordinator
        .transaction(&[Note::ENTITY_TYPE], |ctx| adapter.delete_by_uuid_in_tx(ctx, &saved.uuid))
        .expect("commit delete");
    assert!(adapter.find_by_uuid(&saved.uuid).await.expect("find").is_none());
}

/// Scenario S6: on Backend B, `find_by_id_in_tx` must fail
/// fast with a not-supported error, before touching the transaction,
/// rather than silently returning nothing or panicking.
#[wasm_bindgen_test]
async fn sync_lookup_in_tx_fails_fast_without_mutating_the_transaction() {
    let store = open_store("corestack-test-s6").await;
    let adapter = corestack_web::IdbAdapter::<Note>::open(store.clone()).await.expect("open adapter");
    let coordinator = WebTransactionCoordinator::new(store);

    let result = coordinator.transaction(&[Note::ENTITY_TYPE], |ctx| adapter.find_by_id_in_tx(ctx, 1));

    match result {
        Err(Error::QueryError { entity_type, .. }) => assert_eq!(entity_type, Note::ENTITY_TYPE),
        other => panic!("expected QueryError, got {other:?}"),
    }
}

/// Schema upgrade (`upgrade`) ran as part of every `open_store` call
/// above; a dedicated entity-less store confirms the reserved stores
/// come up even when the application registers no entity types yet.
#[wasm_bindgen_test]
async fn schema_upgrade_creates_reserved_stores_with_no_entities() {
    static EMPTY: [EntitySchema; 0] = [];
    let config = WebConfig::new("corestack-test-schema-empty");
    let store = WebStore::open(&config, &EMPTY).await.expect("open indexeddb");
    let registry = corestack_web::WebChunkRegistry::new(Arc::new(store));
    registry.set("e-1", vec!["c-1".to_string()]).await.expect("set");
    assert_eq!(registry.get("e-1").await.expect("get"), vec!["c-1"]);
}

#[wasm_bindgen_test]
async fn hnsw_blob_flushes_after_configured_mutation_count_and_reloads() {
    let store = open_store("corestack-test-hnsw").await;

    {
        let index = corestack_web::WebHnswIndex::open(store.clone(), "notes_index", 2)
            .await
            .expect("open hnsw index");
        index.add("n-1", &[1.0, 0.0, 0.0]).await.expect("add n-1");
        // second add crosses flush_every=2, forcing a blob write.
        index.add("n-2", &[0.0, 1.0, 0.0]).await.expect("add n-2");
    }

    let reloaded = corestack_web::WebHnswIndex::open(store, "notes_index", 2).await.expect("reopen hnsw index");
    let hits = reloaded.index().search(&[1.0, 0.0, 0.0], 1, 0.0).expect("search");
    assert_eq!(hits.first().map(|h| h.0.clone()), Some("n-1".to_string()));
}

/// The embedding queue is durable across a reopen of the same database.
#[wasm_bindgen_test]
async fn embedding_queue_enqueue_and_mark_completed_round_trip() {
    let store = open_store("corestack-test-embedding-queue").await;
    let queue = corestack_web::WebEmbeddingQueueStore::new(store);

    let task = corestack_core::embedding::EmbeddingTask::new("Note", "n-1", "hello world");
    let enqueued = queue.enqueue(task).await.expect("enqueue");
    assert_ne!(enqueued.id, 0);

    let pending = queue.next_pending(10).await.expect("next_pending");
    assert_eq!(pending.len(), 1);

    queue.mark_completed(enqueued.id).await.expect("mark completed");
    assert!(queue.next_pending(10).await.expect("next_pending after completion").is_empty());
}
