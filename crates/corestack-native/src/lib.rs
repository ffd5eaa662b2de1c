//! sled-backed native storage backend:
//! synchronous same-thread transactions, a built-in in-memory HNSW
//! index per embeddable entity type, and durable stores for versions,
//! the embedding queue, and the chunk registry.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod adapter;
pub mod chunk_registry;
pub mod config;
pub mod embedding_queue_store;
pub mod store;
pub mod transaction;
pub mod version_store;

pub use adapter::{SemanticSledAdapter, SledAdapter};
pub use chunk_registry::SledChunkRegistry;
pub use config::NativeConfig;
pub use embedding_queue_store::SledEmbeddingQueueStore;
pub use store::NativeStore;
pub use transaction::{NativeTransactionCoordinator, NativeTxContext};
pub use version_store::SledVersionStore;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use corestack_core::adapter::BackendAdapter;
    use corestack_core::ann::ChunkRegistry;
    use corestack_core::entity::{BaseEntity, SyncStatus};
    use corestack_core::transaction::TransactionCoordinator;
    use corestack_core::version::VersionStore;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
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

    fn open_store() -> Arc<NativeStore> {
        Arc::new(NativeStore::open(&NativeConfig::temporary()).expect("open temporary sled db"))
    }

    #[test]
    fn save_then_find_by_uuid_round_trips() {
        let adapter = SledAdapter::<Note>::new(open_store());
        let saved = adapter.save(Note::new("groceries")).unwrap();
        assert_ne!(saved.uuid, "");
        assert_ne!(saved.id, 0);

        let found = adapter.find_by_uuid(&saved.uuid).unwrap().unwrap();
        assert_eq!(found.title, "groceries");
    }

    #[test]
    fn find_by_id_after_save_resolves_through_ids_tree() {
        let adapter = SledAdapter::<Note>::new(open_store());
        let saved = adapter.save(Note::new("call mom")).unwrap();
        let found = adapter.find_by_id(saved.id).unwrap().unwrap();
        assert_eq!(found.uuid, saved.uuid);
    }

    #[test]
    fn delete_by_uuid_removes_both_row_and_id_index() {
        let adapter = SledAdapter::<Note>::new(open_store());
        let saved = adapter.save(Note::new("temp")).unwrap();
        assert!(adapter.delete_by_uuid(&saved.uuid).unwrap());
        assert!(adapter.find_by_uuid(&saved.uuid).unwrap().is_none());
        assert!(adapter.find_by_id(saved.id).unwrap().is_none());
    }

    #[test]
    fn transaction_commits_staged_writes_atomically() {
        let store = open_store();
        let adapter = SledAdapter::<Note>::new(store.clone());
        let rows_tree = NativeStore::rows_tree_name(Note::ENTITY_TYPE);
        let ids_tree = NativeStore::ids_tree_name(Note::ENTITY_TYPE);
        let coordinator = NativeTransactionCoordinator::new(store);

        let saved = coordinator
            .transaction(&[&rows_tree, &ids_tree], |ctx| adapter.save_in_tx(ctx, Note::new("staged"), true))
            .unwrap();

        let found = adapter.find_by_uuid(&saved.uuid).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn transaction_failure_leaves_nothing_committed() {
        let store = open_store();
        let adapter = SledAdapter::<Note>::new(store.clone());
        let rows_tree = NativeStore::rows_tree_name(Note::ENTITY_TYPE);
        let ids_tree = NativeStore::ids_tree_name(Note::ENTITY_TYPE);
        let coordinator = NativeTransactionCoordinator::new(store);

        let result = coordinator.transaction(&[&rows_tree, &ids_tree], |ctx| {
            adapter.save_in_tx(ctx, Note::new("doomed"), true)?;
            Err(corestack_core::error::Error::transaction(Note::ENTITY_TYPE, "forced failure", None))
        });

        assert!(result.is_err());
        assert!(adapter.find_all().unwrap().is_empty());
    }

    #[test]
    fn version_store_round_trips_append_and_latest() {
        let db = open_store();
        let store = SledVersionStore::new(db.clone());
        let coordinator = NativeTransactionCoordinator::new(db);
        let version = corestack_core::version::EntityVersion {
            id: 0,
            entity_type: "Note".to_string(),
            entity_uuid: "n-1".to_string(),
            version_number: 1,
            changed_fields: vec!["title".to_string()],
            snapshot: Some(serde_json::json!({"title": "v1"})),
            delta: None,
            created_at: Utc::now(),
        };
        let saved = coordinator
            .transaction(&["_versions"], |ctx| store.append_in_tx(ctx, version))
            .unwrap();
        assert_ne!(saved.id, 0);
        assert_eq!(store.latest_version_number("Note", "n-1").unwrap(), 1);
        assert_eq!(store.versions_for("Note", "n-1").unwrap().len(), 1);
    }

    #[test]
    fn chunk_registry_set_get_clear_round_trip() {
        let registry = SledChunkRegistry::new(open_store());
        registry.set("n-1", vec!["c-1".to_string(), "c-2".to_string()]).unwrap();
        assert_eq!(registry.get("n-1").unwrap(), vec!["c-1", "c-2"]);
        assert_eq!(registry.clear("n-1").unwrap(), vec!["c-1", "c-2"]);
        assert!(registry.get("n-1").unwrap().is_empty());
    }
}
