//! Directed typed links between [`Edgeable`](crate::capability::Edgeable) entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::BackendAdapter;
use crate::entity::{BaseEntity, SyncStatus};
use crate::error::Error;

/// A directed typed link with composite identity `(source_uuid, target_uuid, edge_type)`.
///
/// Uniqueness on that triple is enforced by a backend index where one
/// exists (native backend), or by a pre-insert lookup in the edge
/// adapter otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Backend-local integer id.
    pub id: u64,
    /// Globally unique identity of this edge row.
    pub uuid: String,
    /// Source entity uuid.
    pub source_uuid: String,
    /// Target entity uuid.
    pub target_uuid: String,
    /// Edge type tag, e.g. `"links_to"`.
    pub edge_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_correlation_id: Option<String>,
    pub sync_status: SyncStatus,
}

impl Edge {
    /// Create a new, unsaved edge between two entity uuids.
    pub fn new(
        source_uuid: impl Into<String>,
        target_uuid: impl Into<String>,
        edge_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            uuid: String::new(),
            source_uuid: source_uuid.into(),
            target_uuid: target_uuid.into(),
            edge_type: edge_type.into(),
            created_at: now,
            updated_at: now,
            sync_correlation_id: None,
            sync_status: SyncStatus::Local,
        }
    }

    /// The composite uniqueness key this edge occupies.
    pub fn composite_key(&self) -> (&str, &str, &str) {
        (&self.source_uuid, &self.target_uuid, &self.edge_type)
    }
}

impl BaseEntity for Edge {
    const ENTITY_TYPE: &'static str = "Edge";

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
    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
    fn from_json(value: &serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }
}

fn check_unique(existing: &[Edge], candidate: &Edge) -> Result<(), Error> {
    let key = candidate.composite_key();
    if existing.iter().any(|e| e.uuid != candidate.uuid && e.composite_key() == key) {
        return Err(Error::duplicate(
            Edge::ENTITY_TYPE,
            "source_uuid:target_uuid:edge_type",
            format!("{}:{}:{}", key.0, key.1, key.2),
        ));
    }
    Ok(())
}

/// Wraps any `BackendAdapter<Edge>` with a pre-insert composite-key
/// uniqueness check, for backends whose storage has no native way to
/// enforce it (every backend this crate ships against, today).
///
/// The check calls `find_all`/`find_all_in_tx` on `inner`, so it only
/// composes with an adapter that answers those synchronously. The
/// native backend's `SledAdapter` does; a future IndexedDB-backed edge
/// store would need to run the check itself ahead of its own async
/// save, the same way `WebVersionStore` sits outside the synchronous
/// `VersionStore` trait entirely rather than faking a sync scan.
pub struct UniqueEdgeAdapter<A> {
    inner: A,
}

impl<A> UniqueEdgeAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

impl<A: BackendAdapter<Edge>> BackendAdapter<Edge> for UniqueEdgeAdapter<A> {
    type Ctx = A::Ctx;

    fn find_by_id(&self, id: u64) -> Result<Option<Edge>, Error> {
        self.inner.find_by_id(id)
    }
    fn find_by_uuid(&self, uuid: &str) -> Result<Option<Edge>, Error> {
        self.inner.find_by_uuid(uuid)
    }
    fn find_all(&self) -> Result<Vec<Edge>, Error> {
        self.inner.find_all()
    }
    fn find_unsynced(&self) -> Result<Vec<Edge>, Error> {
        self.inner.find_unsynced()
    }
    fn count(&self) -> Result<u64, Error> {
        self.inner.count()
    }
    fn save_with_touch(&self, entity: Edge, touch: bool) -> Result<Edge, Error> {
        check_unique(&self.inner.find_all()?, &entity)?;
        self.inner.save_with_touch(entity, touch)
    }
    fn delete(&self, id: u64) -> Result<bool, Error> {
        self.inner.delete(id)
    }
    fn delete_by_uuid(&self, uuid: &str) -> Result<bool, Error> {
        self.inner.delete_by_uuid(uuid)
    }
    fn save_in_tx(&self, ctx: &mut Self::Ctx, entity: Edge, touch: bool) -> Result<Edge, Error> {
        check_unique(&self.inner.find_all_in_tx(ctx)?, &entity)?;
        self.inner.save_in_tx(ctx, entity, touch)
    }
    fn find_by_id_in_tx(&self, ctx: &mut Self::Ctx, id: u64) -> Result<Option<Edge>, Error> {
        self.inner.find_by_id_in_tx(ctx, id)
    }
    fn find_by_uuid_in_tx(&self, ctx: &mut Self::Ctx, uuid: &str) -> Result<Option<Edge>, Error> {
        self.inner.find_by_uuid_in_tx(ctx, uuid)
    }
    fn find_all_in_tx(&self, ctx: &mut Self::Ctx) -> Result<Vec<Edge>, Error> {
        self.inner.find_all_in_tx(ctx)
    }
    fn delete_in_tx(&self, ctx: &mut Self::Ctx, id: u64) -> Result<bool, Error> {
        self.inner.delete_in_tx(ctx, id)
    }
    fn delete_by_uuid_in_tx(&self, ctx: &mut Self::Ctx, uuid: &str) -> Result<bool, Error> {
        self.inner.delete_by_uuid_in_tx(ctx, uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn composite_key_reflects_source_target_type() {
        let edge = Edge::new("a", "b", "links_to");
        assert_eq!(edge.composite_key(), ("a", "b", "links_to"));
    }

    struct FakeEdgeAdapter {
        rows: Mutex<Vec<Edge>>,
        next_id: Mutex<u64>,
    }

    impl FakeEdgeAdapter {
        fn new() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                next_id: Mutex::new(1),
            }
        }
    }

    impl crate::adapter::TransactionContext for () {}

    impl BackendAdapter<Edge> for FakeEdgeAdapter {
        type Ctx = ();

        fn find_by_id(&self, id: u64) -> Result<Option<Edge>, Error> {
            Ok(self.rows.lock().unwrap().iter().find(|e| e.id == id).cloned())
        }
        fn find_by_uuid(&self, uuid: &str) -> Result<Option<Edge>, Error> {
            Ok(self.rows.lock().unwrap().iter().find(|e| e.uuid == uuid).cloned())
        }
        fn find_all(&self) -> Result<Vec<Edge>, Error> {
            Ok(self.rows.lock().unwrap().clone())
        }
        fn find_unsynced(&self) -> Result<Vec<Edge>, Error> {
            Ok(vec![])
        }
        fn count(&self) -> Result<u64, Error> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }
        fn save_with_touch(&self, mut entity: Edge, _touch: bool) -> Result<Edge, Error> {
            let mut rows = self.rows.lock().unwrap();
            if entity.uuid.is_empty() {
                entity.uuid = format!("edge-{}", rows.len() + 1);
            }
            if entity.id == 0 {
                let mut next_id = self.next_id.lock().unwrap();
                entity.id = *next_id;
                *next_id += 1;
            }
            if let Some(existing) = rows.iter_mut().find(|e| e.uuid == entity.uuid) {
                *existing = entity.clone();
            } else {
                rows.push(entity.clone());
            }
            Ok(entity)
        }
        fn delete(&self, id: u64) -> Result<bool, Error> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|e| e.id != id);
            Ok(rows.len() != before)
        }
        fn delete_by_uuid(&self, uuid: &str) -> Result<bool, Error> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|e| e.uuid != uuid);
            Ok(rows.len() != before)
        }
        fn save_in_tx(&self, _ctx: &mut (), entity: Edge, touch: bool) -> Result<Edge, Error> {
            self.save_with_touch(entity, touch)
        }
        fn find_by_id_in_tx(&self, _ctx: &mut (), id: u64) -> Result<Option<Edge>, Error> {
            self.find_by_id(id)
        }
        fn find_by_uuid_in_tx(&self, _ctx: &mut (), uuid: &str) -> Result<Option<Edge>, Error> {
            self.find_by_uuid(uuid)
        }
        fn find_all_in_tx(&self, _ctx: &mut ()) -> Result<Vec<Edge>, Error> {
            self.find_all()
        }
        fn delete_in_tx(&self, _ctx: &mut (), id: u64) -> Result<bool, Error> {
            self.delete(id)
        }
        fn delete_by_uuid_in_tx(&self, _ctx: &mut (), uuid: &str) -> Result<bool, Error> {
            self.delete_by_uuid(uuid)
        }
    }

    #[test]
    fn duplicate_composite_key_is_rejected() {
        let adapter = UniqueEdgeAdapter::new(FakeEdgeAdapter::new());
        adapter.save_with_touch(Edge::new("a", "b", "links_to"), true).unwrap();

        let err = adapter.save_with_touch(Edge::new("a", "b", "links_to"), true).unwrap_err();
        assert!(matches!(err, Error::DuplicateEntity { .. }));
    }

    #[test]
    fn distinct_edge_types_between_same_pair_are_allowed() {
        let adapter = UniqueEdgeAdapter::new(FakeEdgeAdapter::new());
        adapter.save_with_touch(Edge::new("a", "b", "links_to"), true).unwrap();
        let second = adapter.save_with_touch(Edge::new("a", "b", "references"), true).unwrap();
        assert_eq!(second.edge_type, "references");
    }

    #[test]
    fn updating_an_existing_edge_does_not_conflict_with_itself() {
        let adapter = UniqueEdgeAdapter::new(FakeEdgeAdapter::new());
        let saved = adapter.save_with_touch(Edge::new("a", "b", "links_to"), true).unwrap();
        let resaved = adapter.save_with_touch(saved, true).unwrap();
        assert_eq!(resaved.edge_type, "links_to");
    }
}
