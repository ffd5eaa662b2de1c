//! The base shape every persistable entity carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sync correlation state, mirrored back by [`RemoteSyncService`](crate::sync::RemoteSyncService)
/// collaborators outside this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// Created or modified locally, never pushed.
    Local,
    /// Acknowledged by the remote side.
    Synced,
    /// Queued for push but not yet acknowledged.
    PendingPush,
    /// Remote and local state diverged.
    Conflict,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Local
    }
}

/// Fields every persistable entity carries, independent of capability.
///
/// `id == 0` means "unassigned", the adapter assigns the next id on
/// first save. `uuid` is the stable cross-backend identity; if empty on
/// first save the adapter assigns a fresh one.
pub trait BaseEntity: Clone + Send + Sync + 'static {
    /// The entity type name used for error messages, store/tree naming,
    /// and version/chunk-registry tagging. Stable across the entity's
    /// lifetime, e.g. `"Note"`.
    const ENTITY_TYPE: &'static str;

    /// Whether `updatedAt` is refreshed on every mutating save. Version
    /// records and other immutable entities opt out by returning `false`.
    const TOUCH_ON_SAVE: bool = true;

    /// Backend-local integer id. `0` means unassigned.
    fn id(&self) -> u64;
    /// Assign the backend-local integer id.
    fn set_id(&mut self, id: u64);

    /// Globally unique identity string.
    fn uuid(&self) -> &str;
    /// Assign the uuid (only called when empty on first save).
    fn set_uuid(&mut self, uuid: String);

    /// Creation timestamp.
    fn created_at(&self) -> DateTime<Utc>;
    /// Assign the creation timestamp.
    fn set_created_at(&mut self, at: DateTime<Utc>);

    /// Last-mutated timestamp.
    fn updated_at(&self) -> DateTime<Utc>;
    /// Assign the last-mutated timestamp.
    fn set_updated_at(&mut self, at: DateTime<Utc>);

    /// Optional sync correlation id assigned by a remote sync collaborator.
    fn sync_correlation_id(&self) -> Option<&str>;

    /// Current sync status.
    fn sync_status(&self) -> SyncStatus;
    /// Assign the sync status.
    fn set_sync_status(&mut self, status: SyncStatus);

    /// The entity's canonical JSON form, used for version diffing,
    /// backend B storage, and optional remote sync. Fields that mirror
    /// derived, non-identity data (e.g. a DB-side index copy of a
    /// list-of-strings field) should be omitted here so diffing ignores
    /// them, see [`BaseEntity::non_roundtripped_fields`].
    fn to_json(&self) -> serde_json::Result<Value>;

    /// Reconstruct an entity from its canonical JSON form.
    fn from_json(value: &Value) -> serde_json::Result<Self>
    where
        Self: Sized;

    /// Top-level JSON field names that are derived mirrors, not part of
    /// identity, and must be excluded from version diffing. Empty by
    /// default.
    fn non_roundtripped_fields() -> &'static [&'static str] {
        &[]
    }
}

/// Assign defaults to a freshly-saved entity: a fresh uuid when empty,
/// `createdAt`/`updatedAt` when unset. Called by adapters, not by
/// application code directly.
pub fn assign_identity_defaults<T: BaseEntity>(entity: &mut T, now: DateTime<Utc>) {
    if entity.uuid().is_empty() {
        entity.set_uuid(uuid::Uuid::new_v4().to_string());
    }
    if entity.created_at() == DateTime::<Utc>::default() {
        entity.set_created_at(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_default_is_local() {
        assert_eq!(SyncStatus::default(), SyncStatus::Local);
    }
}
