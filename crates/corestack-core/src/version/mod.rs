//! Delta-based version history for [`Versionable`](crate::capability::Versionable)
//! entities.
//!
//! An append-only log of [`EntityVersion`] rows, monotonically
//! sequenced per entity uuid instead of a single global sequence.

pub mod patch;

use serde_json::Value;

use crate::adapter::TransactionContext;
use crate::capability::{is_snapshot_version, Versionable};
use crate::entity::BaseEntity;
use crate::error::Error;
use patch::Patch;

/// One row in an entity's version history.
///
/// Exactly one of `snapshot`/`delta` is populated: `snapshot` at v1 and
/// every `snapshotFrequency`-th version after, `delta` otherwise.
/// `changed_fields` is the top-level keys that differ between the
/// previous and current state, independent of which of `snapshot`/
/// `delta` was recorded.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EntityVersion {
    pub id: u64,
    pub entity_type: String,
    pub entity_uuid: String,
    pub version_number: u64,
    pub changed_fields: Vec<String>,
    pub snapshot: Option<Value>,
    pub delta: Option<Patch>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Durable storage for version rows, independent of backend.
pub trait VersionStore: Send + Sync {
    /// The transaction context type this store's backend produces.
    type Ctx: TransactionContext;

    /// All versions for `entity_uuid`, ascending by `version_number`.
    fn versions_for(&self, entity_type: &str, entity_uuid: &str) -> Result<Vec<EntityVersion>, Error>;

    /// The highest `version_number` recorded for `entity_uuid`, or `0`
    /// if none.
    fn latest_version_number(&self, entity_type: &str, entity_uuid: &str) -> Result<u64, Error>;

    /// Append a new version row inside the entity save's own
    /// transaction, assigning it an id. The row must become visible iff
    /// the transaction commits: a version that outlives a rolled-back
    /// entity write (or vice versa) breaks the versioning guarantee.
    fn append_in_tx(&self, ctx: &mut Self::Ctx, version: EntityVersion) -> Result<EntityVersion, Error>;
}

/// Record a new version for `entity` transitioning from `previous_json`
/// (the entity's state before this save, or `None` on first save) to
/// its current state.
///
/// Always records a row, even when the computed delta is empty,
/// favoring a complete audit trail over a sparse one. Staged through
/// `ctx`, the same transaction the entity write itself goes through.
pub fn record_version<T, VS>(
    store: &VS,
    ctx: &mut VS::Ctx,
    entity: &T,
    previous_json: Option<Value>,
) -> Result<EntityVersion, Error>
where
    T: BaseEntity + Versionable,
    VS: VersionStore + ?Sized,
{
    let current_json = strip_non_roundtripped::<T>(
        entity
            .to_json()
            .map_err(|e| Error::persistence(T::ENTITY_TYPE, format!("serialize for versioning: {e}"), Some(Box::new(e))))?,
    );
    let next_number = store.latest_version_number(T::ENTITY_TYPE, entity.uuid())? + 1;
    let is_snapshot = is_snapshot_version(next_number, entity.snapshot_frequency());

    let previous = previous_json.unwrap_or(Value::Null);
    let changed_fields = top_level_keys_differing(&previous, &current_json);

    let (snapshot, delta) = if is_snapshot {
        (Some(current_json), None)
    } else {
        (None, Some(patch::diff(&previous, &current_json)))
    };

    store.append_in_tx(
        ctx,
        EntityVersion {
            id: 0,
            entity_type: T::ENTITY_TYPE.to_string(),
            entity_uuid: entity.uuid().to_string(),
            version_number: next_number,
            changed_fields,
            snapshot,
            delta,
            created_at: chrono::Utc::now(),
        },
    )
}

/// Top-level object keys whose value differs between `previous` and
/// `current`, including keys present in only one of the two. Sorted and
/// deduplicated for a stable, comparable result.
fn top_level_keys_differing(previous: &Value, current: &Value) -> Vec<String> {
    let empty = serde_json::Map::new();
    let prev_map = previous.as_object().unwrap_or(&empty);
    let curr_map = current.as_object().unwrap_or(&empty);

    let mut changed: Vec<String> = curr_map
        .iter()
        .filter(|(k, v)| prev_map.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .chain(prev_map.keys().filter(|k| !curr_map.contains_key(*k)).cloned())
        .collect();
    changed.sort();
    changed.dedup();
    changed
}

/// Reconstruct the entity's JSON state as of `version_number` by
/// replaying forward from the nearest prior snapshot.
///
/// Returns `Ok(None)` if `version_number` doesn't exist in the history.
pub fn state_at<VS: VersionStore + ?Sized>(
    store: &VS,
    entity_type: &str,
    entity_uuid: &str,
    version_number: u64,
) -> Result<Option<Value>, Error> {
    let versions = store.versions_for(entity_type, entity_uuid)?;
    let target_index = match versions.iter().position(|v| v.version_number == version_number) {
        Some(idx) => idx,
        None => return Ok(None),
    };

    let snapshot_index = versions[..=target_index]
        .iter()
        .rposition(|v| v.snapshot.is_some())
        .expect("version history invariant: v1 is always a snapshot");

    let mut state = versions[snapshot_index]
        .snapshot
        .clone()
        .expect("located by snapshot.is_some()");

    for version in &versions[snapshot_index + 1..=target_index] {
        if let Some(delta) = &version.delta {
            state = patch::apply(&state, delta)
                .map_err(|msg| Error::persistence(entity_type, format!("replay delta at v{}: {msg}", version.version_number), None))?;
        }
    }

    Ok(Some(state))
}

fn strip_non_roundtripped<T: BaseEntity>(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        for field in T::non_roundtripped_fields() {
            map.remove(*field);
        }
    }
    value
}
