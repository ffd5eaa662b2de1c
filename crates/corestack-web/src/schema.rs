//! Version-1 IndexedDB schema: one object store per entity
//! type plus the reserved `_hnsw_index`, `_versions`,
//! `_embedding_tasks`, and `_chunk_registry` stores.

use idb::{Database, IndexParams, KeyPath, ObjectStoreParams};

use corestack_core::error::Error;

/// Describes one entity type's object store: its name and the indexes
/// beyond the mandatory `id`/`uuid`/`syncStatus` triple every store
/// carries.
pub struct EntitySchema {
    pub name: &'static str,
    /// Extra non-unique indexes, e.g. `["sourceUuid", "targetUuid", "edgeType"]` for edges.
    pub extra_indexes: &'static [&'static str],
}

impl EntitySchema {
    pub const fn new(name: &'static str) -> Self {
        Self { name, extra_indexes: &[] }
    }

    pub const fn with_indexes(name: &'static str, extra_indexes: &'static [&'static str]) -> Self {
        Self { name, extra_indexes }
    }
}

fn create_store(
    database: &Database,
    name: &str,
    key_path: &str,
    unique_indexes: &[&str],
    extra_indexes: &[&str],
) -> Result<(), Error> {
    let mut params = ObjectStoreParams::new();
    params.key_path(Some(KeyPath::new_single(key_path)));
    let store = database
        .create_object_store(name, params)
        .map_err(|e| Error::persistence(name, format!("create object store: {e:?}"), None))?;

    for index in unique_indexes {
        let mut index_params = IndexParams::new();
        index_params.unique(true);
        store
            .create_index(index, KeyPath::new_single(index), Some(index_params))
            .map_err(|e| Error::persistence(name, format!("create unique index {index}: {e:?}"), None))?;
    }
    for index in extra_indexes {
        store
            .create_index(index, KeyPath::new_single(index), None)
            .map_err(|e| Error::persistence(name, format!("create index {index}: {e:?}"), None))?;
    }
    Ok(())
}

/// Apply the version-1 schema to `database` during an `on_upgrade_needed`
/// callback. `entities` lists every entity type the application
/// registers; called once, at database creation or version bump.
pub fn upgrade(database: &Database, entities: &[EntitySchema]) -> Result<(), Error> {
    for entity in entities {
        create_store(database, entity.name, "uuid", &["id", "uuid"], entity.extra_indexes)?;
        // syncStatus is not unique but every entity store carries it.
        let store = database
            .object_store(entity.name)
            .map_err(|e| Error::persistence(entity.name, format!("reopen object store: {e:?}"), None))?;
        store
            .create_index("syncStatus", KeyPath::new_single("syncStatus"), None)
            .map_err(|e| Error::persistence(entity.name, format!("create syncStatus index: {e:?}"), None))?;
    }

    create_store(database, "_hnsw_index", "key", &["key"], &[])?;
    create_store(database, "_versions", "id", &[], &["entityUuid", "entityType"])?;
    create_store(database, "_embedding_tasks", "id", &[], &["status"])?;
    create_store(database, "_chunk_registry", "entityUuid", &["entityUuid"], &[])?;
    Ok(())
}
