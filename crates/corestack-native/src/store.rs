//! The opened sled database and tree-naming conventions shared by
//! every [`crate::adapter::SledAdapter`].

use corestack_core::error::Error;

/// An opened sled database.
pub struct NativeStore {
    db: sled::Db,
}

impl NativeStore {
    pub fn open(config: &crate::config::NativeConfig) -> Result<Self, Error> {
        let db = config
            .to_sled_config()
            .open()
            .map_err(|e| Error::persistence("NativeStore", format!("open sled database: {e}"), Some(Box::new(e))))?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Name of the tree holding `uuid -> entity JSON` for `entity_type`.
    pub fn rows_tree_name(entity_type: &str) -> String {
        format!("{entity_type}:rows")
    }

    /// Name of the tree holding `id (8 bytes big-endian) -> uuid` for `entity_type`.
    pub fn ids_tree_name(entity_type: &str) -> String {
        format!("{entity_type}:ids")
    }

    /// Name of the single-key tree holding `entity_type`'s next auto-increment id.
    pub fn counters_tree_name(entity_type: &str) -> String {
        format!("{entity_type}:counter")
    }

    /// The tree holding `uuid -> entity JSON` for `entity_type`.
    pub fn rows_tree(&self, entity_type: &str) -> Result<sled::Tree, Error> {
        self.open_tree(&Self::rows_tree_name(entity_type))
    }

    /// The tree holding `id (8 bytes big-endian) -> uuid` for `entity_type`.
    pub fn ids_tree(&self, entity_type: &str) -> Result<sled::Tree, Error> {
        self.open_tree(&Self::ids_tree_name(entity_type))
    }

    /// The single-key tree holding `entity_type`'s next auto-increment id.
    pub fn counters_tree(&self, entity_type: &str) -> Result<sled::Tree, Error> {
        self.open_tree(&Self::counters_tree_name(entity_type))
    }

    pub fn open_tree(&self, name: &str) -> Result<sled::Tree, Error> {
        self.db
            .open_tree(name)
            .map_err(|e| Error::persistence("NativeStore", format!("open tree {name}: {e}"), Some(Box::new(e))))
    }

    /// Atomically reserve and return the next id for `entity_type`.
    pub fn next_id(&self, entity_type: &str) -> Result<u64, Error> {
        let counters = self.counters_tree(entity_type)?;
        let next = counters
            .update_and_fetch(b"next", |old| {
                let current = old
                    .map(|bytes| u64::from_be_bytes(bytes.try_into().unwrap_or([0; 8])))
                    .unwrap_or(0);
                Some((current + 1).to_be_bytes().to_vec())
            })
            .map_err(|e| Error::persistence(entity_type, format!("reserve next id: {e}"), Some(Box::new(e))))?
            .expect("update_and_fetch always produces a value for this closure");
        Ok(u64::from_be_bytes(next.as_ref().try_into().unwrap()))
    }
}
