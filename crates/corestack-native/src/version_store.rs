//! sled-backed [`VersionStore`], one row per version keyed by a
//! lexicographically ordered `entity_type:entity_uuid:version_number`
//! composite, so `versions_for` is a single prefix scan.

use std::sync::Arc;

use corestack_core::error::Error;
use corestack_core::version::{EntityVersion, VersionStore};

use crate::store::NativeStore;
use crate::transaction::NativeTxContext;

const TREE: &str = "_versions";
const COUNTER: &str = "_versions";

fn row_key(entity_type: &str, entity_uuid: &str, version_number: u64) -> Vec<u8> {
    let mut key = format!("{entity_type}:{entity_uuid}:").into_bytes();
    key.extend_from_slice(&version_number.to_be_bytes());
    key
}

fn row_prefix(entity_type: &str, entity_uuid: &str) -> Vec<u8> {
    format!("{entity_type}:{entity_uuid}:").into_bytes()
}

pub struct SledVersionStore {
    store: Arc<NativeStore>,
}

impl SledVersionStore {
    pub fn new(store: Arc<NativeStore>) -> Self {
        Self { store }
    }
}

impl VersionStore for SledVersionStore {
    type Ctx = NativeTxContext;

    fn versions_for(&self, entity_type: &str, entity_uuid: &str) -> Result<Vec<EntityVersion>, Error> {
        let tree = self.store.open_tree(TREE)?;
        let prefix = row_prefix(entity_type, entity_uuid);
        let mut rows = tree
            .scan_prefix(&prefix)
            .values()
            .map(|res| {
                let bytes = res.map_err(|e| Error::persistence("EntityVersion", format!("scan: {e}"), Some(Box::new(e))))?;
                serde_json::from_slice::<EntityVersion>(&bytes)
                    .map_err(|e| Error::persistence("EntityVersion", format!("decode: {e}"), Some(Box::new(e))))
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort_by_key(|v| v.version_number);
        Ok(rows)
    }

    fn latest_version_number(&self, entity_type: &str, entity_uuid: &str) -> Result<u64, Error> {
        Ok(self
            .versions_for(entity_type, entity_uuid)?
            .iter()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0))
    }

    fn append_in_tx(&self, ctx: &mut NativeTxContext, mut version: EntityVersion) -> Result<EntityVersion, Error> {
        version.id = self.store.next_id(COUNTER)?;
        let key = row_key(&version.entity_type, &version.entity_uuid, version.version_number);
        let bytes = serde_json::to_vec(&version)
            .map_err(|e| Error::persistence("EntityVersion", format!("encode: {e}"), Some(Box::new(e))))?;
        ctx.stage_put(TREE, key, bytes);
        Ok(version)
    }
}
