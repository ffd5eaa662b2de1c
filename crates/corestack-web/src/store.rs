//! The opened IndexedDB database, per [`crate::config::WebConfig`] and
//! the [`crate::schema`] applied at version-upgrade time.

use idb::{DatabaseEvent, Factory};

use corestack_core::error::Error;

use crate::config::WebConfig;
use crate::schema::{self, EntitySchema};

pub struct WebStore {
    db: idb::Database,
}

impl WebStore {
    /// Open (creating and/or upgrading, as needed) the database named
    /// in `config`, declaring every entity type in `entities` at
    /// version 1. `entities` is `'static` because IndexedDB's upgrade
    /// callback must outlive the call that registers it.
    pub async fn open(config: &WebConfig, entities: &'static [EntitySchema]) -> Result<Self, Error> {
        let factory = Factory::new().map_err(|e| Error::persistence("WebStore", format!("open factory: {e:?}"), None))?;

        let mut open_request = factory
            .open(&config.db_name, Some(config.schema_version))
            .map_err(|e| Error::persistence("WebStore", format!("open request: {e:?}"), None))?;

        open_request.on_upgrade_needed(move |event| {
            let Ok(database) = event.database() else {
                tracing::error!("upgrade event carried no database handle");
                return;
            };
            if let Err(err) = schema::upgrade(&database, entities) {
                tracing::error!(%err, "schema upgrade failed");
            }
        });

        let db = open_request
            .await
            .map_err(|e| Error::persistence("WebStore", format!("open database: {e:?}"), None))?;

        Ok(Self { db })
    }

    pub fn db(&self) -> &idb::Database {
        &self.db
    }
}
