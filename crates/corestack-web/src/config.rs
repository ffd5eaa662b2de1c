//! Web storage configuration.

/// Configuration for the IndexedDB-backed web backend.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Database name. A single fixed-name database per app, per spec.
    pub db_name: String,
    /// Schema version. Object stores are declared at upgrade time for
    /// this version; bump it and extend [`crate::schema::upgrade`]
    /// when the schema changes.
    pub schema_version: u32,
    /// HNSW blob re-serialization cadence: flush after this many
    /// `add`/`delete` mutations.
    pub hnsw_flush_every: u32,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            db_name: "everything_stack".to_string(),
            schema_version: 1,
            hnsw_flush_every: 10,
        }
    }
}

impl WebConfig {
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            ..Default::default()
        }
    }
}
