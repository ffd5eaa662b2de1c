//! Native storage configuration.

use std::path::PathBuf;

/// Configuration for the sled-backed native backend.
#[derive(Debug, Clone)]
pub struct NativeConfig {
    /// Directory the database lives in.
    pub path: PathBuf,
    /// Page cache capacity in bytes.
    pub cache_capacity: u64,
    /// Flush interval. `None` flushes on every write.
    pub flush_every_ms: Option<u64>,
    /// Enable zstd compression.
    pub compression: bool,
    /// Open a temporary database that's removed on drop (tests).
    pub temporary: bool,
    /// How many HNSW index mutations accumulate before an eager
    /// best-effort flush of the index's JSON blob to the `ann_index`
    /// tree (flush cadence, carried here for parity with
    /// the web backend even though the native backend's index is
    /// otherwise rebuildable on demand).
    pub hnsw_flush_every: u32,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./corestack_data"),
            cache_capacity: 1024 * 1024 * 1024,
            flush_every_ms: Some(1000),
            compression: true,
            temporary: false,
            hnsw_flush_every: 10,
        }
    }
}

impl NativeConfig {
    /// A configuration rooted at `path`, other fields defaulted.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// A temporary, tests-only configuration.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::new(),
            temporary: true,
            ..Default::default()
        }
    }

    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression);
        if let Some(ms) = self.flush_every_ms {
            config = config.flush_every_ms(Some(ms));
        }
        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }
        config
    }
}
