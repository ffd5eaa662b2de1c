//! IndexedDB-backed web storage backend:
//! async CRUD against a versioned, fixed-name database, a software
//! HNSW index persisted as a blob, and durable stores for versions,
//! the embedding queue, and the chunk registry.
//!
//! Everything here targets `wasm32-unknown-unknown`; the crate is not
//! meant to be linked into native builds.

pub mod adapter;
pub mod ann_store;
pub mod chunk_registry;
pub mod config;
pub mod embedding_queue_store;
pub mod schema;
pub mod store;
pub mod transaction;
pub mod version_store;

pub use adapter::IdbAdapter;
pub use ann_store::WebHnswIndex;
pub use chunk_registry::WebChunkRegistry;
pub use config::WebConfig;
pub use embedding_queue_store::WebEmbeddingQueueStore;
pub use schema::{upgrade, EntitySchema};
pub use store::WebStore;
pub use transaction::{WebTransactionCoordinator, WebTxContext};
pub use version_store::WebVersionStore;
