//! Backend-agnostic entity persistence core: the repository pipeline,
//! capability traits, lifecycle handlers, version history, chunking,
//! and the transaction/adapter seams concrete backends implement.
//!
//! This crate never talks to a storage backend directly, see
//! `corestack-native` (sled) and `corestack-web` (IndexedDB).

pub mod adapter;
pub mod ann;
pub mod capability;
pub mod chunk;
pub mod chunking;
pub mod edge;
pub mod embedding;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod repository;
pub mod sync;
pub mod transaction;
pub mod version;

pub use adapter::{BackendAdapter, SemanticSearchAdapter, TransactionContext};
pub use ann::{AnnIndex, ChunkRegistry};
pub use capability::{ChunkPreset, Embeddable, Edgeable, SemanticIndexable, Versionable};
pub use chunk::Chunk;
pub use edge::{Edge, UniqueEdgeAdapter};
pub use embedding::{EmbeddingQueue, EmbeddingQueueStore, EmbeddingService, EmbeddingTask, TaskStatus};
pub use entity::{assign_identity_defaults, BaseEntity, SyncStatus};
pub use error::Error;
pub use handlers::{EdgeCascadeDeleteHandler, EmbeddableHandler, LifecycleHandler, SemanticIndexableHandler, VersionableHandler};
pub use repository::Repository;
pub use sync::RemoteSyncService;
pub use transaction::{NoCoordinator, TransactionCoordinator};
pub use version::{record_version, state_at, EntityVersion, VersionStore};
