//! Two-level semantic chunking: sentence segmentation, windowing,
//! breakpoint detection, and index orchestration.

pub mod breakpoints;
pub mod segmenter;
pub mod service;
pub mod window;

pub use service::{delete_by_entity_id, generate_chunks, index_entity, ChunkingConfig, GeneratedChunk};
