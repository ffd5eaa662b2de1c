//! Orthogonal capability markers an entity type may declare.
//!
//! These are implemented as separate traits rather than mixins: the
//! repository consults an ordered list of handlers and invokes those
//! whose capability the entity reports, which in Rust means "the
//! entity implements the corresponding trait."

use crate::entity::BaseEntity;

/// Has a fixed-dimension embedding vector field.
pub trait Embeddable: BaseEntity {
    /// Dimension of the embedding vector for this entity type, e.g. 384.
    const EMBEDDING_DIM: usize;

    /// Text fed to the embedding service. An empty or whitespace-only
    /// result means "no embedding, skip indexing this save."
    fn to_embedding_input(&self) -> String;

    /// Current embedding, if any.
    fn embedding(&self) -> Option<&[f32]>;
    /// Assign (or clear, with `None`) the embedding.
    fn set_embedding(&mut self, embedding: Option<Vec<f32>>);
}

/// Chunking preset an entity's text is split with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkPreset {
    /// Coarse-grained chunks (windowSize 200, overlap 50).
    Parent,
    /// Fine-grained chunks (windowSize 30, overlap 10), generated from
    /// each parent chunk.
    Child,
}

/// Has hierarchically-chunked, separately-indexed text.
pub trait SemanticIndexable: BaseEntity {
    /// Text fed to the chunker.
    fn to_chunkable_input(&self) -> String;

    /// Which preset this entity type's top-level chunking pass uses.
    /// Child chunks are always generated from each resulting parent
    /// chunk regardless of this value.
    fn chunk_preset(&self) -> ChunkPreset {
        ChunkPreset::Parent
    }
}

/// Opts into delta-based version history.
pub trait Versionable: BaseEntity {
    /// Store a full snapshot every N versions, plus always at v1.
    /// `None` means "only snapshot at v1."
    fn snapshot_frequency(&self) -> Option<u32> {
        None
    }
}

/// Identifies itself as a node type participating in [`crate::edge::Edge`]
/// relationships.
pub trait Edgeable: BaseEntity {}

/// Decide whether a version row is a snapshot for the given version
/// number, always at v1, and every
/// `snapshot_frequency`-th version after that.
pub fn is_snapshot_version(version_number: u64, snapshot_frequency: Option<u32>) -> bool {
    if version_number == 1 {
        return true;
    }
    match snapshot_frequency {
        Some(freq) if freq > 0 => version_number % u64::from(freq) == 1,
        _ => false,
    }
}
