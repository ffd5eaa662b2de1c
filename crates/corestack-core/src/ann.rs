//! The vector index seam the chunking service and repository search
//! through. Concretely implemented by the `corestack-ann` crate; this
//! crate only depends on the trait.

use crate::error::Error;

/// An approximate-nearest-neighbor index keyed by arbitrary string ids
/// (entity uuids or chunk ids), storing fixed-dimension vectors.
pub trait AnnIndex: Send + Sync {
    /// Insert or overwrite the vector for `id`.
    fn add(&self, id: &str, vector: &[f32]) -> Result<(), Error>;

    /// Remove `id`'s vector. A no-op, not an error, if `id` is absent.
    fn remove(&self, id: &str) -> Result<(), Error>;

    /// The `k` ids with the highest cosine similarity to `query`,
    /// descending, each similarity `>= min_similarity`. `k == 0`
    /// returns `[]`.
    fn search(&self, query: &[f32], k: usize, min_similarity: f32) -> Result<Vec<(String, f32)>, Error>;

    /// Number of vectors currently indexed.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Durable mapping from an entity's uuid to the chunk ids it currently
/// owns in the index.
pub trait ChunkRegistry: Send + Sync {
    /// Replace `entity_uuid`'s registered chunk ids wholesale.
    fn set(&self, entity_uuid: &str, chunk_ids: Vec<String>) -> Result<(), Error>;

    /// Currently registered chunk ids for `entity_uuid`, `[]` if none.
    fn get(&self, entity_uuid: &str) -> Result<Vec<String>, Error>;

    /// Remove and return `entity_uuid`'s registered chunk ids.
    fn clear(&self, entity_uuid: &str) -> Result<Vec<String>, Error>;
}
