//! Metadata-only chunk descriptors. The chunk's embedding lives in the
//! HNSW index, not here.

use serde::{Deserialize, Serialize};

use crate::capability::ChunkPreset;

/// A token-delimited slice of an entity's text, paired with an
/// embedding inside the HNSW index rather than stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk identity, also the key this chunk is indexed under in HNSW.
    pub id: String,
    /// Uuid of the entity this chunk was derived from.
    pub source_entity_uuid: String,
    /// Entity type name of the source entity.
    pub source_entity_type: String,
    /// Inclusive start token offset into the source text.
    pub start_token: usize,
    /// Exclusive end token offset into the source text.
    pub end_token: usize,
    /// Which preset produced this chunk.
    pub config: ChunkPreset,
}

impl Serialize for ChunkPreset {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            ChunkPreset::Parent => "parent",
            ChunkPreset::Child => "child",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> Deserialize<'de> for ChunkPreset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "parent" => Ok(ChunkPreset::Parent),
            "child" => Ok(ChunkPreset::Child),
            other => Err(serde::de::Error::unknown_variant(other, &["parent", "child"])),
        }
    }
}

impl Chunk {
    /// Construct a chunk descriptor for one generated window/group.
    pub fn new(
        source_entity_uuid: impl Into<String>,
        source_entity_type: impl Into<String>,
        start_token: usize,
        end_token: usize,
        config: ChunkPreset,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_entity_uuid: source_entity_uuid.into(),
            source_entity_type: source_entity_type.into(),
            start_token,
            end_token,
            config,
        }
    }
}
