//! Orchestrates the two-level semantic chunking algorithm end to end:
//! generating parent and child chunks, embedding them, and staging
//! them into an ANN index.

use crate::ann::{AnnIndex, ChunkRegistry};
use crate::capability::ChunkPreset;
use crate::chunk::Chunk;
use crate::embedding::EmbeddingService;
use crate::error::Error;

use super::breakpoints::assemble_chunks;
use super::segmenter::sentence_split;
use super::window::windowize;

/// Tunables for one chunking pass.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub window_size: usize,
    pub overlap: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub breakpoint_percentile: f32,
}

impl ChunkingConfig {
    pub const fn parent() -> Self {
        Self {
            window_size: 200,
            overlap: 50,
            min_chunk_size: 128,
            max_chunk_size: 400,
            breakpoint_percentile: 0.8,
        }
    }

    pub const fn child() -> Self {
        Self {
            window_size: 30,
            overlap: 10,
            min_chunk_size: 10,
            max_chunk_size: 60,
            breakpoint_percentile: 0.8,
        }
    }

    pub const fn for_preset(preset: ChunkPreset) -> Self {
        match preset {
            ChunkPreset::Parent => Self::parent(),
            ChunkPreset::Child => Self::child(),
        }
    }
}

/// One generated chunk paired with the text it covers and its
/// embedding vector, ready to be staged into the index.
pub struct GeneratedChunk {
    pub chunk: Chunk,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Run the full algorithm for one preset over
/// `text`, attributed to `source_entity_uuid`/`source_entity_type`.
///
/// Returns `[]` for empty/whitespace-only text (no chunks generated,
/// matching the embedding no-op rule in Boundaries).
pub fn generate_chunks(
    text: &str,
    source_entity_uuid: &str,
    source_entity_type: &str,
    preset: ChunkPreset,
    embedder: &dyn EmbeddingService,
) -> Vec<GeneratedChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let config = ChunkingConfig::for_preset(preset);
    let sentences = sentence_split(text);
    if sentences.is_empty() {
        return Vec::new();
    }

    let windows = windowize(&sentences, config.window_size, config.overlap);
    let embeddings: Vec<Vec<f32>> = windows
        .iter()
        .map(|w| embedder.embed(&w.text).unwrap_or_default())
        .collect();

    let spans = assemble_chunks(
        &windows,
        &embeddings,
        config.breakpoint_percentile,
        config.min_chunk_size,
        config.max_chunk_size,
    );

    let joined_tokens: Vec<&str> = sentences.join(" ").split_whitespace().collect();

    spans
        .into_iter()
        .map(|span| {
            let span_text = joined_tokens[span.start_token..span.end_token].join(" ");
            let embedding = embedder.embed(&span_text).unwrap_or_default();
            GeneratedChunk {
                chunk: Chunk::new(source_entity_uuid, source_entity_type, span.start_token, span.end_token, preset),
                text: span_text,
                embedding,
            }
        })
        .collect()
}

/// Regenerate chunks for `text` at both the parent and child levels
/// (parent chunks first from full text; each parent re-chunked with
/// the child preset), add every resulting vector to `index`, and
/// return the full set of generated chunks. Does not touch `registry`;
/// callers stage these ids and commit them separately inside the
/// owning transaction.
pub fn index_entity(
    text: &str,
    source_entity_uuid: &str,
    source_entity_type: &str,
    embedder: &dyn EmbeddingService,
    index: &dyn AnnIndex,
) -> Result<Vec<Chunk>, Error> {
    let mut staged = Vec::new();

    let parents = generate_chunks(text, source_entity_uuid, source_entity_type, ChunkPreset::Parent, embedder);
    for parent in parents {
        index.add(&parent.chunk.id, &parent.embedding)?;
        let children = generate_chunks(
            &parent.text,
            source_entity_uuid,
            source_entity_type,
            ChunkPreset::Child,
            embedder,
        );
        staged.push(parent.chunk);
        for child in children {
            index.add(&child.chunk.id, &child.embedding)?;
            staged.push(child.chunk);
        }
    }

    Ok(staged)
}

/// Remove `entity_uuid`'s registered chunks from `index` and clear its
/// registry entry.
pub fn delete_by_entity_id(
    entity_uuid: &str,
    index: &dyn AnnIndex,
    registry: &dyn ChunkRegistry,
) -> Result<(), Error> {
    let chunk_ids = registry.clear(entity_uuid)?;
    for id in chunk_ids {
        index.remove(&id)?;
    }
    Ok(())
}
