//! A hand-rolled, serializable HNSW approximate-nearest-neighbor index.
//!
//! No available crate pairs `add`/`delete`/`save`/`load` in one
//! package with first-class delete support, so this is written from
//! scratch: a small multi-layer proximity graph with greedy search,
//! cosine distance, and tombstone-based delete so a removed chunk's
//! neighbors keep their graph connectivity.

use std::collections::{HashMap, HashSet};

use corestack_core::ann::AnnIndex;
use corestack_core::error::Error;
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default max neighbors per node per layer.
pub const DEFAULT_M: usize = 16;
/// Default candidate list size used while building the graph.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
/// Default candidate list size used while searching.
pub const DEFAULT_EF_SEARCH: usize = 64;

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    corestack_core::chunking::breakpoints::cosine_distance(a, b)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    vector: Vec<f32>,
    /// `neighbors[level]` is this node's neighbor id list at that level.
    neighbors: Vec<Vec<String>>,
    /// Tombstoned on `remove` rather than unlinked, so surviving nodes
    /// keep their graph connectivity.
    deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphState {
    nodes: HashMap<String, Node>,
    entry_point: Option<String>,
    m: usize,
    ef_construction: usize,
}

impl GraphState {
    fn new(m: usize, ef_construction: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            entry_point: None,
            m,
            ef_construction,
        }
    }

    fn level_of(&self, id: &str) -> usize {
        self.nodes.get(id).map(|n| n.neighbors.len().saturating_sub(1)).unwrap_or(0)
    }

    /// Brute-force distance ranking among `candidates`, ascending.
    fn rank(&self, query: &[f32], candidates: impl Iterator<Item = String>) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = candidates
            .filter_map(|id| {
                let node = self.nodes.get(&id)?;
                if node.deleted {
                    return None;
                }
                Some((id, cosine_distance(query, &node.vector)))
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        scored
    }

    /// Greedy descent from `entry` down to `target_level`, returning the
    /// single closest node found at `target_level`.
    fn greedy_search_to_level(&self, query: &[f32], entry: &str, from_level: usize, target_level: usize) -> String {
        let mut current = entry.to_string();
        let mut current_dist = self
            .nodes
            .get(&current)
            .map(|n| cosine_distance(query, &n.vector))
            .unwrap_or(f32::MAX);

        for level in (target_level..=from_level).rev() {
            loop {
                let neighbors = self
                    .nodes
                    .get(&current)
                    .and_then(|n| n.neighbors.get(level))
                    .cloned()
                    .unwrap_or_default();
                let ranked = self.rank(query, neighbors.into_iter());
                match ranked.first() {
                    Some((candidate, dist)) if *dist < current_dist => {
                        current = candidate.clone();
                        current_dist = *dist;
                    }
                    _ => break,
                }
            }
        }
        current
    }

    /// Candidate set gathered at `level` via a local expansion from
    /// `entry`, bounded by `ef`, used both for construction's
    /// neighbor selection and for the level-0 search pass.
    fn search_layer(&self, query: &[f32], entry: &str, level: usize, ef: usize) -> Vec<(String, f32)> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(entry.to_string());
        let mut frontier = vec![entry.to_string()];
        let mut results = self.rank(query, std::iter::once(entry.to_string()));

        while let Some(node_id) = frontier.pop() {
            let neighbors = self
                .nodes
                .get(&node_id)
                .and_then(|n| n.neighbors.get(level))
                .cloned()
                .unwrap_or_default();
            for neighbor in neighbors {
                if visited.insert(neighbor.clone()) {
                    frontier.push(neighbor.clone());
                    if let Some(node) = self.nodes.get(&neighbor) {
                        if !node.deleted {
                            results.push((neighbor, cosine_distance(query, &node.vector)));
                        }
                    }
                }
            }
        }

        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        results.truncate(ef.max(1));
        results
    }

    /// Standard HNSW exponential-decay level assignment: most
    /// insertions land at level 0, with level `L` reached with
    /// probability proportional to `exp(-L / m_l)`.
    fn random_level(&self, rng: &mut impl Rng) -> usize {
        let m_l = 1.0 / (self.m.max(2) as f64).ln();
        let r: f64 = rng.gen_range(f64::EPSILON..1.0);
        ((-r.ln() * m_l).floor() as usize).min(31)
    }
}

/// An in-memory HNSW index over `(id, vector)` pairs, cosine-distance
/// ranked, with JSON-backed `save`/`load` for the blob-persisted web
/// backend.
pub struct HnswIndex {
    state: RwLock<GraphState>,
}

impl Default for HnswIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl HnswIndex {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_M, DEFAULT_EF_CONSTRUCTION)
    }

    pub fn with_params(m: usize, ef_construction: usize) -> Self {
        Self {
            state: RwLock::new(GraphState::new(m, ef_construction)),
        }
    }

    /// Serialize the full graph, including tombstoned nodes, to bytes.
    pub fn save(&self) -> Vec<u8> {
        let state = self.state.read();
        serde_json::to_vec(&*state).expect("HNSW graph state is always JSON-serializable")
    }

    /// Reconstruct an index previously produced by [`HnswIndex::save`].
    pub fn load(bytes: &[u8]) -> Result<Self, Error> {
        let state: GraphState = serde_json::from_slice(bytes)
            .map_err(|e| Error::persistence("HnswIndex", format!("decode HNSW blob: {e}"), Some(Box::new(e))))?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Count including tombstoned nodes, used to cross-check the
    /// blob's `entityCount` hint against a fresh scan.
    pub fn total_len(&self) -> usize {
        self.state.read().nodes.len()
    }
}

impl AnnIndex for HnswIndex {
    fn add(&self, id: &str, vector: &[f32]) -> Result<(), Error> {
        let mut state = self.state.write();
        let mut rng = rand::thread_rng();
        let level = state.random_level(&mut rng);

        if let Some(existing) = state.nodes.get_mut(id) {
            existing.vector = vector.to_vec();
            existing.deleted = false;
            if existing.neighbors.len() <= level {
                existing.neighbors.resize(level + 1, Vec::new());
            }
            return Ok(());
        }

        let entry_point = state.entry_point.clone();
        let m = state.m;
        let ef_construction = state.ef_construction;

        state.nodes.insert(
            id.to_string(),
            Node {
                vector: vector.to_vec(),
                neighbors: vec![Vec::new(); level + 1],
                deleted: false,
            },
        );

        let Some(entry) = entry_point else {
            state.entry_point = Some(id.to_string());
            return Ok(());
        };

        let entry_level = state.level_of(&entry);
        let descend_from = state.greedy_search_to_level(vector, &entry, entry_level, level.min(entry_level));

        for connect_level in (0..=level.min(entry_level)).rev() {
            let candidates = state.search_layer(vector, &descend_from, connect_level, ef_construction);
            let chosen: Vec<String> = candidates.into_iter().take(m).map(|(cid, _)| cid).collect();
            for neighbor_id in &chosen {
                link(&mut state, id, neighbor_id, connect_level, m);
            }
        }

        if level > entry_level {
            state.entry_point = Some(id.to_string());
        }

        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), Error> {
        let mut state = self.state.write();
        let was_entry = state.entry_point.as_deref() == Some(id);
        if let Some(node) = state.nodes.get_mut(id) {
            node.deleted = true;
        }
        if was_entry {
            state.entry_point = state
                .nodes
                .iter()
                .find(|(other_id, n)| !n.deleted && other_id.as_str() != id)
                .map(|(other_id, _)| other_id.clone());
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize, min_similarity: f32) -> Result<Vec<(String, f32)>, Error> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        let Some(entry) = state.entry_point.clone() else {
            return Ok(Vec::new());
        };
        let entry_level = state.level_of(&entry);
        let descend_from = state.greedy_search_to_level(query, &entry, entry_level, 0);
        let candidates = state.search_layer(query, &descend_from, 0, DEFAULT_EF_SEARCH.max(k));

        Ok(candidates
            .into_iter()
            .map(|(id, distance)| (id, 1.0 - distance))
            .filter(|(_, similarity)| *similarity >= min_similarity)
            .take(k)
            .collect())
    }

    fn len(&self) -> usize {
        self.state.read().nodes.values().filter(|n| !n.deleted).count()
    }
}

fn link(state: &mut GraphState, a: &str, b: &str, level: usize, m: usize) {
    add_neighbor(state, a, b, level, m);
    add_neighbor(state, b, a, level, m);
}

fn add_neighbor(state: &mut GraphState, from: &str, to: &str, level: usize, m: usize) {
    let vector_to = match state.nodes.get(to) {
        Some(n) => n.vector.clone(),
        None => return,
    };
    let Some(node) = state.nodes.get_mut(from) else { return };
    if node.neighbors.len() <= level {
        node.neighbors.resize(level + 1, Vec::new());
    }
    let list = &mut node.neighbors[level];
    if list.iter().any(|existing| existing == to) {
        return;
    }
    list.push(to.to_string());
    if list.len() > m {
        // Prune the farthest neighbor so the list stays bounded.
        let node_vector = node.vector.clone();
        list.sort_by(|x, y| {
            let dx = state
                .nodes
                .get(x)
                .map(|n| cosine_distance(&node_vector, &n.vector))
                .unwrap_or(f32::MAX);
            let dy = state
                .nodes
                .get(y)
                .map(|n| cosine_distance(&node_vector, &n.vector))
                .unwrap_or(f32::MAX);
            dx.partial_cmp(&dy).unwrap()
        });
        list.truncate(m);
    }
    let _ = vector_to;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_vector(theta: f32) -> Vec<f32> {
        vec![theta.cos(), theta.sin()]
    }

    #[test]
    fn search_finds_nearest_by_cosine_similarity() {
        let index = HnswIndex::new();
        index.add("a", &unit_vector(0.0)).unwrap();
        index.add("b", &unit_vector(0.1)).unwrap();
        index.add("c", &unit_vector(3.0)).unwrap();

        let results = index.search(&unit_vector(0.0), 2, 0.0).unwrap();
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));
        assert!(!ids.contains(&"c"));
    }

    #[test]
    fn k_zero_returns_empty() {
        let index = HnswIndex::new();
        index.add("a", &unit_vector(0.0)).unwrap();
        assert!(index.search(&unit_vector(0.0), 0, 0.0).unwrap().is_empty());
    }

    #[test]
    fn removed_id_is_not_returned_by_search() {
        let index = HnswIndex::new();
        index.add("a", &unit_vector(0.0)).unwrap();
        index.add("b", &unit_vector(0.05)).unwrap();
        index.remove("a").unwrap();

        let results = index.search(&unit_vector(0.0), 5, 0.0).unwrap();
        assert!(!results.iter().any(|(id, _)| id == "a"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn save_then_load_answers_same_top_k() {
        let index = HnswIndex::new();
        for i in 0..20 {
            index.add(&format!("v{i}"), &unit_vector(i as f32 * 0.1)).unwrap();
        }
        let before = index.search(&unit_vector(0.0), 5, 0.0).unwrap();

        let bytes = index.save();
        let reloaded = HnswIndex::load(&bytes).unwrap();
        let after = reloaded.search(&unit_vector(0.0), 5, 0.0).unwrap();

        let before_ids: Vec<&str> = before.iter().map(|(id, _)| id.as_str()).collect();
        let after_ids: Vec<&str> = after.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(before_ids, after_ids);
    }

    #[test]
    fn empty_index_search_returns_empty() {
        let index = HnswIndex::new();
        assert!(index.search(&unit_vector(0.0), 5, 0.0).unwrap().is_empty());
    }
}
