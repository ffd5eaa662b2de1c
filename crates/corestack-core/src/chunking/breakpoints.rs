//! Breakpoint detection and chunk assembly.

use super::window::Window;

/// Cosine distance (`1 - cosine similarity`) between two equal-length
/// vectors. Treats a zero vector as maximally distant from anything
/// (distance `1.0`) rather than dividing by zero.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// The `percentile` (0.0-1.0) value of `values`, via nearest-rank on a
/// sorted copy. Returns `0.0` for an empty slice.
pub fn percentile(values: &[f32], percentile: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let rank = ((percentile * sorted.len() as f32).ceil() as usize)
        .saturating_sub(1)
        .min(sorted.len() - 1);
    sorted[rank]
}

/// A group of consecutive windows merged into one chunk span, in token
/// offsets relative to the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start_token: usize,
    pub end_token: usize,
}

/// Run steps 4-6 of the algorithm: compute consecutive cosine
/// distances between `embeddings` (one per window in `windows`), mark
/// breaks at the `breakpoint_percentile`-th percentile, group windows
/// between breaks, then enforce `min_chunk_size`/`max_chunk_size` in
/// tokens.
///
/// `embeddings.len()` must equal `windows.len()`.
pub fn assemble_chunks(
    windows: &[Window],
    embeddings: &[Vec<f32>],
    breakpoint_percentile: f32,
    min_chunk_size: usize,
    max_chunk_size: usize,
) -> Vec<ChunkSpan> {
    if windows.is_empty() {
        return Vec::new();
    }
    if windows.len() == 1 {
        return vec![ChunkSpan {
            start_token: windows[0].start_token,
            end_token: windows[0].end_token,
        }];
    }

    let distances: Vec<f32> = windows
        .windows(2)
        .zip(embeddings.windows(2))
        .map(|(_, pair)| cosine_distance(&pair[0], &pair[1]))
        .collect();
    let threshold = percentile(&distances, breakpoint_percentile);

    let mut groups: Vec<Vec<usize>> = vec![vec![0]];
    for (i, &distance) in distances.iter().enumerate() {
        let next_window = i + 1;
        if distance >= threshold {
            groups.push(vec![next_window]);
        } else {
            groups.last_mut().unwrap().push(next_window);
        }
    }

    let mut spans: Vec<ChunkSpan> = groups
        .iter()
        .map(|group| ChunkSpan {
            start_token: windows[*group.first().unwrap()].start_token,
            end_token: windows[*group.last().unwrap()].end_token,
        })
        .collect();

    enforce_min_chunk_size(&mut spans, min_chunk_size);
    enforce_max_chunk_size(&mut spans, max_chunk_size);
    spans
}

fn span_len(span: &ChunkSpan) -> usize {
    span.end_token - span.start_token
}

/// Merge any chunk smaller than `min_chunk_size` into the previous
/// chunk. The first chunk is never merged away (nothing precedes it).
fn enforce_min_chunk_size(spans: &mut Vec<ChunkSpan>, min_chunk_size: usize) {
    let mut i = 1;
    while i < spans.len() {
        if span_len(&spans[i]) < min_chunk_size {
            spans[i - 1].end_token = spans[i].end_token;
            spans.remove(i);
        } else {
            i += 1;
        }
    }
}

/// Split any chunk larger than `max_chunk_size` into equal-ish pieces
/// of at most `max_chunk_size` tokens, since sub-chunk break candidates
/// were already collapsed by the min-size merge pass above.
fn enforce_max_chunk_size(spans: &mut Vec<ChunkSpan>, max_chunk_size: usize) {
    let mut result = Vec::with_capacity(spans.len());
    for span in spans.drain(..) {
        if span_len(&span) <= max_chunk_size || max_chunk_size == 0 {
            result.push(span);
            continue;
        }
        let mut cursor = span.start_token;
        while cursor < span.end_token {
            let end = (cursor + max_chunk_size).min(span.end_token);
            result.push(ChunkSpan {
                start_token: cursor,
                end_token: end,
            });
            cursor = end;
        }
    }
    *spans = result;
}
