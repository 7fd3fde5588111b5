//! Vector helpers shared by the chunk stores.
//!
//! Embeddings are persisted as little-endian `f32` BLOBs and compared with
//! cosine similarity. Search here is brute force: every stored vector is
//! scored and the top `limit` are kept.

use std::cmp::Ordering;

/// Encode a float vector as little-endian `f32` bytes.
///
/// ```rust
/// use rag_eval_core::vector::{blob_to_vec, vec_to_blob};
///
/// let v = vec![0.5f32, -1.25, 3.0];
/// assert_eq!(vec_to_blob(&v).len(), 12);
/// assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, mismatched lengths, or zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Indices of the `limit` most similar candidates, best first.
///
/// Candidates without a vector are skipped. The sort is stable, so equal
/// similarities keep their input order.
pub fn rank_by_similarity<'a, I>(query: &[f32], candidates: I, limit: usize) -> Vec<usize>
where
    I: IntoIterator<Item = Option<&'a [f32]>>,
{
    let mut scored: Vec<(usize, f32)> = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, cosine_similarity(query, v))))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(limit);
    scored.into_iter().map(|(i, _)| i).collect()
}
