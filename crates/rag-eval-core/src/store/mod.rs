//! Chunk index abstraction.
//!
//! The [`ChunkStore`] trait covers every index operation the retrieval
//! dispatcher needs: storing chunk records and the three search modes.
//! The app crate backs it with SQLite; [`memory::InMemoryStore`] backs it
//! with plain collections for tests and embedding into other programs.
//!
//! Every search returns whole [`TextChunk`] records, best first, at most
//! `limit` of them.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::TextChunk;

/// Okapi BM25 term-frequency saturation.
pub const BM25_K1: f64 = 1.2;
/// Okapi BM25 length normalization.
pub const BM25_B: f64 = 0.75;

/// Abstract chunk index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_chunks`](ChunkStore::add_chunks) | Insert chunks, replacing any with the same `(doc_id, chunk_number)` |
/// | [`vector_search`](ChunkStore::vector_search) | Cosine similarity over stored vectors |
/// | [`keyword_search`](ChunkStore::keyword_search) | Substring match on any keyword, ranked by distinct matches |
/// | [`ensure_text_index`](ChunkStore::ensure_text_index) | Build the BM25 text index if missing |
/// | [`bm25_search`](ChunkStore::bm25_search) | BM25 ranking over the text index |
/// | [`chunk_counts`](ChunkStore::chunk_counts) | Number of chunks per document |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn add_chunks(&self, chunks: &[TextChunk]) -> Result<()>;

    /// Chunks without a vector never match.
    async fn vector_search(&self, vector: &[f32], limit: usize) -> Result<Vec<TextChunk>>;

    /// Case-insensitive substring match on any keyword. Ties keep insertion
    /// order; an empty keyword list matches nothing.
    async fn keyword_search(&self, keywords: &[String], limit: usize) -> Result<Vec<TextChunk>>;

    /// Idempotent. Calling it on an up-to-date index does no work.
    async fn ensure_text_index(&self) -> Result<()>;

    /// Fails if [`ensure_text_index`](ChunkStore::ensure_text_index) has
    /// never been called.
    async fn bm25_search(&self, text: &str, limit: usize) -> Result<Vec<TextChunk>>;

    async fn chunk_counts(&self) -> Result<HashMap<String, i64>>;

    async fn chunk_count(&self) -> Result<i64>;
}

/// Number of distinct keywords that occur in `text`, ignoring case.
pub fn keyword_match_count(text: &str, keywords: &[String]) -> usize {
    let haystack = text.to_lowercase();
    let mut matched: Vec<String> = Vec::new();
    for keyword in keywords {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() || matched.contains(&needle) {
            continue;
        }
        if haystack.contains(&needle) {
            matched.push(needle);
        }
    }
    matched.len()
}

/// Rank chunks by [`keyword_match_count`], descending, dropping non-matches.
///
/// `chunks` must already be in insertion order; the sort is stable.
pub fn rank_keyword_matches<I>(chunks: I, keywords: &[String], limit: usize) -> Vec<TextChunk>
where
    I: IntoIterator<Item = TextChunk>,
{
    let mut scored: Vec<(usize, TextChunk)> = chunks
        .into_iter()
        .map(|c| (keyword_match_count(&c.text, keywords), c))
        .filter(|(count, _)| *count > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.truncate(limit);
    scored.into_iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_keyword_match_count_is_case_insensitive_and_distinct() {
        let text = "The Global Interpreter Lock (GIL) serializes bytecode.";
        assert_eq!(keyword_match_count(text, &kw(&["gil", "GIL", "lock"])), 2);
        assert_eq!(keyword_match_count(text, &kw(&["interpret"])), 1);
        assert_eq!(keyword_match_count(text, &kw(&["mutex"])), 0);
        assert_eq!(keyword_match_count(text, &kw(&["", "  "])), 0);
    }
}
