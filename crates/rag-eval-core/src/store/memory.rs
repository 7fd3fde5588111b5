//! In-memory [`ChunkStore`] for tests and embedding into other programs.
//!
//! Chunks live in a `Vec` behind `std::sync::RwLock`, in insertion order.
//! Vector search is brute-force cosine similarity; BM25 statistics are
//! computed from the current chunk set on every query, so the "text index"
//! is only a flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::TextChunk;
use crate::terms::{query_terms, tokenize};
use crate::vector::rank_by_similarity;

use super::{rank_keyword_matches, ChunkStore, BM25_B, BM25_K1};

pub struct InMemoryStore {
    chunks: RwLock<Vec<TextChunk>>,
    text_index: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            text_index: AtomicBool::new(false),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<TextChunk>>> {
        self.chunks
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<TextChunk>>> {
        self.chunks
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Okapi BM25 score of every document against `query`, by position.
fn bm25_scores(docs: &[Vec<String>], query: &[String]) -> Vec<f64> {
    let n = docs.len() as f64;
    if docs.is_empty() {
        return Vec::new();
    }
    let avgdl = docs.iter().map(|d| d.len()).sum::<usize>() as f64 / n;

    let mut scores = vec![0.0; docs.len()];
    for term in query {
        let df = docs.iter().filter(|d| d.contains(term)).count() as f64;
        if df == 0.0 {
            continue;
        }
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
        for (score, doc) in scores.iter_mut().zip(docs) {
            let tf = doc.iter().filter(|t| *t == term).count() as f64;
            if tf == 0.0 {
                continue;
            }
            let dl = doc.len() as f64;
            let norm = if avgdl > 0.0 { dl / avgdl } else { 1.0 };
            *score += idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * norm));
        }
    }
    scores
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn add_chunks(&self, chunks: &[TextChunk]) -> Result<()> {
        let mut stored = self.write()?;
        for chunk in chunks {
            match stored
                .iter_mut()
                .find(|c| c.doc_id == chunk.doc_id && c.chunk_number == chunk.chunk_number)
            {
                Some(existing) => *existing = chunk.clone(),
                None => stored.push(chunk.clone()),
            }
        }
        Ok(())
    }

    async fn vector_search(&self, vector: &[f32], limit: usize) -> Result<Vec<TextChunk>> {
        let stored = self.read()?;
        let ranked = rank_by_similarity(
            vector,
            stored.iter().map(|c| c.vector.as_deref()),
            limit,
        );
        Ok(ranked.into_iter().map(|i| stored[i].clone()).collect())
    }

    async fn keyword_search(&self, keywords: &[String], limit: usize) -> Result<Vec<TextChunk>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let stored = self.read()?;
        Ok(rank_keyword_matches(stored.iter().cloned(), keywords, limit))
    }

    async fn ensure_text_index(&self) -> Result<()> {
        self.text_index.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn bm25_search(&self, text: &str, limit: usize) -> Result<Vec<TextChunk>> {
        if !self.text_index.load(Ordering::SeqCst) {
            bail!("Text index has not been built. Call ensure_text_index first.");
        }
        let query = query_terms(text);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let stored = self.read()?;
        let docs: Vec<Vec<String>> = stored.iter().map(|c| tokenize(&c.text)).collect();
        let mut scored: Vec<(usize, f64)> = bm25_scores(&docs, &query)
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(i, _)| stored[i].clone()).collect())
    }

    async fn chunk_counts(&self) -> Result<HashMap<String, i64>> {
        let stored = self.read()?;
        let mut counts = HashMap::new();
        for chunk in stored.iter() {
            *counts.entry(chunk.doc_id.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn chunk_count(&self) -> Result<i64> {
        Ok(self.read()?.len() as i64)
    }
}
