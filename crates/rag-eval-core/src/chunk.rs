//! Document chunking.
//!
//! Turns a [`Document`] into an ordered list of [`TextChunk`]s. Every chunk
//! is content-addressed (its id is the SHA-256 of its text) and carries the
//! owning document's provenance: title, publish date and source URL.
//!
//! # Strategies
//!
//! - **Fixed window** (default): a sliding window of `window_size`
//!   characters advancing by `window_size - overlap`. With `overlap = 0` the
//!   chunks concatenate back to the exact document content.
//! - **Structural**: one chunk per paragraph (blank-line separated). A
//!   paragraph longer than `max_chars` is packed sentence by sentence, and a
//!   single sentence longer than `max_chars` is hard-split at the nearest
//!   whitespace.
//!
//! Both strategies preserve document order, number chunks densely from 1,
//! and yield no chunks for an empty document.
//!
//! # Example
//!
//! ```rust
//! use rag_eval_core::chunk::chunk_fixed_window;
//! use rag_eval_core::models::{Document, DocumentMetadata};
//!
//! let meta = DocumentMetadata::from_fields(Some("T"), Some("2024-01"), Some("https://x")).unwrap();
//! let doc = Document::new("abcdefghij".to_string(), "a.md".to_string(), meta);
//! let chunks = chunk_fixed_window(&doc, 4, 0).unwrap();
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, ["abcd", "efgh", "ij"]);
//! ```

use std::str::FromStr;

use anyhow::{bail, Result};

use crate::models::{content_hash, Document, TextChunk};

/// Default fixed-window size, in characters.
pub const DEFAULT_WINDOW_SIZE: usize = 1024;

/// How a document is partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    FixedWindow,
    Structural,
}

impl FromStr for ChunkStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed" => Ok(ChunkStrategy::FixedWindow),
            "structural" => Ok(ChunkStrategy::Structural),
            other => bail!(
                "Unknown chunking strategy: '{}'. Use fixed or structural.",
                other
            ),
        }
    }
}

/// Chunking parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct ChunkParams {
    pub strategy: ChunkStrategy,
    pub window_size: usize,
    pub overlap: usize,
    /// Upper bound on a structural chunk, in characters.
    pub max_chars: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::FixedWindow,
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: 0,
            max_chars: DEFAULT_WINDOW_SIZE,
        }
    }
}

/// Chunk one document with the configured strategy.
pub fn chunk_document(doc: &Document, params: &ChunkParams) -> Result<Vec<TextChunk>> {
    match params.strategy {
        ChunkStrategy::FixedWindow => chunk_fixed_window(doc, params.window_size, params.overlap),
        ChunkStrategy::Structural => chunk_structural(doc, params.max_chars),
    }
}

/// Chunk a sequence of documents, preserving document order.
pub fn chunk_documents(docs: &[Document], params: &ChunkParams) -> Result<Vec<TextChunk>> {
    let mut out = Vec::new();
    for doc in docs {
        out.extend(chunk_document(doc, params)?);
    }
    Ok(out)
}

/// Sliding-window chunking over Unicode scalar values.
///
/// Window starts are `0, step, 2*step, …` with `step = window_size - overlap`;
/// the final window may be shorter than `window_size`.
pub fn chunk_fixed_window(doc: &Document, window_size: usize, overlap: usize) -> Result<Vec<TextChunk>> {
    if window_size == 0 {
        bail!("window_size must be > 0");
    }
    if overlap >= window_size {
        bail!(
            "overlap ({}) must be smaller than window_size ({})",
            overlap,
            window_size
        );
    }

    let text = doc.content.as_str();
    // Byte offset of every char, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n_chars = bounds.len() - 1;
    let step = window_size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < n_chars {
        let end = (start + window_size).min(n_chars);
        let piece = &text[bounds[start]..bounds[end]];
        chunks.push(make_chunk(doc, chunks.len() as i64 + 1, piece));
        start += step;
    }

    Ok(chunks)
}

/// Paragraph-boundary chunking; see the module docs for the splitting rules.
pub fn chunk_structural(doc: &Document, max_chars: usize) -> Result<Vec<TextChunk>> {
    if max_chars == 0 {
        bail!("max_chars must be > 0");
    }

    let mut chunks = Vec::new();
    for para in paragraphs(&doc.content) {
        if para.chars().count() <= max_chars {
            chunks.push(make_chunk(doc, chunks.len() as i64 + 1, &para));
            continue;
        }
        for piece in split_long_paragraph(&para, max_chars) {
            chunks.push(make_chunk(doc, chunks.len() as i64 + 1, &piece));
        }
    }

    Ok(chunks)
}

/// Group non-blank lines into trimmed paragraphs.
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n").trim().to_string());
    }

    out
}

/// Pack sentences into pieces of at most `max_chars` characters.
fn split_long_paragraph(para: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for sentence in sentences(para) {
        let sentence_len = sentence.chars().count();
        let would_be = if buf.is_empty() {
            sentence_len
        } else {
            buf.chars().count() + 1 + sentence_len
        };

        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if sentence_len > max_chars {
            pieces.extend(hard_split(sentence, max_chars));
        } else {
            if !buf.is_empty() {
                buf.push(' ');
            }
            buf.push_str(sentence);
        }
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
}

/// Split after `.`, `!` or `?` when followed by whitespace.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;

    for (i, ch) in text.char_indices() {
        if prev_terminal && ch.is_whitespace() {
            let s = text[start..i].trim();
            if !s.is_empty() {
                out.push(s);
            }
            start = i;
        }
        prev_terminal = matches!(ch, '.' | '!' | '?');
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }

    out
}

/// Hard split at `max_chars`, backing off to the last newline or space.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let split_at = match remaining.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => remaining[..byte_idx]
                .rfind('\n')
                .or_else(|| remaining[..byte_idx].rfind(' '))
                .filter(|&pos| pos > 0)
                .map(|pos| pos + 1)
                .unwrap_or(byte_idx),
            None => remaining.len(),
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }

    pieces
}

fn make_chunk(doc: &Document, number: i64, text: &str) -> TextChunk {
    TextChunk {
        chunk_id: content_hash(text),
        doc_id: doc.id.clone(),
        chunk_number: number,
        text: text.to_string(),
        vector: None,
        post_title: doc.metadata.title.clone(),
        publish_date: doc.metadata.publish_date,
        source: doc.metadata.source_url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    fn doc(content: &str) -> Document {
        let meta = DocumentMetadata::from_fields(
            Some("Essay"),
            Some("2021-04"),
            Some("https://example.com/essay"),
        )
        .unwrap();
        Document::new(content.to_string(), "essay.md".to_string(), meta)
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        let d = doc("");
        assert!(chunk_fixed_window(&d, 1024, 0).unwrap().is_empty());
        assert!(chunk_structural(&d, 1024).unwrap().is_empty());
    }

    #[test]
    fn test_fixed_window_reconstructs_content() {
        let content = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let d = doc(&content);
        for window in [1, 7, 64, 1024, 5000] {
            let chunks = chunk_fixed_window(&d, window, 0).unwrap();
            let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(joined, content, "window {}", window);
        }
    }

    #[test]
    fn test_fixed_window_multibyte() {
        let d = doc("héllo wörld ñ");
        let chunks = chunk_fixed_window(&d, 3, 0).unwrap();
        assert_eq!(chunks[0].text, "hél");
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, d.content);
    }

    #[test]
    fn test_fixed_window_overlap_starts() {
        let d = doc("abcdefghij");
        let chunks = chunk_fixed_window(&d, 4, 2).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["abcd", "cdef", "efgh", "ghij", "ij"]);
    }

    #[test]
    fn test_fixed_window_rejects_bad_params() {
        let d = doc("abc");
        assert!(chunk_fixed_window(&d, 0, 0).is_err());
        assert!(chunk_fixed_window(&d, 4, 4).is_err());
    }

    #[test]
    fn test_chunk_numbers_dense_and_one_based() {
        let d = doc(&"x".repeat(100));
        let chunks = chunk_fixed_window(&d, 9, 0).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_number, i as i64 + 1);
            assert_eq!(c.doc_id, d.id);
        }
    }

    #[test]
    fn test_provenance_copied() {
        let d = doc("abc");
        let c = &chunk_fixed_window(&d, 10, 0).unwrap()[0];
        assert_eq!(c.post_title, "Essay");
        assert_eq!(c.source, "https://example.com/essay");
        assert_eq!(c.chunk_id, content_hash("abc"));
        assert!(c.vector.is_none());
    }

    #[test]
    fn test_structural_one_chunk_per_paragraph() {
        let d = doc("First paragraph.\n\nSecond paragraph\nspans two lines.\n\n   \n\nThird.");
        let chunks = chunk_structural(&d, 1024).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            ["First paragraph.", "Second paragraph\nspans two lines.", "Third."]
        );
        assert_eq!(chunks[2].chunk_number, 3);
    }

    #[test]
    fn test_structural_splits_long_paragraph_on_sentences() {
        let d = doc("One two three. Four five six. Seven eight nine.");
        let chunks = chunk_structural(&d, 30).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["One two three. Four five six.", "Seven eight nine."]);
    }

    #[test]
    fn test_structural_respects_ceiling() {
        let long = "word ".repeat(200);
        let d = doc(&format!("{}\n\nshort", long.trim()));
        let chunks = chunk_structural(&d, 50).unwrap();
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 50));
        assert_eq!(chunks.last().unwrap().text, "short");
    }

    #[test]
    fn test_structural_preserves_order() {
        let text = (0..20)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_structural(&doc(&text), 1024).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.text, format!("Paragraph number {}.", i));
        }
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("fixed".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::FixedWindow);
        assert_eq!(
            "structural".parse::<ChunkStrategy>().unwrap(),
            ChunkStrategy::Structural
        );
        assert!("semantic".parse::<ChunkStrategy>().is_err());
    }
}
