//! Core data models that flow through ingestion and evaluation.
//!
//! Documents and chunks are content-addressed: their identifiers are the
//! SHA-256 of their text, so identical text always maps to the same id.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `text`. Used for both document and chunk ids.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parse a `YYYY-MM` publish date into the first day of that month.
pub fn parse_year_month(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    match NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d") {
        Ok(date) => Ok(date),
        Err(_) => bail!("Date format must be YYYY-MM, got '{}'", trimmed),
    }
}

/// Format a publish date back into `YYYY-MM`.
pub fn format_year_month(date: &NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Validated front-matter metadata of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub publish_date: NaiveDate,
    pub source_url: String,
}

impl DocumentMetadata {
    /// Build metadata from raw front-matter values.
    ///
    /// Every key is required. A missing key or an unparseable date rejects
    /// the whole document.
    pub fn from_fields(
        title: Option<&str>,
        date: Option<&str>,
        url: Option<&str>,
    ) -> Result<Self> {
        let title = title.ok_or_else(|| anyhow::anyhow!("missing required metadata key 'title'"))?;
        let date = date.ok_or_else(|| anyhow::anyhow!("missing required metadata key 'date'"))?;
        let url = url.ok_or_else(|| anyhow::anyhow!("missing required metadata key 'url'"))?;

        Ok(Self {
            title: title.to_string(),
            publish_date: parse_year_month(date)?,
            source_url: url.to_string(),
        })
    }
}

/// A source document, identified by the hash of its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub filename: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(content: String, filename: String, metadata: DocumentMetadata) -> Self {
        Self {
            id: content_hash(&content),
            content,
            filename,
            metadata,
        }
    }
}

/// A retrievable span of a document.
///
/// `chunk_number` is 1-based and dense per `doc_id`. `vector` stays `None`
/// until the chunk is embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub chunk_number: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    pub post_title: String,
    pub publish_date: NaiveDate,
    pub source: String,
}

/// One labeled ground-truth record: a question and the chunk that answers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDataItem {
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub chunk: String,
    pub chunk_id: String,
}

/// A question written from one chunk, with the answer the chunk gives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswerPair {
    pub question: String,
    pub answer: String,
}

impl QuestionAnswerPair {
    /// The ground-truth label for `chunk`.
    pub fn into_label(self, chunk: &TextChunk) -> EvaluationDataItem {
        EvaluationDataItem {
            question: self.question,
            answer: self.answer,
            chunk: chunk.text.clone(),
            chunk_id: chunk.chunk_id.clone(),
        }
    }
}

/// A labeled question paired with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedEvaluationItem {
    pub question: String,
    pub embedding: Vec<f32>,
    pub chunk_id: String,
}

/// The query that produced a [`QueryResult`], one variant per retrieval mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuerySource {
    Embedded {
        question: String,
        embedding: Vec<f32>,
        chunk_id: String,
    },
    Keyword {
        question: String,
        keywords: Vec<String>,
        chunk_id: String,
    },
    Bm25 {
        question: String,
        chunk_id: String,
    },
}

impl QuerySource {
    /// The original question text.
    pub fn question(&self) -> &str {
        match self {
            QuerySource::Embedded { question, .. }
            | QuerySource::Keyword { question, .. }
            | QuerySource::Bm25 { question, .. } => question,
        }
    }

    /// The ground-truth chunk id.
    pub fn chunk_id(&self) -> &str {
        match self {
            QuerySource::Embedded { chunk_id, .. }
            | QuerySource::Keyword { chunk_id, .. }
            | QuerySource::Bm25 { chunk_id, .. } => chunk_id,
        }
    }
}

impl From<EmbeddedEvaluationItem> for QuerySource {
    fn from(item: EmbeddedEvaluationItem) -> Self {
        QuerySource::Embedded {
            question: item.question,
            embedding: item.embedding,
            chunk_id: item.chunk_id,
        }
    }
}

/// Ranked chunks returned for one labeled query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub source: QuerySource,
    pub results: Vec<TextChunk>,
}

impl QueryResult {
    /// Chunk ids of the results, in rank order.
    pub fn predicted_ids(&self) -> Vec<&str> {
        self.results.iter().map(|c| c.chunk_id.as_str()).collect()
    }
}
