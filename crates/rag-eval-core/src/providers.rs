//! Provider traits for the network-calling stages.
//!
//! Concrete providers (OpenAI, Ollama, Cohere, fastembed) live in the
//! `rag-eval` app crate. They are constructed once per run, handed around
//! as `Arc<dyn Trait>`, and replaced with fakes in tests.
//!
//! Implementations should not retry on their own. Retry and admission are
//! applied by the caller.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::QuestionAnswerPair;

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Orders candidate texts by relevance to a query.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// Indices into `documents`, most relevant first.
    ///
    /// May return fewer indices than candidates.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<usize>>;
}

/// Expands a question into search keywords.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract(&self, question: &str) -> Result<Vec<String>>;
}

/// Writes a question that the given chunk, and ideally only that chunk,
/// answers.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, chunk_text: &str) -> Result<QuestionAnswerPair>;
}
