//! Batched, concurrency-limited embedding.
//!
//! Texts are grouped into fixed-size batches; each batch is one provider
//! call made under the shared [`CallPolicy`]. Batches run concurrently and
//! are reassembled in input order, so output `i` is always the vector of
//! input `i`. A batch whose response has the wrong number of vectors, or a
//! vector whose length is not the provider's `dims()`, fails the whole stage.

use std::sync::Arc;

use anyhow::{bail, Result};
use futures::future::try_join_all;

use rag_eval_core::batch::batch_items;
use rag_eval_core::models::{EmbeddedEvaluationItem, EvaluationDataItem, TextChunk};
use rag_eval_core::providers::EmbeddingProvider;

use crate::retry::CallPolicy;

#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    policy: CallPolicy,
    batch_size: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: CallPolicy, batch_size: usize) -> Self {
        Self {
            provider,
            policy,
            batch_size,
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed `texts`, one vector per text, in input order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<Vec<String>> = batch_items(texts.iter().cloned(), self.batch_size).collect();
        let total = batches.len();
        let dims = self.provider.dims();
        tracing::debug!(texts = texts.len(), batches = total, "embedding");

        let calls = batches.iter().enumerate().map(|(i, batch)| async move {
            let label = format!("embedding batch {}/{}", i + 1, total);
            let vectors = self
                .policy
                .run(&label, || self.provider.embed(batch))
                .await?;
            if vectors.len() != batch.len() {
                bail!(
                    "{}: provider returned {} vectors for {} inputs",
                    label,
                    vectors.len(),
                    batch.len()
                );
            }
            if let Some((pos, bad)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
                bail!(
                    "{}: vector {} has {} dimensions, expected {}",
                    label,
                    pos,
                    bad.len(),
                    dims
                );
            }
            Ok(vectors)
        });

        let embedded = try_join_all(calls).await?;
        Ok(embedded.into_iter().flatten().collect())
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    /// Embed each labeled question.
    pub async fn embed_questions(
        &self,
        items: &[EvaluationDataItem],
    ) -> Result<Vec<EmbeddedEvaluationItem>> {
        let questions: Vec<String> = items.iter().map(|i| i.question.clone()).collect();
        let vectors = self.embed_texts(&questions).await?;

        Ok(items
            .iter()
            .zip(vectors)
            .map(|(item, embedding)| EmbeddedEvaluationItem {
                question: item.question.clone(),
                embedding,
                chunk_id: item.chunk_id.clone(),
            })
            .collect())
    }

    /// Attach a vector to every chunk, in place.
    pub async fn embed_chunks(&self, chunks: &mut [TextChunk]) -> Result<()> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_texts(&texts).await?;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.vector = Some(vector);
        }
        Ok(())
    }
}
