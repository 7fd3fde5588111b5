//! Retrieval dispatcher.
//!
//! Runs one retrieval strategy for every labeled question and returns one
//! [`QueryResult`] per question, in input order.
//!
//! | Mode | Query | Index call |
//! |------|-------|------------|
//! | `semantic` | question embedding | [`vector_search`](ChunkStore::vector_search) |
//! | `keyword` | extracted keywords | [`keyword_search`](ChunkStore::keyword_search) |
//! | `bm25` | raw question | [`bm25_search`](ChunkStore::bm25_search) |
//!
//! Index calls run concurrently under the shared admission gate; keyword
//! extraction also goes through the retry policy.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use clap::ValueEnum;
use futures::future::try_join_all;

use rag_eval_core::models::{EmbeddedEvaluationItem, EvaluationDataItem, QueryResult, QuerySource};
use rag_eval_core::providers::KeywordExtractor;
use rag_eval_core::store::ChunkStore;

use crate::retry::CallPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RetrievalMode {
    Semantic,
    Keyword,
    Bm25,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RetrievalMode::Semantic => "semantic",
            RetrievalMode::Keyword => "keyword",
            RetrievalMode::Bm25 => "bm25",
        })
    }
}

pub struct Retriever {
    store: Arc<dyn ChunkStore>,
    policy: CallPolicy,
    limit: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn ChunkStore>, policy: CallPolicy, limit: usize) -> Self {
        Self {
            store,
            policy,
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Vector search with each question's embedding.
    pub async fn semantic(&self, items: &[EmbeddedEvaluationItem]) -> Result<Vec<QueryResult>> {
        let searches = items.iter().map(|item| async move {
            let results = self
                .policy
                .admit(self.store.vector_search(&item.embedding, self.limit))
                .await?;
            Ok::<_, anyhow::Error>(QueryResult {
                source: QuerySource::from(item.clone()),
                results,
            })
        });
        try_join_all(searches).await
    }

    /// Extract keywords per question, then search for chunks containing them.
    pub async fn keyword(
        &self,
        items: &[EvaluationDataItem],
        extractor: &dyn KeywordExtractor,
    ) -> Result<Vec<QueryResult>> {
        let searches = items.iter().enumerate().map(|(i, item)| async move {
            let label = format!("keyword extraction {}", i + 1);
            let keywords = self
                .policy
                .run(&label, || extractor.extract(&item.question))
                .await?;
            tracing::debug!(question = %item.question, ?keywords, "extracted keywords");

            let results = self
                .policy
                .admit(self.store.keyword_search(&keywords, self.limit))
                .await?;
            Ok::<_, anyhow::Error>(QueryResult {
                source: QuerySource::Keyword {
                    question: item.question.clone(),
                    keywords,
                    chunk_id: item.chunk_id.clone(),
                },
                results,
            })
        });
        try_join_all(searches).await
    }

    /// BM25 over the text index, building the index first if needed.
    pub async fn bm25(&self, items: &[EvaluationDataItem]) -> Result<Vec<QueryResult>> {
        self.store.ensure_text_index().await?;

        let searches = items.iter().map(|item| async move {
            let results = self
                .policy
                .admit(self.store.bm25_search(&item.question, self.limit))
                .await?;
            Ok::<_, anyhow::Error>(QueryResult {
                source: QuerySource::Bm25 {
                    question: item.question.clone(),
                    chunk_id: item.chunk_id.clone(),
                },
                results,
            })
        });
        try_join_all(searches).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::TermsExtractor;
    use chrono::NaiveDate;
    use rag_eval_core::models::{content_hash, TextChunk};
    use rag_eval_core::store::memory::InMemoryStore;
    use std::time::Duration;

    fn chunk(number: i64, text: &str, vector: Vec<f32>) -> TextChunk {
        TextChunk {
            chunk_id: content_hash(text),
            doc_id: "d".to_string(),
            chunk_number: number,
            text: text.to_string(),
            vector: Some(vector),
            post_title: "Post".to_string(),
            publish_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            source: "https://x".to_string(),
        }
    }

    fn label(question: &str, text: &str) -> EvaluationDataItem {
        EvaluationDataItem {
            question: question.to_string(),
            answer: String::new(),
            chunk: text.to_string(),
            chunk_id: content_hash(text),
        }
    }

    async fn retriever(limit: usize) -> Retriever {
        let store = InMemoryStore::new();
        store
            .add_chunks(&[
                chunk(1, "Ownership moves values between bindings.", vec![1.0, 0.0, 0.0]),
                chunk(2, "Borrowing lends a reference without moving.", vec![0.0, 1.0, 0.0]),
                chunk(3, "Lifetimes bound how long a borrow lives.", vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();
        Retriever::new(Arc::new(store), CallPolicy::new(10, 1, Duration::ZERO), limit)
    }

    #[tokio::test]
    async fn test_semantic_results_follow_input_order() {
        let r = retriever(2).await;
        let items = vec![
            EmbeddedEvaluationItem {
                question: "lifetimes?".to_string(),
                embedding: vec![0.0, 0.1, 1.0],
                chunk_id: "x".to_string(),
            },
            EmbeddedEvaluationItem {
                question: "ownership?".to_string(),
                embedding: vec![1.0, 0.0, 0.0],
                chunk_id: "y".to_string(),
            },
        ];
        let results = r.semantic(&items).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source.question(), "lifetimes?");
        assert_eq!(results[0].results.len(), 2);
        assert!(results[0].results[0].text.starts_with("Lifetimes"));
        assert!(results[1].results[0].text.starts_with("Ownership"));
    }

    #[tokio::test]
    async fn test_keyword_mode_records_keywords() {
        let r = retriever(25).await;
        let items = vec![label("How does borrowing work?", "Borrowing lends a reference without moving.")];
        let results = r.keyword(&items, &TermsExtractor::new(10)).await.unwrap();

        match &results[0].source {
            QuerySource::Keyword { keywords, .. } => {
                assert_eq!(keywords, &vec!["borrowing".to_string(), "work".to_string()])
            }
            other => panic!("unexpected source {:?}", other),
        }
        assert_eq!(results[0].predicted_ids()[0], items[0].chunk_id);
    }

    #[tokio::test]
    async fn test_keyword_mode_empty_keywords_is_a_miss() {
        let r = retriever(25).await;
        let items = vec![label("What is it?", "anything")];
        let results = r.keyword(&items, &TermsExtractor::new(10)).await.unwrap();
        assert!(results[0].results.is_empty());
    }

    #[tokio::test]
    async fn test_bm25_builds_index_and_tolerates_punctuation() {
        let r = retriever(25).await;
        let items = vec![
            label("Lifetimes: how long (exactly) does a \"borrow\" live?", "Lifetimes bound how long a borrow lives."),
            label("???", "nothing"),
        ];
        let results = r.bm25(&items).await.unwrap();
        assert_eq!(results[0].predicted_ids()[0], items[0].chunk_id);
        assert!(results[1].results.is_empty());
        match results[0].source {
            QuerySource::Bm25 { .. } => {}
            ref other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(RetrievalMode::Bm25.to_string(), "bm25");
        assert_eq!(RetrievalMode::Semantic.to_string(), "semantic");
    }
}
