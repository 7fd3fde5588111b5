//! Optional reranking stage.
//!
//! [`Reranker::rerank`] reorders each query's retrieved chunks using a
//! [`RerankProvider`]. The provider returns indices, best first; any
//! candidate it leaves out keeps its original relative order after the
//! returned ones, so reranking never adds or drops a chunk.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::future::try_join_all;

use rag_eval_core::models::QueryResult;
pub use rag_eval_core::providers::RerankProvider;

use crate::config::RerankConfig;
use crate::retry::{send_json, CallPolicy};

const COHERE_RERANK_URL: &str = "https://api.cohere.com/v1/rerank";

/// Cohere `/v1/rerank`. Requires the `COHERE_API_KEY` environment variable.
pub struct CohereReranker {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl CohereReranker {
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let api_key = std::env::var("COHERE_API_KEY")
            .map_err(|_| anyhow!("COHERE_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| COHERE_RERANK_URL.to_string()),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl RerankProvider for CohereReranker {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<usize>> {
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": documents.len(),
        });
        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body);
        let json = send_json(request, "Cohere").await?;
        parse_cohere_response(&json)
    }
}

fn parse_cohere_response(json: &serde_json::Value) -> Result<Vec<usize>> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow!("Invalid Cohere response: missing results array"))?;

    results
        .iter()
        .map(|r| {
            r.get("index")
                .and_then(|i| i.as_u64())
                .map(|i| i as usize)
                .ok_or_else(|| anyhow!("Invalid Cohere response: result without index"))
        })
        .collect()
}

pub fn create_reranker(config: &RerankConfig) -> Result<Arc<dyn RerankProvider>> {
    match config.provider.as_str() {
        "cohere" => Ok(Arc::new(CohereReranker::new(config)?)),
        "disabled" => bail!("Reranking requested but [rerank] provider is disabled"),
        other => bail!("Unknown rerank provider: {}", other),
    }
}

/// Reorder `items` by `order`, appending unmentioned items in their
/// original order.
///
/// Fails on an out-of-range or repeated index.
pub fn apply_permutation<T>(items: Vec<T>, order: &[usize]) -> Result<Vec<T>> {
    let len = items.len();
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(len);

    for &index in order {
        if index >= len {
            bail!("Rerank index {} out of range for {} candidates", index, len);
        }
        match slots[index].take() {
            Some(item) => out.push(item),
            None => bail!("Rerank index {} returned more than once", index),
        }
    }
    out.extend(slots.into_iter().flatten());
    Ok(out)
}

pub struct Reranker {
    provider: Arc<dyn RerankProvider>,
    policy: CallPolicy,
}

impl Reranker {
    pub fn new(provider: Arc<dyn RerankProvider>, policy: CallPolicy) -> Self {
        Self { provider, policy }
    }

    /// Rerank every query's results concurrently, keeping query order.
    pub async fn rerank(&self, results: Vec<QueryResult>) -> Result<Vec<QueryResult>> {
        tracing::info!(
            queries = results.len(),
            model = self.provider.model_name(),
            "reranking"
        );
        let calls = results
            .into_iter()
            .enumerate()
            .map(|(i, result)| self.rerank_one(i, result));
        try_join_all(calls).await
    }

    async fn rerank_one(&self, position: usize, result: QueryResult) -> Result<QueryResult> {
        if result.results.is_empty() {
            return Ok(result);
        }
        let documents: Vec<String> = result.results.iter().map(|c| c.text.clone()).collect();
        let question = result.source.question();
        let label = format!("rerank query {}", position + 1);

        let order = self
            .policy
            .run(&label, || self.provider.rerank(question, &documents))
            .await?;

        let QueryResult { source, results } = result;
        let results = apply_permutation(results, &order)
            .map_err(|e| anyhow!("{}: {}", label, e))?;
        Ok(QueryResult { source, results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rag_eval_core::models::{content_hash, QuerySource, TextChunk};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_apply_permutation_full() {
        let out = apply_permutation(vec!["a", "b", "c"], &[2, 0, 1]).unwrap();
        assert_eq!(out, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_apply_permutation_partial_appends_rest_in_order() {
        let out = apply_permutation(vec!["a", "b", "c", "d"], &[3]).unwrap();
        assert_eq!(out, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn test_apply_permutation_rejects_bad_indices() {
        assert!(apply_permutation(vec!["a", "b"], &[2]).is_err());
        assert!(apply_permutation(vec!["a", "b"], &[1, 1]).is_err());
    }

    #[test]
    fn test_parse_cohere_response() {
        let json = serde_json::json!({
            "results": [
                {"index": 2, "relevance_score": 0.9},
                {"index": 0, "relevance_score": 0.4},
            ]
        });
        assert_eq!(parse_cohere_response(&json).unwrap(), vec![2, 0]);
    }

    /// Ranks longer documents first.
    struct LongestFirst {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RerankProvider for LongestFirst {
        fn model_name(&self) -> &str {
            "longest-first"
        }
        async fn rerank(&self, _query: &str, documents: &[String]) -> Result<Vec<usize>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut order: Vec<usize> = (0..documents.len()).collect();
            order.sort_by_key(|&i| std::cmp::Reverse(documents[i].len()));
            Ok(order)
        }
    }

    fn chunk(text: &str) -> TextChunk {
        TextChunk {
            chunk_id: content_hash(text),
            doc_id: "d".to_string(),
            chunk_number: 1,
            text: text.to_string(),
            vector: None,
            post_title: "Post".to_string(),
            publish_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            source: "https://x".to_string(),
        }
    }

    fn result(question: &str, texts: &[&str]) -> QueryResult {
        QueryResult {
            source: QuerySource::Bm25 {
                question: question.to_string(),
                chunk_id: "c".to_string(),
            },
            results: texts.iter().map(|t| chunk(t)).collect(),
        }
    }

    #[tokio::test]
    async fn test_reranker_reorders_and_skips_empty_results() {
        let provider = Arc::new(LongestFirst {
            calls: AtomicUsize::new(0),
        });
        let reranker = Reranker::new(
            provider.clone(),
            CallPolicy::new(10, 1, Duration::ZERO),
        );

        let out = reranker
            .rerank(vec![
                result("q1", &["a", "ccc", "bb"]),
                result("q2", &[]),
                result("q3", &["x"]),
            ])
            .await
            .unwrap();

        let texts: Vec<&str> = out[0].results.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["ccc", "bb", "a"]);
        assert!(out[1].results.is_empty());
        assert_eq!(out[2].source.question(), "q3");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
