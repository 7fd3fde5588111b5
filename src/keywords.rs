//! Keyword extraction for keyword-mode retrieval.
//!
//! - **[`TermsExtractor`]**: offline. The question's own terms minus stop words.
//! - **[`OpenAIKeywordExtractor`]**: asks a chat model for synonyms and
//!   acronym expansions, then merges in the question's own terms.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

pub use rag_eval_core::providers::KeywordExtractor;
use rag_eval_core::terms::query_terms;

use crate::config::KeywordsConfig;
use crate::retry::send_json;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct TermsExtractor {
    max_keywords: usize,
}

impl TermsExtractor {
    pub fn new(max_keywords: usize) -> Self {
        Self { max_keywords }
    }
}

#[async_trait]
impl KeywordExtractor for TermsExtractor {
    async fn extract(&self, question: &str) -> Result<Vec<String>> {
        let mut terms = query_terms(question);
        terms.truncate(self.max_keywords);
        Ok(terms)
    }
}

/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIKeywordExtractor {
    model: String,
    url: String,
    max_keywords: usize,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIKeywordExtractor {
    pub fn new(config: &KeywordsConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            max_keywords: config.max_keywords,
            api_key,
            client,
        })
    }

    fn request_body(&self, question: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "You generate search keywords for a full-text index. Given a question, \
                         return up to {} short keywords or phrases likely to appear in a passage \
                         that answers it, including synonyms and expansions of any acronyms. \
                         Respond with JSON of the form {{\"keywords\": [\"...\"]}}.",
                        self.max_keywords
                    ),
                },
                {"role": "user", "content": question},
            ],
        })
    }
}

#[async_trait]
impl KeywordExtractor for OpenAIKeywordExtractor {
    async fn extract(&self, question: &str) -> Result<Vec<String>> {
        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(question));
        let json = send_json(request, "OpenAI").await?;

        let mut keywords = parse_keywords_response(&json)?;
        keywords.truncate(self.max_keywords);
        Ok(merge_keywords(keywords, query_terms(question)))
    }
}

/// Read `{"keywords": [...]}` out of the first choice's message content.
fn parse_keywords_response(json: &serde_json::Value) -> Result<Vec<String>> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing message content"))?;

    let parsed: serde_json::Value =
        serde_json::from_str(content).context("Keyword response is not valid JSON")?;
    let keywords = parsed
        .get("keywords")
        .and_then(|k| k.as_array())
        .ok_or_else(|| anyhow!("Keyword response is missing a keywords array"))?;

    Ok(keywords
        .iter()
        .filter_map(|k| k.as_str())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect())
}

/// Concatenate, dropping case-insensitive duplicates. First spelling wins.
fn merge_keywords(primary: Vec<String>, extra: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for keyword in primary.into_iter().chain(extra) {
        if !merged.iter().any(|m| m.eq_ignore_ascii_case(&keyword)) {
            merged.push(keyword);
        }
    }
    merged
}

pub fn create_extractor(config: &KeywordsConfig) -> Result<Arc<dyn KeywordExtractor>> {
    match config.provider.as_str() {
        "terms" => Ok(Arc::new(TermsExtractor::new(config.max_keywords))),
        "openai" => Ok(Arc::new(OpenAIKeywordExtractor::new(config)?)),
        other => anyhow::bail!("Unknown keywords provider: {}", other),
    }
}
