//! Synthetic label generation.
//!
//! Chunks a folder exactly as `ingest` does, then asks a chat model for one
//! question/answer pair per chunk. Calls fan out under the shared
//! [`CallPolicy`]; the labels come back in chunk order and are written as a
//! pretty-printed JSON array that `rag-eval evaluate` reads directly.
//!
//! Chunk ids are content hashes, so the labels only match an index built
//! with the same chunking settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;

use rag_eval_core::chunk::chunk_documents;
use rag_eval_core::models::{EvaluationDataItem, QuestionAnswerPair, TextChunk};
pub use rag_eval_core::providers::QuestionGenerator;

use crate::config::{Config, GenerationConfig};
use crate::documents::read_documents;
use crate::retry::{send_json, CallPolicy};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a world class algorithm that excels at generating great \
questions that can only be answered by a specific text that will soon be passed to you. \
Think step by step, then respond with JSON of the form \
{\"chain_of_thought\": \"...\", \"question\": \"...\", \"answer\": \"...\"}.";

/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIQuestionGenerator {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIQuestionGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
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
            api_key,
            client,
        })
    }

    fn request_body(&self, chunk_text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {
                    "role": "user",
                    "content": format!(
                        "Generate a question and answer pair that uses information and \
                         content specific to the following text chunk, including a chain \
                         of thought:\n\n{}",
                        chunk_text
                    ),
                },
            ],
        })
    }
}

#[async_trait]
impl QuestionGenerator for OpenAIQuestionGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, chunk_text: &str) -> Result<QuestionAnswerPair> {
        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(chunk_text));
        let json = send_json(request, "OpenAI").await?;
        parse_question_response(&json)
    }
}

/// Read `{"question", "answer"}` out of the first choice's message content.
/// `chain_of_thought` is accepted and dropped.
fn parse_question_response(json: &serde_json::Value) -> Result<QuestionAnswerPair> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing message content"))?;

    let pair: QuestionAnswerPair =
        serde_json::from_str(content).context("Question response is not a question/answer object")?;
    if pair.question.trim().is_empty() {
        bail!("Question response has an empty question");
    }
    Ok(pair)
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn QuestionGenerator>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIQuestionGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// One label per chunk, in chunk order.
pub async fn generate_labels(
    chunks: &[TextChunk],
    generator: &dyn QuestionGenerator,
    policy: &CallPolicy,
) -> Result<Vec<EvaluationDataItem>> {
    let total = chunks.len();
    tracing::info!(chunks = total, model = generator.model_name(), "generating questions");

    let calls = chunks.iter().enumerate().map(|(i, chunk)| async move {
        let label = format!("question for chunk {}/{}", i + 1, total);
        let pair = policy.run(&label, || generator.generate(&chunk.text)).await?;
        Ok::<_, anyhow::Error>(pair.into_label(chunk))
    });

    try_join_all(calls).await
}

/// The output must be a `.json` file in an existing directory.
pub fn check_output_path(path: &Path) -> Result<()> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        bail!("The output file must have a .json extension: {}", path.display());
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        bail!("The directory {} does not exist", parent.display());
    }
    Ok(())
}

pub fn write_labels(path: &Path, labels: &[EvaluationDataItem]) -> Result<()> {
    let json = serde_json::to_string_pretty(labels)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write labels: {}", path.display()))
}

/// Options for the `generate` command.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub folder: PathBuf,
    pub suffix: String,
    pub strategy: Option<String>,
    /// Only the first `n` chunks get a question.
    pub max_questions: Option<usize>,
    pub output: PathBuf,
}

pub async fn run_generate(config: &Config, options: &GenerateOptions) -> Result<()> {
    check_output_path(&options.output)?;
    if options.max_questions == Some(0) {
        bail!("--max-questions must be >= 1");
    }

    let params = config.chunking.params(options.strategy.as_deref())?;
    let docs = read_documents(&options.folder, &options.suffix)?;
    let mut chunks = chunk_documents(&docs, &params)?;
    if let Some(max) = options.max_questions {
        chunks.truncate(max);
    }

    let generator = create_generator(&config.generation)?;
    let policy = CallPolicy::from_config(&config.retry);
    let labels = generate_labels(&chunks, generator.as_ref(), &policy).await?;
    write_labels(&options.output, &labels)?;

    println!("generate {}", options.folder.display());
    println!("  documents read:    {}", docs.len());
    println!("  questions written: {}", labels.len());
    println!("  output:            {}", options.output.display());
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_eval_core::chunk::{ChunkParams, ChunkStrategy};
    use rag_eval_core::frontmatter::parse_document;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Asks "what about <first word>?" and answers with the whole chunk.
    /// The first chunk is slowest so out-of-order completion shows up.
    struct EchoGenerator {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QuestionGenerator for EchoGenerator {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, chunk_text: &str) -> Result<QuestionAnswerPair> {
            if chunk_text.starts_with("Alpha") {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            self.seen.lock().unwrap().push(chunk_text.to_string());
            let first = chunk_text.split_whitespace().next().unwrap_or("");
            Ok(QuestionAnswerPair {
                question: format!("what about {}?", first.trim_end_matches('.')),
                answer: chunk_text.to_string(),
            })
        }
    }

    struct FlakyGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuestionGenerator for FlakyGenerator {
        fn model_name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, _chunk_text: &str) -> Result<QuestionAnswerPair> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                bail!("rate limited");
            }
            Ok(QuestionAnswerPair {
                question: "q".into(),
                answer: "a".into(),
            })
        }
    }

    fn chunks() -> Vec<TextChunk> {
        let doc = parse_document(
            "---\ntitle: Greek\ndate: 2022-05\nurl: https://g\n---\nAlpha first.\n\nBeta second.\n\nGamma third.",
            "greek.md",
        )
        .unwrap();
        let params = ChunkParams {
            strategy: ChunkStrategy::Structural,
            ..ChunkParams::default()
        };
        chunk_documents(&[doc], &params).unwrap()
    }

    #[tokio::test]
    async fn test_labels_follow_chunk_order() {
        let chunks = chunks();
        let generator = EchoGenerator {
            seen: Mutex::new(Vec::new()),
        };
        let policy = CallPolicy::new(4, 1, Duration::ZERO);

        let labels = generate_labels(&chunks, &generator, &policy).await.unwrap();

        let questions: Vec<&str> = labels.iter().map(|l| l.question.as_str()).collect();
        assert_eq!(
            questions,
            vec!["what about Alpha?", "what about Beta?", "what about Gamma?"]
        );
        for (label, chunk) in labels.iter().zip(&chunks) {
            assert_eq!(label.chunk_id, chunk.chunk_id);
            assert_eq!(label.chunk, chunk.text);
        }
        // Alpha sleeps, so it finishes last.
        assert_eq!(generator.seen.lock().unwrap().last().unwrap(), "Alpha first.");
    }

    #[tokio::test]
    async fn test_transient_generation_failure_is_retried() {
        let chunks = chunks();
        let generator = FlakyGenerator {
            calls: AtomicUsize::new(0),
        };
        let policy = CallPolicy::new(1, 2, Duration::ZERO);

        let labels = generate_labels(&chunks[..1], &generator, &policy)
            .await
            .unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_names_the_chunk() {
        let chunks = chunks();
        let generator = FlakyGenerator {
            calls: AtomicUsize::new(0),
        };
        let policy = CallPolicy::new(1, 1, Duration::ZERO);

        let err = generate_labels(&chunks[..1], &generator, &policy)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("question for chunk 1/1: failed after 1 attempts"));
    }

    #[test]
    fn test_output_path_checks() {
        let tmp = TempDir::new().unwrap();
        assert!(check_output_path(&tmp.path().join("labels.json")).is_ok());
        assert!(check_output_path(Path::new("labels.json")).is_ok());

        let err = check_output_path(&tmp.path().join("labels.jsonl")).unwrap_err();
        assert!(err.to_string().contains(".json extension"));

        let err = check_output_path(&tmp.path().join("missing/labels.json")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_written_labels_load_for_evaluation() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("labels.json");
        let chunks = chunks();
        let generator = EchoGenerator {
            seen: Mutex::new(Vec::new()),
        };
        let labels = generate_labels(&chunks[..2], &generator, &CallPolicy::new(2, 1, Duration::ZERO))
            .await
            .unwrap();

        write_labels(&path, &labels).unwrap();

        assert!(std::fs::read_to_string(&path).unwrap().contains("\n  {"));
        let loaded = crate::evaluate::load_labels(&path).unwrap();
        assert_eq!(loaded, labels);
    }

    #[test]
    fn test_parse_question_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"content":
                "{\"chain_of_thought\": \"the chunk names a date\", \"question\": \"When?\", \"answer\": \"May.\"}"
            }}]
        });
        let pair = parse_question_response(&json).unwrap();
        assert_eq!(pair.question, "When?");
        assert_eq!(pair.answer, "May.");

        let empty = serde_json::json!({
            "choices": [{"message": {"content": "{\"question\": \" \", \"answer\": \"x\"}"}}]
        });
        assert!(parse_question_response(&empty).is_err());
        assert!(parse_question_response(&serde_json::json!({"choices": []})).is_err());
    }
}
