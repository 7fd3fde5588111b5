//! Evaluation orchestrator.
//!
//! One run: load labels → retrieve with the chosen mode → optionally
//! rerank → score every query with the metric registry → aggregate.
//! Every labeled question stays in the run; a label whose chunk id is not
//! in the index simply scores zero.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use rag_eval_core::metrics::{EvaluationSummary, MetricRegistry, QueryScore};
use rag_eval_core::models::{EvaluationDataItem, QueryResult};
use rag_eval_core::providers::KeywordExtractor;

use crate::config::Config;
use crate::db;
use crate::embed::Embedder;
use crate::embedding::create_provider;
use crate::keywords::create_extractor;
use crate::rerank::{create_reranker, Reranker};
use crate::retrieval::{RetrievalMode, Retriever};
use crate::retry::CallPolicy;
use crate::sqlite_store::SqliteStore;

/// Read labeled questions from a `.jsonl` or `.json` file.
///
/// JSONL files hold one object per line; blank lines are skipped and a bad
/// line is reported with its 1-based line number. JSON files hold an array.
pub fn load_labels(path: &Path) -> Result<Vec<EvaluationDataItem>> {
    if !path.exists() {
        bail!("Label file not found: {}", path.display());
    }
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read label file: {}", path.display()))?;

    match extension {
        "jsonl" => parse_jsonl_labels(&content, path),
        "json" => serde_json::from_str(&content)
            .with_context(|| format!("{}: expected a JSON array of labels", path.display())),
        _ => bail!(
            "Label file must have a .jsonl or .json extension: {}",
            path.display()
        ),
    }
}

fn parse_jsonl_labels(content: &str, path: &Path) -> Result<Vec<EvaluationDataItem>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid label", path.display(), i + 1))
        })
        .collect()
}

/// Per-query scores and per-metric means for one run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub mode: String,
    pub reranked: bool,
    pub limit: usize,
    pub metrics: Vec<String>,
    pub queries: Vec<QueryScore>,
    pub summary: EvaluationSummary,
}

/// Composes retrieval, reranking and scoring.
///
/// Stages a mode does not use may be left unset; asking for a mode whose
/// stage is missing is an error.
pub struct Evaluator {
    retriever: Retriever,
    registry: MetricRegistry,
    embedder: Option<Embedder>,
    extractor: Option<Arc<dyn KeywordExtractor>>,
    reranker: Option<Reranker>,
}

impl Evaluator {
    pub fn new(retriever: Retriever, registry: MetricRegistry) -> Self {
        Self {
            retriever,
            registry,
            embedder: None,
            extractor: None,
            reranker: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Embedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn KeywordExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Retrieve (and rerank, if configured) without scoring.
    pub async fn retrieve(
        &self,
        items: &[EvaluationDataItem],
        mode: RetrievalMode,
    ) -> Result<Vec<QueryResult>> {
        tracing::info!(queries = items.len(), %mode, limit = self.retriever.limit(), "retrieving");
        let results = match mode {
            RetrievalMode::Semantic => {
                let embedder = match &self.embedder {
                    Some(e) => e,
                    None => bail!("Semantic mode requires an embedding provider"),
                };
                let embedded = embedder.embed_questions(items).await?;
                self.retriever.semantic(&embedded).await?
            }
            RetrievalMode::Keyword => {
                let extractor = match &self.extractor {
                    Some(x) => x,
                    None => bail!("Keyword mode requires a keyword extractor"),
                };
                self.retriever.keyword(items, extractor.as_ref()).await?
            }
            RetrievalMode::Bm25 => self.retriever.bm25(items).await?,
        };

        match &self.reranker {
            Some(reranker) => reranker.rerank(results).await,
            None => Ok(results),
        }
    }

    pub async fn run(
        &self,
        items: &[EvaluationDataItem],
        mode: RetrievalMode,
    ) -> Result<EvaluationReport> {
        let results = self.retrieve(items, mode).await?;
        let queries: Vec<QueryScore> = results.iter().map(|r| self.registry.score(r)).collect();
        let summary = self.registry.aggregate(&queries);

        Ok(EvaluationReport {
            mode: mode.to_string(),
            reranked: self.reranker.is_some(),
            limit: self.retriever.limit(),
            metrics: self.registry.names().iter().map(|n| n.to_string()).collect(),
            queries,
            summary,
        })
    }
}

/// Options for the `evaluate` command.
#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    pub labels: PathBuf,
    pub mode: RetrievalMode,
    pub rerank: bool,
    pub limit: Option<usize>,
    pub json: Option<PathBuf>,
}

/// Run the `evaluate` command against the configured SQLite index.
pub async fn run_evaluate(config: &Config, options: &EvaluateOptions) -> Result<()> {
    let items = load_labels(&options.labels)?;
    if let Some(json) = &options.json {
        if let Some(parent) = json.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                bail!("Report directory does not exist: {}", parent.display());
            }
        }
    }
    let limit = options.limit.unwrap_or(config.retrieval.limit);
    if limit == 0 {
        bail!("--limit must be >= 1");
    }
    let registry = config.evaluation.registry()?;
    let policy = CallPolicy::from_config(&config.retry);

    let pool = db::connect_existing(config).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let retriever = Retriever::new(store, policy.clone(), limit);
    let mut evaluator = Evaluator::new(retriever, registry);

    match options.mode {
        RetrievalMode::Semantic => {
            if !config.embedding.is_enabled() {
                bail!("Semantic mode requires an embedding provider. Set [embedding] provider in the config.");
            }
            let provider = create_provider(&config.embedding)?;
            evaluator = evaluator.with_embedder(Embedder::new(
                provider,
                policy.clone(),
                config.embedding.batch_size,
            ));
        }
        RetrievalMode::Keyword => {
            evaluator = evaluator.with_extractor(create_extractor(&config.keywords)?);
        }
        RetrievalMode::Bm25 => {}
    }
    if options.rerank {
        let provider = create_reranker(&config.rerank)?;
        evaluator = evaluator.with_reranker(Reranker::new(provider, policy.clone()));
    }

    let report = evaluator.run(&items, options.mode).await?;
    print_report(&report);

    if let Some(path) = &options.json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    pool.close().await;
    Ok(())
}

fn format_score(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "-".to_string(),
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

pub fn print_report(report: &EvaluationReport) {
    println!(
        "Evaluation: mode={}{} limit={} queries={}",
        report.mode,
        if report.reranked { " +rerank" } else { "" },
        report.limit,
        report.summary.query_count
    );
    println!();

    let width = report
        .metrics
        .iter()
        .map(|m| m.len())
        .max()
        .unwrap_or(0)
        .max(7);

    let mut header = format!("  {:<14}", "CHUNK_ID");
    for metric in &report.metrics {
        header.push_str(&format!(" {:>width$}", metric, width = width));
    }
    println!("{}", header);
    println!("  {}", "-".repeat(header.len() - 2));

    for query in &report.queries {
        let mut line = format!("  {:<14}", short_id(&query.chunk_id));
        for value in &query.scores {
            line.push_str(&format!(" {:>width$}", format_score(value.value), width = width));
        }
        println!("{}", line);
    }

    println!("  {}", "-".repeat(header.len() - 2));
    let mut line = format!("  {:<14}", "MEAN");
    for mean in &report.summary.means {
        line.push_str(&format!(" {:>width$}", format_score(mean.mean), width = width));
    }
    println!("{}", line);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_jsonl_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "labels.jsonl",
            "{\"question\":\"q1\",\"answer\":\"a\",\"chunk\":\"c\",\"chunk_id\":\"id1\"}\n\n{\"question\":\"q2\",\"chunk_id\":\"id2\"}\n",
        );
        let items = load_labels(&path).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].question, "q2");
        assert_eq!(items[1].answer, "");
    }

    #[test]
    fn test_load_jsonl_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "labels.jsonl",
            "{\"question\":\"q1\",\"chunk_id\":\"id1\"}\n\n{\"question\":\"missing id\"}\n",
        );
        let err = load_labels(&path).unwrap_err();
        assert!(err.to_string().contains("labels.jsonl:3"), "{}", err);
    }

    #[test]
    fn test_load_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "labels.json",
            "[{\"question\":\"q\",\"answer\":\"a\",\"chunk\":\"c\",\"chunk_id\":\"id\"}]",
        );
        assert_eq!(load_labels(&path).unwrap()[0].chunk_id, "id");
    }

    #[test]
    fn test_load_labels_rejects_bad_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.jsonl");
        assert!(load_labels(&missing)
            .unwrap_err()
            .to_string()
            .contains("not found"));

        let csv = write_file(dir.path(), "labels.csv", "question,chunk_id\n");
        assert!(load_labels(&csv)
            .unwrap_err()
            .to_string()
            .contains(".jsonl or .json"));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("abcdef0123456789"), "abcdef012345");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(Some(0.5)), "0.500");
        assert_eq!(format_score(None), "-");
    }
}
