//! Ranking metrics for single-answer retrieval evaluation.
//!
//! Each labeled question has exactly one correct chunk id. A query's
//! predictions are the chunk ids it retrieved, in rank order.
//!
//! # Registry
//!
//! [`MetricRegistry`] holds one entry per `"<METRIC>@<K>"` pair, built once
//! from a list of base metrics and a list of cutoffs. Every entry is a plain
//! function pointer plus its cutoff; predictions are truncated to the first
//! K ids before the base function runs.
//!
//! # Not applicable values
//!
//! NDCG is undefined for an empty prediction list, so base metrics return
//! `Option<f64>`. Aggregation treats `None` as absent: the mean of
//! `[1.0, None, 0.0]` is `0.5`.
//!
//! ```rust
//! use rag_eval_core::metrics::{calculate_mrr, calculate_ndcg};
//!
//! assert_eq!(calculate_mrr("b", &["a", "b", "c"]), 0.5);
//! assert_eq!(calculate_ndcg("a", &[]), None);
//! ```

use std::str::FromStr;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::models::QueryResult;

/// Cutoffs used when none are configured.
pub const DEFAULT_CUTOFFS: &[usize] = &[3, 5, 10, 20];

/// Signature shared by every base metric.
pub type MetricFn = fn(&str, &[&str]) -> Option<f64>;

/// Reciprocal rank of the first occurrence of `chunk_id`, or 0 if absent.
pub fn calculate_mrr(chunk_id: &str, predictions: &[&str]) -> f64 {
    predictions
        .iter()
        .position(|p| *p == chunk_id)
        .map(|idx| 1.0 / (idx as f64 + 1.0))
        .unwrap_or(0.0)
}

/// 1 if `chunk_id` appears anywhere in `predictions`, else 0.
pub fn calculate_recall(chunk_id: &str, predictions: &[&str]) -> f64 {
    if predictions.contains(&chunk_id) {
        1.0
    } else {
        0.0
    }
}

/// Normalized discounted cumulative gain of the binary relevance vector.
///
/// Predictions are scored with a linearly decaying ideal (`1.0 … 0.0`), so
/// the ranking order is the prediction order.
/// `DCG = Σ rel_i / log2(i + 2)`; IDCG is the DCG of the relevance sorted
/// descending. Returns `None` for an empty list, and `1`/`0` for a single
/// prediction. If the ground truth is absent the score is `0`.
pub fn calculate_ndcg(chunk_id: &str, predictions: &[&str]) -> Option<f64> {
    match predictions {
        [] => None,
        [only] => Some(if *only == chunk_id { 1.0 } else { 0.0 }),
        _ => {
            let discount = |i: usize| 1.0 / ((i + 2) as f64).log2();

            let dcg: f64 = predictions
                .iter()
                .enumerate()
                .filter(|(_, p)| **p == chunk_id)
                .map(|(i, _)| discount(i))
                .sum();

            let relevant = predictions.iter().filter(|p| **p == chunk_id).count();
            let idcg: f64 = (0..relevant).map(discount).sum();

            if idcg == 0.0 {
                Some(0.0)
            } else {
                Some(dcg / idcg)
            }
        }
    }
}

/// A base metric, before a cutoff is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseMetric {
    Mrr,
    Ndcg,
    Recall,
}

impl BaseMetric {
    pub const ALL: [BaseMetric; 3] = [BaseMetric::Mrr, BaseMetric::Ndcg, BaseMetric::Recall];

    pub fn name(&self) -> &'static str {
        match self {
            BaseMetric::Mrr => "MRR",
            BaseMetric::Ndcg => "NDCG",
            BaseMetric::Recall => "Recall",
        }
    }

    pub fn func(&self) -> MetricFn {
        match self {
            BaseMetric::Mrr => |id, preds| Some(calculate_mrr(id, preds)),
            BaseMetric::Ndcg => calculate_ndcg,
            BaseMetric::Recall => |id, preds| Some(calculate_recall(id, preds)),
        }
    }
}

impl FromStr for BaseMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mrr" => Ok(BaseMetric::Mrr),
            "ndcg" => Ok(BaseMetric::Ndcg),
            "recall" => Ok(BaseMetric::Recall),
            _ => bail!("Unknown metric: '{}'. Use MRR, NDCG, or Recall.", s),
        }
    }
}

/// One `"<METRIC>@<K>"` registry entry.
#[derive(Debug, Clone)]
pub struct RegisteredMetric {
    pub name: String,
    pub k: usize,
    func: MetricFn,
}

impl RegisteredMetric {
    pub fn new(metric: BaseMetric, k: usize) -> Self {
        Self {
            name: format!("{}@{}", metric.name(), k),
            k,
            func: metric.func(),
        }
    }

    /// Score the first `k` predictions.
    pub fn evaluate(&self, chunk_id: &str, predictions: &[&str]) -> Option<f64> {
        let cut = &predictions[..predictions.len().min(self.k)];
        (self.func)(chunk_id, cut)
    }
}

/// Ordered set of registered metrics.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    metrics: Vec<RegisteredMetric>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new(&BaseMetric::ALL, DEFAULT_CUTOFFS)
    }
}

impl MetricRegistry {
    /// Register every `(metric, cutoff)` pair, metric-major.
    pub fn new(metrics: &[BaseMetric], cutoffs: &[usize]) -> Self {
        let metrics = metrics
            .iter()
            .flat_map(|m| cutoffs.iter().map(move |&k| RegisteredMetric::new(*m, k)))
            .collect();
        Self { metrics }
    }

    pub fn metrics(&self) -> &[RegisteredMetric] {
        &self.metrics
    }

    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Score one ranked prediction list against its ground truth.
    pub fn score_ids(&self, chunk_id: &str, predictions: &[&str]) -> QueryScore {
        QueryScore {
            chunk_id: chunk_id.to_string(),
            result_count: predictions.len(),
            scores: self
                .metrics
                .iter()
                .map(|m| MetricValue {
                    metric: m.name.clone(),
                    value: m.evaluate(chunk_id, predictions),
                })
                .collect(),
        }
    }

    /// Score a retrieval result.
    pub fn score(&self, result: &QueryResult) -> QueryScore {
        self.score_ids(result.source.chunk_id(), &result.predicted_ids())
    }

    /// Per-metric means across a run, skipping not-applicable values.
    pub fn aggregate(&self, scores: &[QueryScore]) -> EvaluationSummary {
        let means = self
            .metrics
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let values: Vec<Option<f64>> = scores
                    .iter()
                    .map(|s| s.scores.get(i).and_then(|v| v.value))
                    .collect();
                MetricMean {
                    metric: m.name.clone(),
                    mean: mean_ignoring_na(&values),
                    count: values.iter().flatten().count(),
                }
            })
            .collect();

        EvaluationSummary {
            query_count: scores.len(),
            means,
        }
    }
}

/// Arithmetic mean of the `Some` values, or `None` if there are none.
pub fn mean_ignoring_na(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

/// Value of one registered metric for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub metric: String,
    pub value: Option<f64>,
}

/// All metric values for one labeled query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryScore {
    pub chunk_id: String,
    pub result_count: usize,
    pub scores: Vec<MetricValue>,
}

impl QueryScore {
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| s.metric == metric)
            .and_then(|s| s.value)
    }
}

/// Mean of one metric across a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricMean {
    pub metric: String,
    pub mean: Option<f64>,
    /// Number of queries that contributed a value.
    pub count: usize,
}

/// Aggregated metric means for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub query_count: usize,
    pub means: Vec<MetricMean>,
}

impl EvaluationSummary {
    pub fn mean(&self, metric: &str) -> Option<f64> {
        self.means
            .iter()
            .find(|m| m.metric == metric)
            .and_then(|m| m.mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_mrr() {
        assert_eq!(calculate_mrr("a", &[]), 0.0);
        assert_eq!(calculate_mrr("a", &["a"]), 1.0);
        assert_eq!(calculate_mrr("a", &["x", "a", "y"]), 0.5);
        assert_eq!(calculate_mrr("a", &["x", "y", "z"]), 0.0);
        // First occurrence wins.
        assert_eq!(calculate_mrr("a", &["x", "a", "a"]), 0.5);
    }

    #[test]
    fn test_ndcg_degenerate_cases() {
        assert_eq!(calculate_ndcg("a", &[]), None);
        assert_eq!(calculate_ndcg("a", &["a"]), Some(1.0));
        assert_eq!(calculate_ndcg("a", &["x"]), Some(0.0));
    }

    #[test]
    fn test_ndcg_positions() {
        assert_eq!(calculate_ndcg("a", &["a", "x", "y"]), Some(1.0));
        assert_eq!(calculate_ndcg("a", &["x", "y", "z"]), Some(0.0));

        let second = calculate_ndcg("a", &["x", "a", "y"]).unwrap();
        assert!(approx(second, 1.0 / 3f64.log2()));

        let third = calculate_ndcg("a", &["x", "y", "a"]).unwrap();
        assert!(approx(third, 0.5));
        assert!(third < second);
    }

    #[test]
    fn test_ndcg_repeated_ground_truth() {
        // Two relevant entries: DCG = 1/log2(2) + 1/log2(4), IDCG = 1 + 1/log2(3)
        let score = calculate_ndcg("a", &["a", "x", "a"]).unwrap();
        assert!(approx(score, 1.5 / (1.0 + 1.0 / 3f64.log2())));
    }

    #[test]
    fn test_recall_at_k() {
        let preds = ["x", "y", "a", "z"];
        let registry = MetricRegistry::new(&[BaseMetric::Recall], &[1, 2, 3, 10]);
        let score = registry.score_ids("a", &preds);
        assert_eq!(score.get("Recall@1"), Some(0.0));
        assert_eq!(score.get("Recall@2"), Some(0.0));
        assert_eq!(score.get("Recall@3"), Some(1.0));
        assert_eq!(score.get("Recall@10"), Some(1.0));
    }

    #[test]
    fn test_cutoff_truncates_before_scoring() {
        let registry = MetricRegistry::new(&[BaseMetric::Mrr, BaseMetric::Ndcg], &[2, 5]);
        let score = registry.score_ids("a", &["x", "y", "a"]);
        assert_eq!(score.get("MRR@2"), Some(0.0));
        assert!(approx(score.get("MRR@5").unwrap(), 1.0 / 3.0));
        assert_eq!(score.get("NDCG@2"), Some(0.0));
        assert!(approx(score.get("NDCG@5").unwrap(), 0.5));
        assert_eq!(score.result_count, 3);
    }

    #[test]
    fn test_registry_names_metric_major() {
        let registry = MetricRegistry::new(&[BaseMetric::Mrr, BaseMetric::Ndcg], &[3, 10]);
        assert_eq!(registry.names(), ["MRR@3", "MRR@10", "NDCG@3", "NDCG@10"]);
        assert_eq!(MetricRegistry::default().len(), 12);
    }

    #[test]
    fn test_base_metric_from_str() {
        assert_eq!("mrr".parse::<BaseMetric>().unwrap(), BaseMetric::Mrr);
        assert_eq!("NDCG".parse::<BaseMetric>().unwrap(), BaseMetric::Ndcg);
        assert_eq!("Recall".parse::<BaseMetric>().unwrap(), BaseMetric::Recall);
        assert!("map".parse::<BaseMetric>().is_err());
    }

    #[test]
    fn test_mean_ignores_not_applicable() {
        assert_eq!(mean_ignoring_na(&[Some(1.0), None, Some(0.0)]), Some(0.5));
        assert_eq!(mean_ignoring_na(&[None, None]), None);
        assert_eq!(mean_ignoring_na(&[]), None);
    }

    #[test]
    fn test_aggregate_skips_empty_result_ndcg() {
        let registry = MetricRegistry::new(&[BaseMetric::Mrr, BaseMetric::Ndcg], &[10]);
        let scores = vec![
            registry.score_ids("a", &["a", "b"]),
            registry.score_ids("a", &[]),
            registry.score_ids("a", &["b", "c"]),
        ];
        let summary = registry.aggregate(&scores);
        assert_eq!(summary.query_count, 3);
        // NDCG: [1, N/A, 0] -> 0.5 over two contributing queries
        assert_eq!(summary.mean("NDCG@10"), Some(0.5));
        assert_eq!(summary.means[1].count, 2);
        // MRR is always defined: [1, 0, 0]
        assert!(approx(summary.mean("MRR@10").unwrap(), 1.0 / 3.0));
    }

    #[test]
    fn test_unmatched_label_scores_zero_everywhere() {
        let registry = MetricRegistry::default();
        let score = registry.score_ids("missing", &["a", "b", "c", "d"]);
        for m in registry.metrics() {
            assert_eq!(score.get(&m.name), Some(0.0), "{}", m.name);
        }
    }
}
