//! Retrieval metrics: Recall@K, Precision@K, MRR and F1@K.
//!
//! Ids are compared as sets, so duplicates in `expected` count once.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Scores for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub recall_at_k: f64,
    pub precision_at_k: f64,
    pub mrr: f64,
    pub f1_at_k: f64,
    pub k: usize,
    /// The top-k ids that were scored.
    pub retrieved: Vec<String>,
    pub expected: Vec<String>,
    /// Top-k ids that are in `expected`, in rank order.
    pub hits: Vec<String>,
}

/// Mean scores across a query set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub avg_recall_at_k: f64,
    pub avg_precision_at_k: f64,
    pub avg_mrr: f64,
    pub avg_f1_at_k: f64,
    pub num_queries: usize,
    pub k: usize,
}

fn top_k<S: AsRef<str>>(retrieved: &[S], k: usize) -> &[S] {
    &retrieved[..k.min(retrieved.len())]
}

fn id_set<S: AsRef<str>>(ids: &[S]) -> HashSet<&str> {
    ids.iter().map(|s| s.as_ref()).collect()
}

/// Fraction of expected ids found in the top `k`. `1.0` when nothing is expected.
pub fn recall_at_k<S: AsRef<str>>(retrieved: &[S], expected: &[S], k: usize) -> f64 {
    let expected = id_set(expected);
    if expected.is_empty() {
        return 1.0;
    }
    let found = id_set(top_k(retrieved, k));
    found.intersection(&expected).count() as f64 / expected.len() as f64
}

/// Fraction of the top `k` that is relevant, over the results actually returned.
pub fn precision_at_k<S: AsRef<str>>(retrieved: &[S], expected: &[S], k: usize) -> f64 {
    let top = top_k(retrieved, k);
    if top.is_empty() {
        return 0.0;
    }
    let expected = id_set(expected);
    let hits = top.iter().filter(|r| expected.contains(r.as_ref())).count();
    hits as f64 / top.len() as f64
}

/// Reciprocal rank of the first relevant result anywhere in `retrieved`.
pub fn mrr<S: AsRef<str>>(retrieved: &[S], expected: &[S]) -> f64 {
    let expected = id_set(expected);
    retrieved
        .iter()
        .position(|r| expected.contains(r.as_ref()))
        .map(|i| 1.0 / (i + 1) as f64)
        .unwrap_or(0.0)
}

/// Harmonic mean of precision and recall at `k`.
pub fn f1_at_k<S: AsRef<str>>(retrieved: &[S], expected: &[S], k: usize) -> f64 {
    let p = precision_at_k(retrieved, expected, k);
    let r = recall_at_k(retrieved, expected, k);
    if p + r == 0.0 {
        return 0.0;
    }
    2.0 * p * r / (p + r)
}

pub fn evaluate_single_query<S: AsRef<str>>(retrieved: &[S], expected: &[S], k: usize) -> QueryMetrics {
    let top = top_k(retrieved, k);
    let expected_set = id_set(expected);

    QueryMetrics {
        recall_at_k: recall_at_k(retrieved, expected, k),
        precision_at_k: precision_at_k(retrieved, expected, k),
        mrr: mrr(retrieved, expected),
        f1_at_k: f1_at_k(retrieved, expected, k),
        k,
        retrieved: top.iter().map(|s| s.as_ref().to_string()).collect(),
        expected: expected.iter().map(|s| s.as_ref().to_string()).collect(),
        hits: top
            .iter()
            .filter(|r| expected_set.contains(r.as_ref()))
            .map(|s| s.as_ref().to_string())
            .collect(),
    }
}

/// Arithmetic means over `metrics`. `None` for an empty list.
pub fn aggregate_metrics(metrics: &[QueryMetrics]) -> Option<AggregateMetrics> {
    let first = metrics.first()?;
    let n = metrics.len() as f64;
    let mean = |f: fn(&QueryMetrics) -> f64| metrics.iter().map(f).sum::<f64>() / n;

    Some(AggregateMetrics {
        avg_recall_at_k: mean(|m| m.recall_at_k),
        avg_precision_at_k: mean(|m| m.precision_at_k),
        avg_mrr: mean(|m| m.mrr),
        avg_f1_at_k: mean(|m| m.f1_at_k),
        num_queries: metrics.len(),
        k: first.k,
    })
}
