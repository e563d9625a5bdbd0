//! Runs every strategy over a query set and reports the scores.

use super::metrics::{AggregateMetrics, QueryMetrics, aggregate_metrics, evaluate_single_query};
use super::queries::{QueryCategory, QuerySet};
use crate::strategy::{Strategy, StrategyRunner};
use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

/// Configuration for an evaluation run.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Results retrieved and scored per query.
    pub k: usize,
    /// Strategies to run, in order.
    pub strategies: Vec<Strategy>,
    /// Maximum queries to evaluate (for quick testing).
    pub max_queries: Option<usize>,
    /// Print every query's scores.
    pub verbose: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            k: 5,
            strategies: Strategy::ALL.to_vec(),
            max_queries: None,
            verbose: false,
        }
    }
}

/// Outcome of one query under one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub category: QueryCategory,
    /// Text the search actually ran on. Absent when retrieval failed.
    pub effective_query: Option<String>,
    pub metrics: QueryMetrics,
    pub time_ms: u64,
    /// Retrieval error; the query was scored as if nothing came back.
    pub error: Option<String>,
}

/// Scores of one strategy over the whole query set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyReport {
    pub strategy: Strategy,
    pub name: String,
    pub aggregate: Option<AggregateMetrics>,
    pub by_category: BTreeMap<QueryCategory, AggregateMetrics>,
    pub avg_time_ms: f64,
    pub errors: usize,
    pub per_query: Vec<QueryResult>,
}

impl StrategyReport {
    pub fn from_results(strategy: Strategy, per_query: Vec<QueryResult>) -> Self {
        let all: Vec<QueryMetrics> = per_query.iter().map(|r| r.metrics.clone()).collect();

        let mut grouped: BTreeMap<QueryCategory, Vec<QueryMetrics>> = BTreeMap::new();
        for result in &per_query {
            grouped
                .entry(result.category)
                .or_default()
                .push(result.metrics.clone());
        }
        let by_category = grouped
            .into_iter()
            .filter_map(|(category, metrics)| aggregate_metrics(&metrics).map(|m| (category, m)))
            .collect();

        let avg_time_ms = if per_query.is_empty() {
            0.0
        } else {
            per_query.iter().map(|r| r.time_ms as f64).sum::<f64>() / per_query.len() as f64
        };

        Self {
            strategy,
            name: strategy.display_name().to_string(),
            aggregate: aggregate_metrics(&all),
            by_category,
            avg_time_ms,
            errors: per_query.iter().filter(|r| r.error.is_some()).count(),
            per_query,
        }
    }

    /// Mean Recall@K, `0.0` when no query was scored.
    pub fn recall(&self) -> f64 {
        self.aggregate.as_ref().map_or(0.0, |a| a.avg_recall_at_k)
    }
}

/// Complete output of an evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResults {
    /// `YYYYMMDD_HHMMSS`, local time.
    pub timestamp: String,
    pub repo_path: String,
    pub query_set: String,
    pub k: usize,
    pub num_queries: usize,
    pub strategies: Vec<StrategyReport>,
    pub total_time_secs: f64,
}

impl EvalResults {
    /// Strategies by mean recall, best first. Ties keep run order.
    pub fn ranked(&self) -> Vec<&StrategyReport> {
        let mut ranked: Vec<&StrategyReport> = self.strategies.iter().collect();
        ranked.sort_by(|a, b| b.recall().total_cmp(&a.recall()));
        ranked
    }

    pub fn report(&self, strategy: Strategy) -> Option<&StrategyReport> {
        self.strategies.iter().find(|r| r.strategy == strategy)
    }

    /// Best strategy and its recall gain over the baseline, in percent.
    ///
    /// `None` when the baseline wins, was not run, or scored zero.
    pub fn improvement_over_baseline(&self) -> Option<(String, f64)> {
        let baseline = self.report(Strategy::Baseline)?.recall();
        let best = *self.ranked().first()?;

        if best.strategy == Strategy::Baseline || baseline <= 0.0 {
            return None;
        }
        Some((
            best.name.clone(),
            (best.recall() - baseline) / baseline * 100.0,
        ))
    }

    /// Print summary to stdout.
    pub fn print_summary(&self) {
        let k = self.k;
        println!();
        println!(
            "{}",
            format!("Retrieval Strategy Comparison (K={})", k).bold()
        );
        println!(
            "{:<30} {:>10} {:>13} {:>8} {:>8}",
            "Strategy",
            format!("Recall@{}", k),
            format!("Precision@{}", k),
            "MRR",
            format!("F1@{}", k)
        );
        println!("{}", "-".repeat(73));

        for (i, report) in self.ranked().into_iter().enumerate() {
            let line = match &report.aggregate {
                Some(a) => format!(
                    "{:<30} {:>10.3} {:>13.3} {:>8.3} {:>8.3}",
                    report.name, a.avg_recall_at_k, a.avg_precision_at_k, a.avg_mrr, a.avg_f1_at_k
                ),
                None => format!("{:<30} {:>10}", report.name, "n/a"),
            };
            if i == 0 {
                println!("{}", line.green().bold());
            } else {
                println!("{}", line);
            }
            if report.errors > 0 {
                println!("  {}", format!("{} queries failed", report.errors).yellow());
            }
        }

        self.print_category_breakdown();

        if let Some((best, improvement)) = self.improvement_over_baseline() {
            println!();
            println!("{}", format!("Best: {}", best).bold());
            println!(
                "{}",
                format!("{:+.1}% recall over baseline", improvement).green()
            );
        }
    }

    fn print_category_breakdown(&self) {
        println!();
        println!("{}", format!("Recall@{} by category", self.k).bold());

        let mut header = format!("{:<18}", "Category");
        for report in &self.strategies {
            header.push_str(&format!(" {:>14}", short_name(report.strategy)));
        }
        println!("{}", header);

        for category in QueryCategory::ALL {
            if self
                .strategies
                .iter()
                .all(|r| !r.by_category.contains_key(&category))
            {
                continue;
            }
            let mut row = format!("{:<18}", category.as_str());
            for report in &self.strategies {
                match report.by_category.get(&category) {
                    Some(m) => row.push_str(&format!(" {:>14.3}", m.avg_recall_at_k)),
                    None => row.push_str(&format!(" {:>14}", "-")),
                }
            }
            println!("{}", row);
        }
    }

    /// Write `eval_<timestamp>.json` into `dir` and return its path.
    pub fn save_json(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        let path = dir.join(format!("eval_{}.json", self.timestamp));
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}

fn short_name(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Baseline => "Baseline",
        Strategy::QueryExpansion => "QE",
        Strategy::QueryExpansionWithContext => "QE+Context",
        Strategy::Hyde => "HyDE",
    }
}

/// Evaluation runner.
pub struct Evaluator {
    runner: StrategyRunner,
    config: EvalConfig,
}

impl Evaluator {
    pub fn new(runner: StrategyRunner, config: EvalConfig) -> Self {
        Self { runner, config }
    }

    /// Score one strategy over `queries`. Failed retrievals are recorded, not fatal.
    pub async fn evaluate_strategy(&self, strategy: Strategy, queries: &QuerySet) -> StrategyReport {
        let k = self.config.k;
        let mut per_query = Vec::with_capacity(queries.len());

        for (idx, q) in queries.queries.iter().enumerate() {
            let start = Instant::now();
            let outcome = self.runner.retrieve(strategy, &q.query, k).await;
            let time_ms = start.elapsed().as_millis() as u64;

            let (retrieved, effective_query, error) = match outcome {
                Ok(output) => (
                    output.results.into_iter().map(|r| r.id).collect::<Vec<_>>(),
                    Some(output.effective_query),
                    None,
                ),
                Err(e) => {
                    warn!("{} failed on {:?}: {}", strategy, q.query, e);
                    (Vec::new(), None, Some(e.to_string()))
                }
            };

            let metrics = evaluate_single_query(retrieved.as_slice(), q.expected.as_slice(), k);

            if self.config.verbose {
                println!(
                    "  [{}/{}] {:<45} recall={:.2} mrr={:.2}{}",
                    idx + 1,
                    queries.len(),
                    q.query,
                    metrics.recall_at_k,
                    metrics.mrr,
                    if error.is_some() { " (error)" } else { "" }
                );
            }

            per_query.push(QueryResult {
                query: q.query.clone(),
                category: q.category,
                effective_query,
                metrics,
                time_ms,
                error,
            });
        }

        StrategyReport::from_results(strategy, per_query)
    }

    /// Run every configured strategy, one after another.
    pub async fn run(&self, queries: &QuerySet, repo_path: &Path) -> Result<EvalResults> {
        let start = Instant::now();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();

        let queries = match self.config.max_queries {
            Some(max) => queries.take(max),
            None => queries.clone(),
        };
        anyhow::ensure!(!queries.is_empty(), "Query set '{}' is empty", queries.name);

        let mut strategies = Vec::with_capacity(self.config.strategies.len());
        for &strategy in &self.config.strategies {
            println!("\n{}", format!("Evaluating: {}", strategy).cyan());
            let report = self.evaluate_strategy(strategy, &queries).await;

            if let Some(a) = &report.aggregate {
                println!("  Recall@{}: {:.3}", self.config.k, a.avg_recall_at_k);
                println!("  Precision@{}: {:.3}", self.config.k, a.avg_precision_at_k);
                println!("  MRR: {:.3}", a.avg_mrr);
            }
            strategies.push(report);
        }

        Ok(EvalResults {
            timestamp,
            repo_path: repo_path.display().to_string(),
            query_set: queries.name.clone(),
            k: self.config.k,
            num_queries: queries.len(),
            strategies,
            total_time_secs: start.elapsed().as_secs_f64(),
        })
    }
}
