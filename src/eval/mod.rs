//! Evaluation of retrieval strategies.
//!
//! This module provides:
//! - Recall@K, Precision@K, MRR and F1@K over chunk ids
//! - The labeled query set and JSON loading for custom sets
//! - A runner that scores every strategy and prints the comparison

pub mod metrics;
pub mod queries;
pub mod runner;

pub use metrics::{AggregateMetrics, QueryMetrics, aggregate_metrics, evaluate_single_query};
pub use queries::{MissingId, QueryCategory, QuerySet, RetrievalQuery};
pub use runner::{EvalConfig, EvalResults, Evaluator, QueryResult, StrategyReport};
