//! CodeCompass - code search over Python repositories, and a harness for
//! measuring how query rewriting strategies change retrieval quality.
//!
//! # Overview
//!
//! A repository is split into function, method and class chunks with
//! tree-sitter, each chunk is embedded through an OpenAI-compatible endpoint,
//! and queries are answered by fusing vector similarity with BM25.
//! On top of that search sit four retrieval strategies:
//! 1. Baseline: the query as typed
//! 2. Query expansion: the LLM adds related library and decorator names
//! 3. Query expansion with context: the same, limited to the repo's imports
//! 4. HyDE: the LLM writes a hypothetical snippet that is searched instead
//!
//! The [`eval`] module scores the strategies against labeled queries with
//! Recall@K, Precision@K, MRR and F1@K.
//!
//! # Quick Start
//!
//! ```no_run
//! use codecompass::{
//!     config::Config,
//!     llm::LlmClient,
//!     search::RepoSearcher,
//!     store::index_repository,
//!     strategy::{Strategy, StrategyRunner},
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let client = LlmClient::new(config.llm.clone());
//!     let repo = Path::new(".");
//!
//!     // Chunk, embed and store the repository
//!     index_repository(repo, &config.index, &client, true).await?;
//!
//!     // Search it with HyDE
//!     let searcher = RepoSearcher::open(repo, &config.index, client.clone())?;
//!     let runner = StrategyRunner::new(Arc::new(searcher), Arc::new(client));
//!     let output = runner.retrieve(Strategy::Hyde, "embed a batch of texts", 5).await?;
//!
//!     for result in output.results {
//!         println!("{}", result.format());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **PythonChunker**: tree-sitter based extraction of code chunks
//! - **CodeStore**: per-repository index with hybrid search
//! - **KeywordIndex**: BM25 ranking of chunk text
//! - **LlmClient**: OpenAI-compatible chat and embedding client
//! - **StrategyRunner**: query rewriting plus search
//! - **Evaluator**: runs strategies over a query set and reports scores

pub mod chunker;
pub mod config;
pub mod error;
pub mod eval;
pub mod keywords;
pub mod llm;
pub mod logging;
pub mod persistence;
pub mod rag;
pub mod ranking;
pub mod search;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use chunker::{ChunkType, CodeChunk, PythonChunker, chunk_repository};
pub use config::Config;
pub use error::{CompassError, Result};
pub use llm::{Embedder, LlmClient, TextGenerator};
pub use search::{CodeSearch, RepoSearcher, SearchResult, search_code};
pub use store::{CodeStore, IndexStatus, index_repository};
pub use strategy::{Strategy, StrategyRunner};
