//! Code search over an indexed repository.
//!
//! [`CodeSearch`] is the seam the retrieval strategies, the RAG path and the
//! evaluation harness depend on. [`RepoSearcher`] is the real implementation
//! backed by a [`CodeStore`].

use crate::chunker::ChunkType;
use crate::config::IndexConfig;
use crate::error::{CompassError, Result};
use crate::llm::Embedder;
use crate::persistence::StoredChunk;
use crate::store::CodeStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Characters of code shown by [`SearchResult::format`].
const PREVIEW_CHARS: usize = 500;

/// A search result with relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub file_path: String,
    pub name: String,
    pub chunk_type: ChunkType,
    pub code: String,
    pub start_line: usize,
    pub end_line: usize,
    pub docstring: Option<String>,
    /// Fused rank score, higher is better.
    pub score: f64,
}

impl SearchResult {
    pub fn from_stored(chunk: &StoredChunk, score: f64) -> Self {
        Self {
            id: chunk.id.clone(),
            file_path: chunk.file_path.clone(),
            name: chunk.name.clone(),
            chunk_type: chunk.chunk_type,
            code: chunk.code.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            docstring: chunk.docstring.clone(),
            score,
        }
    }

    /// `path:start-end`.
    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.file_path, self.start_line, self.end_line)
    }

    /// Header line plus a code preview.
    pub fn format(&self) -> String {
        let header = format!("📄 {} ({}) - {}", self.name, self.chunk_type, self.location());

        let preview = if self.code.chars().count() > PREVIEW_CHARS {
            let cut: String = self.code.chars().take(PREVIEW_CHARS).collect();
            format!("{}...", cut)
        } else {
            self.code.clone()
        };

        format!("{}\n{}", header, preview)
    }
}

/// Something that can find code for a query.
#[async_trait]
pub trait CodeSearch: Send + Sync {
    /// Up to `limit` results, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    /// Top-level module names the repository imports.
    async fn repo_imports(&self) -> Result<Vec<String>>;
}

/// Searches one indexed repository, embedding queries with `E`.
pub struct RepoSearcher<E> {
    store: CodeStore,
    embedder: E,
}

impl<E: Embedder> RepoSearcher<E> {
    /// Open an indexed repository. Fails with `NotIndexed` when there is no index.
    pub fn open(repo_path: &Path, config: &IndexConfig, embedder: E) -> Result<Self> {
        let store = CodeStore::open(repo_path, config)?;
        if !store.is_indexed() {
            return Err(CompassError::NotIndexed(store.repo_path().to_path_buf()));
        }
        Ok(Self { store, embedder })
    }
}

#[async_trait]
impl<E: Embedder> CodeSearch for RepoSearcher<E> {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.store.search(&self.embedder, query, limit).await
    }

    async fn repo_imports(&self) -> Result<Vec<String>> {
        self.store.imports()
    }
}

/// Convenience function to search a repository once.
pub async fn search_code<E: Embedder>(
    repo_path: &Path,
    query: &str,
    limit: usize,
    config: &IndexConfig,
    embedder: E,
) -> Result<Vec<SearchResult>> {
    let searcher = RepoSearcher::open(repo_path, config, embedder)?;
    searcher.search(query, limit).await
}
