//! Per-repository vector store with hybrid search.
//!
//! Chunks are embedded once at index time. Queries are scored twice, by cosine
//! similarity against the stored vectors and by BM25 against the search text,
//! and the two rankings are fused with RRF.

use crate::chunker::{CodeChunk, chunk_repository};
use crate::config::IndexConfig;
use crate::error::{CompassError, Result};
use crate::keywords::KeywordIndex;
use crate::llm::Embedder;
use crate::persistence::{
    CHUNKS_FILENAME, IndexMetadata, METADATA_FILENAME, StoredChunk, StoredIndex, index_exists,
    load_index, load_metadata, save_index, save_metadata,
};
use crate::ranking::{RRF_K, rank_by_similarity, reciprocal_rank_fusion};
use crate::search::SearchResult;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Texts sent per embedding request.
const EMBED_BATCH_SIZE: usize = 32;

/// Minimum candidates taken from each ranking before fusion.
const MIN_CANDIDATES: usize = 20;

/// Whether a repository has an index, and what it holds.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexStatus {
    NotIndexed,
    Indexed(IndexMetadata),
}

/// Manages the index of one repository.
pub struct CodeStore {
    repo_path: PathBuf,
    index_dir: PathBuf,
    config: IndexConfig,
    index: Option<StoredIndex>,
    keywords: KeywordIndex,
}

impl CodeStore {
    /// Open the store for `repo_path`, loading the index if one exists.
    pub fn open(repo_path: &Path, config: &IndexConfig) -> Result<Self> {
        let repo_path = repo_path
            .canonicalize()
            .map_err(|_| CompassError::RepoNotFound(repo_path.to_path_buf()))?;
        let index_dir = index_dir_for(&repo_path, &config.data_dir);

        let mut store = Self {
            repo_path,
            index_dir,
            config: config.clone(),
            index: None,
            keywords: KeywordIndex::build(Vec::<String>::new()),
        };

        let chunks_path = store.chunks_path();
        if index_exists(&chunks_path) {
            let index = load_index(&chunks_path)?;
            debug!(
                "Loaded {} chunks from {}",
                index.chunks.len(),
                chunks_path.display()
            );
            store.install(index);
        }

        Ok(store)
    }

    fn install(&mut self, index: StoredIndex) {
        self.keywords = KeywordIndex::build(index.chunks.iter().map(|c| c.search_text.as_str()));
        self.index = Some(index);
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn chunks_path(&self) -> PathBuf {
        self.index_dir.join(CHUNKS_FILENAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.index_dir.join(METADATA_FILENAME)
    }

    /// Embed and store `chunks`, replacing any previous index.
    pub async fn index_chunks<E>(
        &mut self,
        chunks: &[CodeChunk],
        embedder: &E,
        show_progress: bool,
    ) -> Result<usize>
    where
        E: Embedder + ?Sized,
    {
        if chunks.is_empty() {
            return Ok(0);
        }

        let search_texts: Vec<String> = chunks.iter().map(create_search_text).collect();
        let embed_texts: Vec<String> = search_texts
            .iter()
            .map(|t| truncate_to_tokens(t, self.config.chunk_max_tokens).to_string())
            .collect();

        let pb = if show_progress {
            create_progress_bar(chunks.len())
        } else {
            ProgressBar::hidden()
        };
        pb.set_message("Embedding chunks...");

        let mut stored = Vec::with_capacity(chunks.len());
        let mut offset = 0;

        for batch in embed_texts.chunks(EMBED_BATCH_SIZE) {
            let vectors = embedder.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(CompassError::LlmApi(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            for (i, vector) in vectors.into_iter().enumerate() {
                check_dimensions(self.config.embedding_dimensions, vector.len())?;
                let chunk = &chunks[offset + i];
                stored.push(StoredChunk::new(
                    chunk,
                    search_texts[offset + i].clone(),
                    vector,
                ));
            }

            offset += batch.len();
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();

        let index = StoredIndex {
            dimensions: self.config.embedding_dimensions,
            chunks: stored,
        };

        // The chunks file marks a repository as indexed, so it is written last.
        let metadata = IndexMetadata {
            repo_path: self.repo_path.display().to_string(),
            indexed_at: chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
            chunk_count: index.chunks.len(),
            imports: import_modules(chunks.iter().flat_map(|c| c.imports.iter())),
        };
        save_metadata(&metadata, &self.metadata_path())?;
        save_index(&index, &self.chunks_path())?;

        let count = index.chunks.len();
        self.install(index);
        info!("Indexed {} chunks into {}", count, self.index_dir.display());

        Ok(count)
    }

    /// Embed `query` and run a hybrid search. An unindexed store returns nothing.
    pub async fn search<E>(&self, embedder: &E, query: &str, limit: usize) -> Result<Vec<SearchResult>>
    where
        E: Embedder + ?Sized,
    {
        if !self.is_indexed() {
            return Ok(Vec::new());
        }
        let vector = embedder.embed(query).await?;
        self.hybrid_search(query, &vector, limit)
    }

    /// Fuse vector and keyword rankings for an already embedded query.
    pub fn hybrid_search(
        &self,
        query: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let Some(index) = &self.index else {
            return Ok(Vec::new());
        };
        if index.chunks.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        check_dimensions(index.dimensions, query_vector.len())?;

        let fetch = limit.saturating_mul(2).max(MIN_CANDIDATES);

        let by_vector: Vec<usize> = rank_by_similarity(
            query_vector,
            index.chunks.iter().map(|c| c.vector.as_slice()),
            fetch,
        )
        .into_iter()
        .map(|(i, _)| i)
        .collect();

        let by_keyword: Vec<usize> = self
            .keywords
            .search(query, fetch)
            .into_iter()
            .map(|(i, _)| i)
            .collect();

        debug!(
            "Hybrid search: {} vector hits, {} keyword hits",
            by_vector.len(),
            by_keyword.len()
        );

        Ok(reciprocal_rank_fusion(&[by_vector, by_keyword], RRF_K)
            .into_iter()
            .take(limit)
            .map(|(i, score)| SearchResult::from_stored(&index.chunks[i], score))
            .collect())
    }

    /// Indexed exactly when searches have chunks to run against. Missing
    /// metadata is rebuilt from the chunks, without imports or a timestamp.
    pub fn get_stats(&self) -> Result<IndexStatus> {
        let Some(index) = &self.index else {
            return Ok(IndexStatus::NotIndexed);
        };

        let metadata = match load_metadata(&self.metadata_path())? {
            Some(metadata) => metadata,
            None => {
                warn!("No metadata in {}", self.index_dir.display());
                IndexMetadata {
                    repo_path: self.repo_path.display().to_string(),
                    indexed_at: "unknown".to_string(),
                    chunk_count: index.chunks.len(),
                    imports: Vec::new(),
                }
            }
        };
        Ok(IndexStatus::Indexed(metadata))
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Ids of every stored chunk, in index order.
    pub fn chunk_ids(&self) -> Vec<String> {
        self.index
            .iter()
            .flat_map(|index| index.chunks.iter().map(|c| c.id.clone()))
            .collect()
    }

    /// Module names recorded at index time.
    pub fn imports(&self) -> Result<Vec<String>> {
        Ok(load_metadata(&self.metadata_path())?
            .map(|m| m.imports)
            .unwrap_or_default())
    }
}

/// `<data_dir>/indices/<repo name>-<8 hex chars of sha256(path)>`.
pub fn index_dir_for(repo_path: &Path, data_dir: &Path) -> PathBuf {
    let digest = Sha256::digest(repo_path.to_string_lossy().as_bytes());
    let hash = hex::encode(digest);
    let name = repo_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string());
    data_dir.join("indices").join(format!("{}-{}", name, &hash[..8]))
}

fn check_dimensions(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(CompassError::EmbeddingDimension { expected, actual });
    }
    Ok(())
}

/// Text embedded and keyword-indexed for a chunk.
pub fn create_search_text(chunk: &CodeChunk) -> String {
    let mut parts = vec![
        format!("Name: {}", chunk.name),
        format!("Type: {}", chunk.chunk_type),
    ];

    if let Some(class) = &chunk.parent_class {
        parts.push(format!("Class: {}", class));
    }
    if let Some(doc) = &chunk.docstring {
        parts.push(format!("Description: {}", doc));
    }
    if !chunk.imports.is_empty() {
        parts.push(format!("File imports: {}", chunk.imports.join(", ")));
    }
    parts.push(format!("Code:\n{}", chunk.code));

    parts.join("\n")
}

/// Cut `text` after roughly `max_tokens` tokens, counting a token as 3/4 of
/// a whitespace-separated word. Original spacing is kept.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let max_words = (max_tokens * 3 / 4).max(1);

    let mut words = 0;
    let mut in_word = false;
    for (pos, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                words += 1;
                if words == max_words {
                    return &text[..pos];
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    text
}

/// Top-level module names from import statements, unique and sorted.
///
/// `from a.b import c` gives `a`; `import x.y, z` gives `x`. Relative imports
/// have no top-level module and are skipped.
pub fn import_modules<'a, I>(imports: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut modules = BTreeSet::new();
    for statement in imports {
        let mut words = statement.split_whitespace();
        let module = match words.next() {
            Some("from") | Some("import") => words.next(),
            _ => None,
        };
        let Some(module) = module else { continue };
        let top = module
            .split(',')
            .next()
            .and_then(|m| m.split('.').next())
            .unwrap_or_default();
        if !top.is_empty() {
            modules.insert(top.to_string());
        }
    }
    modules.into_iter().collect()
}

fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}")
            .map_err(|e| warn!("Failed to set progress bar style: {}", e))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb
}

/// Chunk, embed and store a repository. Returns the number of chunks stored.
pub async fn index_repository<E>(
    repo_path: &Path,
    config: &IndexConfig,
    embedder: &E,
    show_progress: bool,
) -> Result<usize>
where
    E: Embedder + ?Sized,
{
    let chunks = chunk_repository(repo_path)?;
    info!("Found {} code chunks", chunks.len());

    if chunks.is_empty() {
        warn!("No chunks found in {}", repo_path.display());
        return Ok(0);
    }

    let mut store = CodeStore::open(repo_path, config)?;
    store.index_chunks(&chunks, embedder, show_progress).await
}
