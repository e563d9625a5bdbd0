//! Labeled retrieval queries.
//!
//! The built-in set targets the CodeCompass Python repository itself; expected
//! ids use the chunker's `path/to/file.py::Class.method` form. Other sets can
//! be loaded from JSON with the same layout as [`QuerySet::save_json`] writes.

use crate::error::CompassError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// What kind of question a query asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    /// "command line functions"
    FeatureSearch,
    /// "how embeddings work"
    ConceptSearch,
    /// "function to search code"
    ApiSearch,
    /// "where is X defined"
    DebugSearch,
    /// "I want to parse Python files"
    NaturalLanguage,
}

impl QueryCategory {
    pub const ALL: [QueryCategory; 5] = [
        QueryCategory::FeatureSearch,
        QueryCategory::ConceptSearch,
        QueryCategory::ApiSearch,
        QueryCategory::DebugSearch,
        QueryCategory::NaturalLanguage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::FeatureSearch => "feature_search",
            QueryCategory::ConceptSearch => "concept_search",
            QueryCategory::ApiSearch => "api_search",
            QueryCategory::DebugSearch => "debug_search",
            QueryCategory::NaturalLanguage => "natural_language",
        }
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryCategory {
    type Err = CompassError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        QueryCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CompassError::UnknownCategory(s.to_string()))
    }
}

/// A query with its ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub query: String,
    /// Relevant chunk ids.
    pub expected: Vec<String>,
    pub category: QueryCategory,
    #[serde(default)]
    pub description: String,
}

impl RetrievalQuery {
    pub fn new(query: &str, expected: &[&str], category: QueryCategory, description: &str) -> Self {
        Self {
            query: query.to_string(),
            expected: expected.iter().map(|s| s.to_string()).collect(),
            category,
            description: description.to_string(),
        }
    }
}

/// An expected id that the index does not contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingId {
    pub query: String,
    pub expected_id: String,
}

/// A named collection of queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySet {
    pub name: String,
    pub queries: Vec<RetrievalQuery>,
}

impl QuerySet {
    /// Create a new empty query set.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            queries: Vec::new(),
        }
    }

    pub fn add(&mut self, query: RetrievalQuery) {
        self.queries.push(query);
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Get the first `n` queries (for quick runs).
    pub fn take(&self, n: usize) -> Self {
        Self {
            name: self.name.clone(),
            queries: self.queries.iter().take(n).cloned().collect(),
        }
    }

    /// Load from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read query file: {:?}", path))?;
        let set: QuerySet =
            serde_json::from_str(&content).with_context(|| "Failed to parse query set JSON")?;
        Ok(set)
    }

    /// Save to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    /// Queries grouped by category, categories in declaration order.
    pub fn by_category(&self) -> BTreeMap<QueryCategory, Vec<&RetrievalQuery>> {
        let mut groups: BTreeMap<QueryCategory, Vec<&RetrievalQuery>> = BTreeMap::new();
        for query in &self.queries {
            groups.entry(query.category).or_default().push(query);
        }
        groups
    }

    /// Every (query, expected id) pair whose id is not in `indexed_ids`.
    pub fn validate_against(&self, indexed_ids: &HashSet<String>) -> Vec<MissingId> {
        self.queries
            .iter()
            .flat_map(|q| {
                q.expected
                    .iter()
                    .filter(|id| !indexed_ids.contains(*id))
                    .map(|id| MissingId {
                        query: q.query.clone(),
                        expected_id: id.clone(),
                    })
            })
            .collect()
    }

    /// The 19 labeled queries for the CodeCompass repository.
    pub fn builtin() -> Self {
        use QueryCategory::*;

        const CLI: &str = "src/codecompass/cli.py";
        const STORE: &str = "src/codecompass/indexing/store.py";
        const CHUNKER: &str = "src/codecompass/indexing/chunker.py";
        const OLLAMA: &str = "src/codecompass/llm/ollama.py";
        const RAG: &str = "src/codecompass/retrieval/rag.py";
        const SEARCH: &str = "src/codecompass/retrieval/search.py";

        let id = |file: &str, name: &str| format!("{}::{}", file, name);

        let mut set = QuerySet::new("codecompass");
        let mut push = |query: &str, expected: Vec<String>, category, description: &str| {
            set.add(RetrievalQuery {
                query: query.to_string(),
                expected,
                category,
                description: description.to_string(),
            });
        };

        push(
            "command line functions",
            vec![
                id(CLI, "hello"),
                id(CLI, "index"),
                id(CLI, "search"),
                id(CLI, "status"),
                id(CLI, "chat"),
            ],
            FeatureSearch,
            "Should find all CLI commands defined with @app.command()",
        );
        push(
            "index a repository",
            vec![
                id(CLI, "index"),
                id(STORE, "index_repository"),
                id(STORE, "CodeStore.index_chunks"),
            ],
            FeatureSearch,
            "Should find indexing-related functions",
        );
        push(
            "search code in repository",
            vec![
                id(CLI, "search"),
                id(SEARCH, "search_code"),
                id(STORE, "CodeStore.search"),
            ],
            FeatureSearch,
            "Should find search-related functions",
        );
        push(
            "interactive chat with codebase",
            vec![id(CLI, "chat"), id(RAG, "answer_question")],
            FeatureSearch,
            "Should find chat/conversation functions",
        );

        push(
            "how are embeddings generated",
            vec![id(OLLAMA, "embed"), id(OLLAMA, "embed_batch")],
            ConceptSearch,
            "Should find embedding generation code",
        );
        push(
            "parse Python abstract syntax tree",
            vec![
                id(CHUNKER, "PythonChunker"),
                id(CHUNKER, "PythonChunker._extract_chunks"),
                id(CHUNKER, "PythonChunker.chunk_file"),
            ],
            ConceptSearch,
            "Should find AST parsing code",
        );
        push(
            "vector database storage",
            vec![
                id(STORE, "CodeStore"),
                id(STORE, "CodeStore.search"),
                id(STORE, "CodeStore.index_chunks"),
            ],
            ConceptSearch,
            "Should find vector store implementation",
        );
        push(
            "RAG retrieval augmented generation",
            vec![id(RAG, "answer_question"), id(SEARCH, "search_code")],
            ConceptSearch,
            "Should find RAG pipeline code",
        );
        push(
            "extract functions from source code",
            vec![
                id(CHUNKER, "PythonChunker._extract_chunks"),
                id(CHUNKER, "PythonChunker._make_chunk"),
                id(CHUNKER, "chunk_repository"),
            ],
            ConceptSearch,
            "Should find code extraction logic",
        );

        push(
            "CodeStore class",
            vec![id(STORE, "CodeStore")],
            ApiSearch,
            "Direct class name search",
        );
        push(
            "PythonChunker",
            vec![id(CHUNKER, "PythonChunker")],
            ApiSearch,
            "Direct class name search",
        );
        push(
            "generate LLM response",
            vec![id(OLLAMA, "generate")],
            ApiSearch,
            "Should find the generate function",
        );
        push(
            "CodeChunk dataclass",
            vec![id(CHUNKER, "CodeChunk")],
            ApiSearch,
            "Should find the data model",
        );

        push(
            "where is search_text created",
            vec![id(STORE, "CodeStore._create_search_text")],
            DebugSearch,
            "Should find where search_text field is populated",
        );
        push(
            "docstring extraction",
            vec![id(CHUNKER, "PythonChunker._extract_docstring")],
            DebugSearch,
            "Should find docstring handling code",
        );
        push(
            "configuration settings",
            vec![id("src/codecompass/config.py", "Settings")],
            DebugSearch,
            "Should find config/settings",
        );

        push(
            "I want to parse Python files",
            vec![
                id(CHUNKER, "PythonChunker"),
                id(CHUNKER, "PythonChunker.chunk_file"),
                id(CHUNKER, "chunk_repository"),
            ],
            NaturalLanguage,
            "Natural language query about parsing",
        );
        push(
            "how do I ask questions about my code",
            vec![id(CLI, "chat"), id(RAG, "answer_question")],
            NaturalLanguage,
            "Natural language query about usage",
        );
        push(
            "save code chunks to database",
            vec![
                id(STORE, "CodeStore.index_chunks"),
                id(STORE, "index_repository"),
            ],
            NaturalLanguage,
            "Natural language about storage",
        );

        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_shape() {
        let set = QuerySet::builtin();
        assert_eq!(set.len(), 19);

        let counts: Vec<(QueryCategory, usize)> = set
            .by_category()
            .into_iter()
            .map(|(c, qs)| (c, qs.len()))
            .collect();
        assert_eq!(
            counts,
            vec![
                (QueryCategory::FeatureSearch, 4),
                (QueryCategory::ConceptSearch, 5),
                (QueryCategory::ApiSearch, 4),
                (QueryCategory::DebugSearch, 3),
                (QueryCategory::NaturalLanguage, 3),
            ]
        );

        assert!(set.queries.iter().all(|q| !q.expected.is_empty()));
        assert!(
            set.queries
                .iter()
                .flat_map(|q| q.expected.iter())
                .all(|id| id.starts_with("src/codecompass/") && id.contains(".py::"))
        );
    }

    #[test]
    fn test_builtin_first_query() {
        let set = QuerySet::builtin();
        let first = &set.queries[0];
        assert_eq!(first.query, "command line functions");
        assert_eq!(first.expected.len(), 5);
        assert_eq!(first.expected[0], "src/codecompass/cli.py::hello");
    }

    #[test]
    fn test_category_names() {
        assert_eq!(
            serde_json::to_string(&QueryCategory::NaturalLanguage).unwrap(),
            "\"natural_language\""
        );
        assert_eq!(
            "api_search".parse::<QueryCategory>().unwrap(),
            QueryCategory::ApiSearch
        );
        assert!(matches!(
            "nonsense".parse::<QueryCategory>(),
            Err(CompassError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries").join("set.json");

        let original = QuerySet::builtin();
        original.save_json(&path).unwrap();
        let loaded = QuerySet::load_json(&path).unwrap();

        assert_eq!(loaded.name, "codecompass");
        assert_eq!(loaded.queries, original.queries);
    }

    #[test]
    fn test_load_rejects_unknown_category() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"name": "x", "queries": [{"query": "q", "expected": [], "category": "misc"}]}"#,
        )
        .unwrap();
        assert!(QuerySet::load_json(&path).is_err());
    }

    #[test]
    fn test_take() {
        let set = QuerySet::builtin().take(3);
        assert_eq!(set.len(), 3);
        assert!(QuerySet::new("empty").is_empty());
    }

    #[test]
    fn test_validate_against() {
        let mut set = QuerySet::new("small");
        set.add(RetrievalQuery::new(
            "chat",
            &["cli.py::chat", "rag.py::answer_question"],
            QueryCategory::FeatureSearch,
            "",
        ));

        let ids: HashSet<String> = ["cli.py::chat".to_string()].into_iter().collect();
        let missing = set.validate_against(&ids);
        assert_eq!(
            missing,
            vec![MissingId {
                query: "chat".to_string(),
                expected_id: "rag.py::answer_question".to_string(),
            }]
        );

        let all: HashSet<String> = [
            "cli.py::chat".to_string(),
            "rag.py::answer_question".to_string(),
        ]
        .into_iter()
        .collect();
        assert!(set.validate_against(&all).is_empty());
    }
}
