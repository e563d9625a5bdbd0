//! In-crate fakes for the LLM and search seams.

use crate::chunker::{ChunkType, CodeChunk};
use crate::error::{CompassError, Result};
use crate::llm::{Embedder, TextGenerator};
use crate::keywords::tokenize;
use crate::search::{CodeSearch, SearchResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Build a chunk with an id derived from its path, class and name.
pub fn sample_chunk(file_path: &str, name: &str, parent_class: Option<&str>, code: &str) -> CodeChunk {
    let (id, chunk_type) = match parent_class {
        Some(class) => (format!("{}::{}.{}", file_path, class, name), ChunkType::Method),
        None => (format!("{}::{}", file_path, name), ChunkType::Function),
    };
    CodeChunk {
        id,
        file_path: file_path.to_string(),
        name: name.to_string(),
        chunk_type,
        code: code.to_string(),
        start_line: 1,
        end_line: code.lines().count().max(1),
        docstring: None,
        parent_class: parent_class.map(str::to_string),
        imports: Vec::new(),
    }
}

pub fn result_for(id: &str) -> SearchResult {
    let (file_path, name) = id.split_once("::").unwrap_or((id, id));
    SearchResult {
        id: id.to_string(),
        file_path: file_path.to_string(),
        name: name.rsplit('.').next().unwrap_or(name).to_string(),
        chunk_type: ChunkType::Function,
        code: format!("def {}():\n    pass", name),
        start_line: 1,
        end_line: 2,
        docstring: None,
        score: 0.0,
    }
}

/// Bag-of-words embedder: every token bumps one hashed bucket.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dims];
        for token in tokenize(text) {
            let bucket = token
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % self.dims] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Generator that answers every prompt with the same text and remembers prompts.
pub struct ScriptedGenerator {
    reply: std::result::Result<String, String>,
    prompts: Mutex<Vec<(Option<String>, String)>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// `(system, prompt)` pairs seen so far.
    pub fn prompts(&self) -> Vec<(Option<String>, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, system: Option<&str>, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.map(str::to_string), prompt.to_string()));
        self.reply.clone().map_err(CompassError::LlmApi)
    }
}

/// Search backend answering from a fixed query-to-ids table.
#[derive(Default)]
pub struct StaticSearch {
    answers: HashMap<String, Vec<String>>,
    code: HashMap<String, String>,
    failures: Vec<String>,
    imports: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, query: &str, ids: &[&str]) -> Self {
        self.answers
            .insert(query.to_string(), ids.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Return `code` as the body of result `id`.
    pub fn with_code(mut self, id: &str, code: &str) -> Self {
        self.code.insert(id.to_string(), code.to_string());
        self
    }

    pub fn fail_on(mut self, query: &str) -> Self {
        self.failures.push(query.to_string());
        self
    }

    pub fn with_imports(mut self, imports: &[&str]) -> Self {
        self.imports = imports.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Queries received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeSearch for StaticSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failures.iter().any(|q| q == query) {
            return Err(CompassError::Http("connection refused".to_string()));
        }
        Ok(self
            .answers
            .get(query)
            .map(|ids| {
                ids.iter()
                    .take(limit)
                    .map(|id| {
                        let mut result = result_for(id);
                        if let Some(code) = self.code.get(id) {
                            result.code = code.clone();
                        }
                        result
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn repo_imports(&self) -> Result<Vec<String>> {
        Ok(self.imports.clone())
    }
}
