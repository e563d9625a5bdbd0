//! Python source chunking.
//!
//! Each function, method and class becomes one chunk, identified as
//! `relative/path.py::name` or `relative/path.py::Class.method`. Chunks carry
//! their docstring and the file's top-level imports so the search text can
//! mention both.

use crate::error::{CompassError, Result};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use tracing::{debug, info, warn};
use tree_sitter::{Node, Parser};
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into when walking a repository.
pub const IGNORED_DIRS: &[&str] = &[
    "venv",
    ".venv",
    "node_modules",
    "__pycache__",
    ".git",
    "build",
    "dist",
    ".eggs",
    "scratch",
    "scripts",
    "evaluation",
];

/// Kind of code a chunk holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Function,
    Method,
    Class,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Function => "function",
            ChunkType::Method => "method",
            ChunkType::Class => "class",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk of code extracted from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChunk {
    /// `file_path::name` or `file_path::Class.method`.
    pub id: String,
    /// Path relative to the repository root, `/`-separated.
    pub file_path: String,
    pub name: String,
    pub chunk_type: ChunkType,
    /// Source text, including decorators.
    pub code: String,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub docstring: Option<String>,
    pub parent_class: Option<String>,
    /// Top-level import statements of the file.
    #[serde(default)]
    pub imports: Vec<String>,
}

/// Extracts chunks from Python files using tree-sitter.
pub struct PythonChunker {
    parser: Parser,
}

impl PythonChunker {
    /// Create a chunker with the Python grammar loaded.
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| CompassError::parse("<grammar>", e.to_string()))?;
        Ok(Self { parser })
    }

    /// Parse a file and return its chunks. Non-UTF-8 files yield no chunks.
    pub fn chunk_file(&mut self, file_path: &Path, repo_root: &Path) -> Result<Vec<CodeChunk>> {
        let bytes = std::fs::read(file_path).map_err(|e| CompassError::io(file_path, e))?;

        let Ok(source) = String::from_utf8(bytes) else {
            debug!("Skipping non UTF-8 file {}", file_path.display());
            return Ok(Vec::new());
        };

        let relative = file_path.strip_prefix(repo_root).unwrap_or(file_path);
        self.chunk_source(&source, &slash_path(relative))
            .map_err(|e| match e {
                CompassError::Parse { message, .. } => CompassError::parse(file_path, message),
                other => other,
            })
    }

    /// Chunk source text as if it lived at `file_path`.
    pub fn chunk_source(&mut self, source: &str, file_path: &str) -> Result<Vec<CodeChunk>> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| CompassError::parse(file_path, "parser produced no tree"))?;

        let root = tree.root_node();
        let bytes = source.as_bytes();
        let imports = extract_imports(root, bytes);

        let mut chunks = Vec::new();
        extract_chunks(root, bytes, file_path, None, &mut chunks);

        for chunk in &mut chunks {
            chunk.imports = imports.clone();
        }

        Ok(chunks)
    }
}

/// Top-level `import` and `from ... import` statements, verbatim.
fn extract_imports(root: Node, source: &[u8]) -> Vec<String> {
    let mut cursor = root.walk();
    root.children(&mut cursor)
        .filter(|child| matches!(child.kind(), "import_statement" | "import_from_statement"))
        .filter_map(|child| child.utf8_text(source).ok().map(str::to_string))
        .collect()
}

fn extract_chunks(
    node: Node,
    source: &[u8],
    file_path: &str,
    parent_class: Option<&str>,
    out: &mut Vec<CodeChunk>,
) {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();

    for child in children {
        match child.kind() {
            "decorated_definition" => {
                if let Some(definition) = child.child_by_field_name("definition") {
                    emit_definition(definition, child, source, file_path, parent_class, out);
                }
            }
            "function_definition" | "class_definition" => {
                emit_definition(child, child, source, file_path, parent_class, out);
            }
            _ => extract_chunks(child, source, file_path, parent_class, out),
        }
    }
}

/// `code_node` is the decorated wrapper when there is one, so code and line
/// span include decorators.
fn emit_definition(
    definition: Node,
    code_node: Node,
    source: &[u8],
    file_path: &str,
    parent_class: Option<&str>,
    out: &mut Vec<CodeChunk>,
) {
    match definition.kind() {
        "function_definition" => {
            let chunk_type = if parent_class.is_some() {
                ChunkType::Method
            } else {
                ChunkType::Function
            };
            out.push(make_chunk(
                definition,
                code_node,
                source,
                file_path,
                chunk_type,
                parent_class,
            ));
        }
        "class_definition" => {
            let chunk = make_chunk(definition, code_node, source, file_path, ChunkType::Class, None);
            let class_name = chunk.name.clone();
            out.push(chunk);

            if let Some(body) = definition.child_by_field_name("body") {
                extract_chunks(body, source, file_path, Some(&class_name), out);
            }
        }
        _ => {}
    }
}

fn make_chunk(
    definition: Node,
    code_node: Node,
    source: &[u8],
    file_path: &str,
    chunk_type: ChunkType,
    parent_class: Option<&str>,
) -> CodeChunk {
    let name = definition
        .child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
        .unwrap_or("<unknown>")
        .to_string();

    let id = match parent_class {
        Some(class) => format!("{}::{}.{}", file_path, class, name),
        None => format!("{}::{}", file_path, name),
    };

    CodeChunk {
        id,
        file_path: file_path.to_string(),
        name,
        chunk_type,
        code: code_node.utf8_text(source).unwrap_or_default().to_string(),
        start_line: code_node.start_position().row + 1,
        end_line: code_node.end_position().row + 1,
        docstring: extract_docstring(definition, source),
        parent_class: parent_class.map(str::to_string),
        imports: Vec::new(),
    }
}

/// First statement of the body, if it is a bare string literal.
fn extract_docstring(definition: Node, source: &[u8]) -> Option<String> {
    let body = definition.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }
    let text = expr.utf8_text(source).ok()?;
    let cleaned = clean_docstring(text);
    (!cleaned.is_empty()).then_some(cleaned)
}

fn clean_docstring(raw: &str) -> String {
    let s = raw.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'b' | 'B' | 'u' | 'U'));
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if s.len() >= 2 * quote.len() && s.starts_with(quote) && s.ends_with(quote) {
            return s[quote.len()..s.len() - quote.len()].trim().to_string();
        }
    }
    s.trim().to_string()
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    IGNORED_DIRS.contains(&name.as_ref()) || name.ends_with(".egg-info")
}

/// All `*.py` files under `repo_path`, sorted, skipping ignored directories.
pub fn python_files(repo_path: &Path) -> Result<Vec<std::path::PathBuf>> {
    if !repo_path.is_dir() {
        return Err(CompassError::RepoNotFound(repo_path.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(repo_path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("py")
        {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Chunk every Python file in a repository.
pub fn chunk_repository(repo_path: &Path) -> Result<Vec<CodeChunk>> {
    let files = python_files(repo_path)?;
    info!("Found {} Python files", files.len());

    let mut chunker = PythonChunker::new()?;
    let mut chunks = Vec::new();

    for file in &files {
        match chunker.chunk_file(file, repo_path) {
            Ok(file_chunks) => chunks.extend(file_chunks),
            Err(e) => warn!("Skipping {}: {}", file.display(), e),
        }
    }

    Ok(chunks)
}
