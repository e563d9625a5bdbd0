//! Persistence layer for repository indices.
//!
//! An index directory holds the embedded chunks (bincode by default, JSON when
//! the file name says so) and a human-readable `metadata.json`.

use crate::chunker::{ChunkType, CodeChunk};
use crate::error::{CompassError, Result};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default filename for the stored chunks.
pub const CHUNKS_FILENAME: &str = "chunks.bin";

/// Filename for index metadata.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Save format for stored indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// JSON format (human-readable, larger).
    Json,
    /// Bincode format (binary, compact).
    Bincode,
}

impl SaveFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => SaveFormat::Json,
            _ => SaveFormat::Bincode,
        }
    }
}

/// A chunk with its search text and embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct StoredChunk {
    pub id: String,
    pub file_path: String,
    pub name: String,
    pub chunk_type: ChunkType,
    pub code: String,
    pub start_line: usize,
    pub end_line: usize,
    pub docstring: Option<String>,
    pub parent_class: Option<String>,
    pub search_text: String,
    pub vector: Vec<f32>,
}

impl StoredChunk {
    pub fn new(chunk: &CodeChunk, search_text: String, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            file_path: chunk.file_path.clone(),
            name: chunk.name.clone(),
            chunk_type: chunk.chunk_type,
            code: chunk.code.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            docstring: chunk.docstring.clone(),
            parent_class: chunk.parent_class.clone(),
            search_text,
            vector,
        }
    }
}

/// Everything needed to answer searches for one repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct StoredIndex {
    /// Length of every vector in `chunks`.
    pub dimensions: usize,
    pub chunks: Vec<StoredChunk>,
}

/// Summary written next to the chunks after indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub repo_path: String,
    pub indexed_at: String,
    pub chunk_count: usize,
    /// Top-level module names imported anywhere in the repository, sorted.
    #[serde(default)]
    pub imports: Vec<String>,
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| CompassError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Save an index, picking the format from the extension.
pub fn save_index(index: &StoredIndex, path: &Path) -> Result<()> {
    save_index_with_format(index, path, SaveFormat::from_path(path))
}

/// Save an index with specific format.
pub fn save_index_with_format(index: &StoredIndex, path: &Path, format: SaveFormat) -> Result<()> {
    ensure_parent(path)?;

    let data = match format {
        SaveFormat::Json => serde_json::to_string_pretty(index)
            .map_err(|e| CompassError::Serialization(e.to_string()))?
            .into_bytes(),
        SaveFormat::Bincode => bincode::encode_to_vec(index, bincode::config::standard())
            .map_err(|e| CompassError::Serialization(e.to_string()))?,
    };

    fs::write(path, &data).map_err(|e| CompassError::io(path, e))
}

/// Load an index saved by [`save_index`].
pub fn load_index(path: &Path) -> Result<StoredIndex> {
    if !path.exists() {
        return Err(CompassError::IndexNotFound(path.to_path_buf()));
    }
    load_index_with_format(path, SaveFormat::from_path(path))
}

/// Load an index with specific format.
pub fn load_index_with_format(path: &Path, format: SaveFormat) -> Result<StoredIndex> {
    let data = fs::read(path).map_err(|e| CompassError::io(path, e))?;

    let index = match format {
        SaveFormat::Json => serde_json::from_slice(&data)
            .map_err(|e| CompassError::Serialization(e.to_string()))?,
        SaveFormat::Bincode => {
            let (index, _): (StoredIndex, usize) =
                bincode::decode_from_slice(&data, bincode::config::standard())
                    .map_err(|e| CompassError::Serialization(e.to_string()))?;
            index
        }
    };

    Ok(index)
}

/// Check if an index file exists at the given path.
pub fn index_exists(path: &Path) -> bool {
    path.is_file()
}

/// Get the size of an index file in bytes.
pub fn index_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| CompassError::io(path, e))?;
    Ok(metadata.len())
}

pub fn save_metadata(metadata: &IndexMetadata, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CompassError::Serialization(e.to_string()))?;
    fs::write(path, json).map_err(|e| CompassError::io(path, e))
}

/// `None` when no metadata has been written yet.
pub fn load_metadata(path: &Path) -> Result<Option<IndexMetadata>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| CompassError::io(path, e))?;
    let metadata =
        serde_json::from_str(&content).map_err(|e| CompassError::Serialization(e.to_string()))?;
    Ok(Some(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_index() -> StoredIndex {
        let chunk = CodeChunk {
            id: "codecompass/cli.py::hello".to_string(),
            file_path: "codecompass/cli.py".to_string(),
            name: "hello".to_string(),
            chunk_type: ChunkType::Function,
            code: "def hello():\n    \"\"\"Test command.\"\"\"\n".to_string(),
            start_line: 10,
            end_line: 12,
            docstring: Some("Test command.".to_string()),
            parent_class: None,
            imports: vec!["import typer".to_string()],
        };
        StoredIndex {
            dimensions: 3,
            chunks: vec![StoredChunk::new(
                &chunk,
                "Name: hello".to_string(),
                vec![0.1, 0.2, 0.3],
            )],
        }
    }

    #[test]
    fn test_save_and_load_bincode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CHUNKS_FILENAME);

        let original = create_test_index();
        save_index(&original, &path).unwrap();
        assert!(index_exists(&path));

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_json_is_readable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunks.json");

        save_index(&create_test_index(), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("codecompass/cli.py::hello"));
        assert!(content.contains("\"function\""));
        assert_eq!(load_index(&path).unwrap().chunks.len(), 1);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SaveFormat::from_path(Path::new("a.json")), SaveFormat::Json);
        assert_eq!(SaveFormat::from_path(Path::new("a.bin")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("a")), SaveFormat::Bincode);
    }

    #[test]
    fn test_load_nonexistent() {
        let result = load_index(Path::new("/nonexistent/chunks.bin"));
        assert!(matches!(result, Err(CompassError::IndexNotFound(_))));
    }

    #[test]
    fn test_index_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CHUNKS_FILENAME);
        save_index(&create_test_index(), &path).unwrap();
        assert!(index_size(&path).unwrap() > 0);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(METADATA_FILENAME);
        assert!(load_metadata(&path).unwrap().is_none());

        let metadata = IndexMetadata {
            repo_path: "/src/codecompass".to_string(),
            indexed_at: "2026-01-05T10:00:00".to_string(),
            chunk_count: 42,
            imports: vec!["lancedb".to_string(), "typer".to_string()],
        };
        save_metadata(&metadata, &path).unwrap();
        assert_eq!(load_metadata(&path).unwrap(), Some(metadata));
    }
}
