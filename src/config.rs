//! Configuration for codecompass.
//!
//! Values come from `CODECOMPASS_*` variables, then `config.yaml` in the
//! platform config directory, then built-in defaults.

use crate::error::{CompassError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Prefix shared by every environment variable we read.
pub const ENV_PREFIX: &str = "CODECOMPASS_";

/// Chat and embedding endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (Ollama serves one on port 11434).
    pub api_base: String,

    /// API key for authentication. Local servers usually need none.
    #[serde(default)]
    pub api_key: String,

    /// Model used for generation (expansion, HyDE, chat).
    pub chat_model: String,

    /// Model used for embeddings.
    pub embedding_model: String,

    /// Completion token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// 0.0 keeps rewrites deterministic.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:11434".to_string(),
            api_key: String::new(),
            chat_model: "qwen2.5:7b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Indexing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Token budget for the text embedded per chunk.
    pub chunk_max_tokens: usize,

    /// Expected length of every embedding vector.
    pub embedding_dimensions: usize,

    /// Root directory for per-repository indices.
    pub data_dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 512,
            embedding_dimensions: 768,
            data_dir: default_data_dir(),
        }
    }
}

/// `~/.codecompass`, or `.codecompass` when no home directory is known.
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".codecompass"))
        .unwrap_or_else(|| PathBuf::from(".codecompass"))
}

/// Everything both binaries read at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Endpoint and models
    pub llm: LlmConfig,
    /// Index settings
    pub index: IndexConfig,
}

/// On-disk shape of `config.yaml`; every field optional.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    index: Option<IndexFileSection>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    chat_model: Option<String>,
    embedding_model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct IndexFileSection {
    chunk_max_tokens: Option<usize>,
    embedding_dimensions: Option<usize>,
    data_dir: Option<PathBuf>,
}

impl Config {
    /// Resolve the configuration for this process.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (`CODECOMPASS_API_BASE`, `CODECOMPASS_CHAT_MODEL`, ...)
    /// 2. Config file (~/.config/codecompass/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env(|name| env::var(name).ok());

        Ok(config)
    }

    /// Override fields from variables resolved by `lookup` (keys without the prefix
    /// are never queried).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(api_base) = var("API_BASE") {
            self.llm.api_base = api_base;
        }
        if let Some(api_key) = var("API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Some(model) = var("CHAT_MODEL") {
            self.llm.chat_model = model;
        }
        if let Some(model) = var("EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }
        if let Some(tokens) = var("MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.llm.max_tokens = tokens;
        }
        if let Some(temp) = var("TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.llm.temperature = temp;
        }
        if let Some(tokens) = var("CHUNK_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.index.chunk_max_tokens = tokens;
        }
        if let Some(dims) = var("EMBEDDING_DIMENSIONS").and_then(|v| v.parse().ok()) {
            self.index.embedding_dimensions = dims;
        }
        if let Some(dir) = var("DATA_DIR") {
            self.index.data_dir = PathBuf::from(dir);
        }
    }

    /// Read and parse one YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CompassError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML document, filling missing fields with defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| CompassError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.chat_model {
                config.llm.chat_model = model;
            }
            if let Some(model) = llm.embedding_model {
                config.llm.embedding_model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
        }

        if let Some(index) = file_config.index {
            if let Some(tokens) = index.chunk_max_tokens {
                config.index.chunk_max_tokens = tokens;
            }
            if let Some(dims) = index.embedding_dimensions {
                config.index.embedding_dimensions = dims;
            }
            if let Some(dir) = index.data_dir {
                config.index.data_dir = dir;
            }
        }

        Ok(config)
    }

    /// `<config dir>/codecompass/config.yaml`, if the platform has a config dir.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "codecompass")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Reject settings no request could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(CompassError::Config(
                "LLM API base URL is required. Set CODECOMPASS_API_BASE or add llm.api_base to the config file.".to_string(),
            ));
        }

        if self.llm.chat_model.is_empty() {
            return Err(CompassError::Config(
                "Chat model is required. Set CODECOMPASS_CHAT_MODEL or add llm.chat_model to the config file."
                    .to_string(),
            ));
        }

        if self.llm.embedding_model.is_empty() {
            return Err(CompassError::Config(
                "Embedding model is required. Set CODECOMPASS_EMBEDDING_MODEL or add llm.embedding_model to the config file."
                    .to_string(),
            ));
        }

        if self.index.embedding_dimensions == 0 {
            return Err(CompassError::InvalidConfig(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }

        if self.index.chunk_max_tokens == 0 || self.llm.max_tokens == 0 {
            return Err(CompassError::InvalidConfig(
                "token budgets must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.api_base, "http://localhost:11434");
        assert!(config.llm.api_key.is_empty());
        assert_eq!(config.llm.chat_model, "qwen2.5:7b");
        assert_eq!(config.llm.embedding_model, "nomic-embed-text");
        assert_eq!(config.llm.max_tokens, 1024);
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.index.chunk_max_tokens, 512);
        assert_eq!(config.index.embedding_dimensions, 768);
        assert!(config.index.data_dir.ends_with(".codecompass"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut config = Config::default();
        config.llm.api_base.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.embedding_model.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.index.embedding_dimensions = 0;
        assert!(matches!(
            config.validate(),
            Err(CompassError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CODECOMPASS_API_BASE", "http://gpu-box:8000"),
            ("CODECOMPASS_CHAT_MODEL", "llama3"),
            ("CODECOMPASS_EMBEDDING_DIMENSIONS", "1024"),
            ("CODECOMPASS_TEMPERATURE", "not-a-number"),
            ("CODECOMPASS_DATA_DIR", "/var/cache/cc"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.api_base, "http://gpu-box:8000");
        assert_eq!(config.llm.chat_model, "llama3");
        assert_eq!(config.index.embedding_dimensions, 1024);
        // Unparseable numbers leave the default in place.
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.index.data_dir, PathBuf::from("/var/cache/cc"));
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
llm:
  chat_model: mistral
index:
  embedding_dimensions: 384
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.llm.chat_model, "mistral");
        assert_eq!(config.llm.embedding_model, "nomic-embed-text");
        assert_eq!(config.index.embedding_dimensions, 384);
        assert_eq!(config.index.chunk_max_tokens, 512);
    }

    #[test]
    fn test_from_yaml_invalid() {
        let result = Config::from_yaml("llm: [not, a, map]");
        assert!(matches!(result, Err(CompassError::Config(_))));
    }
}
