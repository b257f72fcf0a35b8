//! Configuration parsing.
//!
//! Settings come from an optional TOML file (default `./config/rag.toml`)
//! and are then overridden by environment variables:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `RAG_DATA_DIR` | `data.dir` |
//! | `RAG_EMBED_DIM` | `embedding.dims` |
//! | `RAG_EMBED_URL` | `embedding.url` |
//! | `RAG_EMBED_MODEL` | `embedding.model` |
//! | *`embedding.api_key_env`* (default `GROQ_API_KEY`) | the remote API key |
//!
//! A missing API key is not an error: the engine then runs with the
//! deterministic fallback provider for the whole corpus.
//!
//! The resulting [`Config`] is passed explicitly to every component; nothing
//! reads paths or settings from global state.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Directory holding `chunks.jsonl`, `embeddings.npy` and `index.flat`.
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl DataConfig {
    pub fn chunks_path(&self) -> PathBuf {
        self.dir.join("chunks.jsonl")
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.dir.join("embeddings.npy")
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join("index.flat")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_words: default_chunk_words(),
            overlap_words: default_overlap_words(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_chunk_words() -> usize {
    400
}
fn default_overlap_words() -> usize {
    50
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string(), "**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks the orchestrator pulls into an answer context.
    #[serde(default = "default_context_k")]
    pub context_k: usize,
    /// Per-chunk character budget inside the answer context.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
    /// Default `top_k` for plain searches.
    #[serde(default = "default_search_k")]
    pub search_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            context_k: default_context_k(),
            context_chars: default_context_chars(),
            search_k: default_search_k(),
        }
    }
}

fn default_context_k() -> usize {
    4
}
fn default_context_chars() -> usize {
    500
}
fn default_search_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of an OpenAI-compatible API; requests go to `{url}/embeddings`.
    #[serde(default = "default_url")]
    pub url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Resolved from `api_key_env`, never from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dims: default_dims(),
            model: default_model(),
            url: default_url(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_dims() -> usize {
    512
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// The remote API key, if one is set and not blank.
    pub fn remote_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory that uploads are written to and that builds and summaries
    /// read from. Request paths never leave it.
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    /// Browser origins allowed by CORS. `"*"` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            docs_dir: default_docs_dir(),
            allowed_origins: default_allowed_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_docs_dir() -> PathBuf {
    PathBuf::from("./uploaded_docs")
}
fn default_allowed_origins() -> Vec<String> {
    [
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:3001",
        "http://127.0.0.1:3001",
    ]
    .iter()
    .map(|o| o.to_string())
    .collect()
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Config {
    /// Build a config rooted at `data_dir`, with defaults everywhere else.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Config::default();
        config.data.dir = data_dir.into();
        config
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("RAG_DATA_DIR") {
            self.data.dir = PathBuf::from(dir);
        }
        if let Some(dims) = lookup("RAG_EMBED_DIM") {
            self.embedding.dims = dims
                .trim()
                .parse()
                .with_context(|| format!("RAG_EMBED_DIM is not a number: '{}'", dims))?;
        }
        if let Some(url) = lookup("RAG_EMBED_URL") {
            self.embedding.url = url;
        }
        if let Some(model) = lookup("RAG_EMBED_MODEL") {
            self.embedding.model = model;
        }
        self.embedding.api_key = lookup(&self.embedding.api_key_env).filter(|k| !k.is_empty());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.dims == 0 {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.timeout_secs == 0 {
            anyhow::bail!("embedding.timeout_secs must be > 0");
        }
        if self.chunking.chunk_words == 0 {
            anyhow::bail!("chunking.chunk_words must be > 0");
        }
        if self.chunking.overlap_words >= self.chunking.chunk_words {
            anyhow::bail!("chunking.overlap_words must be smaller than chunking.chunk_words");
        }
        if self.retrieval.context_k == 0 || self.retrieval.search_k == 0 {
            anyhow::bail!("retrieval.context_k and retrieval.search_k must be >= 1");
        }
        if self.retrieval.context_chars == 0 {
            anyhow::bail!("retrieval.context_chars must be > 0");
        }
        for origin in &self.server.allowed_origins {
            if origin != "*" && !(origin.starts_with("http://") || origin.starts_with("https://")) {
                anyhow::bail!(
                    "server.allowed_origins entry '{}' must be \"*\" or an http(s) origin",
                    origin
                );
            }
        }
        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("server.max_upload_bytes must be > 0");
        }
        Ok(())
    }
}

/// Parse a TOML document into a [`Config`] without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    Ok(config)
}

/// Load configuration from `path` (if it exists), apply environment
/// overrides and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found; using defaults");
        Config::default()
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.embedding.dims, 512);
        assert_eq!(config.retrieval.context_k, 4);
        assert_eq!(config.retrieval.context_chars, 500);
        assert_eq!(config.data.chunks_path(), PathBuf::from("./data/chunks.jsonl"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let config = parse_config(
            r#"
[data]
dir = "/srv/rag"

[embedding]
dims = 1536
batch_size = 8
"#,
        )
        .unwrap();
        assert_eq!(config.data.index_path(), PathBuf::from("/srv/rag/index.flat"));
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.embedding.batch_size, 8);
        assert_eq!(config.embedding.timeout_secs, 30);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("RAG_DATA_DIR", "/tmp/rag"),
                ("RAG_EMBED_DIM", "256"),
                ("GROQ_API_KEY", "sk-test"),
            ]))
            .unwrap();
        assert_eq!(config.data.dir, PathBuf::from("/tmp/rag"));
        assert_eq!(config.embedding.dims, 256);
        assert_eq!(config.embedding.remote_api_key(), Some("sk-test"));
    }

    #[test]
    fn test_missing_key_means_no_credentials() {
        let mut config = Config::default();
        config.apply_env(env(&[])).unwrap();
        assert!(config.embedding.remote_api_key().is_none());
    }

    #[test]
    fn test_custom_key_env() {
        let mut config = parse_config("[embedding]\napi_key_env = \"MY_KEY\"").unwrap();
        config
            .apply_env(env(&[("GROQ_API_KEY", "ignored"), ("MY_KEY", "k")]))
            .unwrap();
        assert_eq!(config.embedding.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_bad_dim_env() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("RAG_EMBED_DIM", "lots")])).is_err());
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut config = Config::default();
        config.chunking.overlap_words = config.chunking.chunk_words;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_dims() {
        let mut config = Config::default();
        config.embedding.dims = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_origins_are_local() {
        let config = Config::default();
        assert!(config
            .server
            .allowed_origins
            .iter()
            .all(|o| o.starts_with("http://localhost:") || o.starts_with("http://127.0.0.1:")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_origin() {
        let config = parse_config("[server]\nallowed_origins = [\"localhost:3000\"]").unwrap();
        assert!(config.validate().is_err());
    }
}
