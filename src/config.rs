//! Configuration parsing and validation.
//!
//! ragdock is configured via a TOML file (default: `./ragdock.toml`) holding
//! a flat set of named options. Unknown option names are rejected at parse
//! time, out-of-range values at validation time.
//!
//! ```toml
//! documents_dir = "./documents"
//! data_dir = "./data"
//! embedding_provider = "endpoint"
//! embedding_endpoint = "http://localhost:11434/v1/embeddings"
//! embedding_model = "multilingual-e5-small"
//! embedding_dimension = 384
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Filesystem root to sync and watch.
    pub documents_dir: PathBuf,
    /// Parent directory for the vector store.
    pub data_dir: PathBuf,
    /// Overrides the default `{data_dir}/lancedb` store location.
    #[serde(default)]
    pub vector_store_uri: Option<PathBuf>,

    /// `"endpoint"` (HTTP embedding API) or `"hashed"` (deterministic, offline).
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    /// Base URL of the embeddings endpoint (OpenAI-compatible wire shape).
    #[serde(default)]
    pub embedding_endpoint: Option<String>,
    /// Model identity sent to the embedding endpoint.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Vector length produced by the model.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    /// Chunks per embedding request.
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    /// Concurrent embedding requests within one batch.
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,

    /// Chunker target size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap carried between adjacent chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Pieces shorter than this are merged into a neighbor.
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    /// FS event debounce window in milliseconds.
    #[serde(default = "default_watcher_debounce_ms")]
    pub watcher_debounce_ms: u64,
    /// Max outstanding process requests before rejection.
    #[serde(default = "default_watcher_max_queue")]
    pub watcher_max_queue: usize,
    /// Parallel `process` tasks during sync.
    #[serde(default = "default_max_concurrent_processing")]
    pub max_concurrent_processing: usize,

    /// Cosine-similarity floor for semantic results, in [0, 1].
    #[serde(default = "default_semantic_score_threshold")]
    pub semantic_score_threshold: f32,
    /// Reciprocal Rank Fusion constant.
    #[serde(default = "default_hybrid_rrf_k")]
    pub hybrid_rrf_k: usize,
    /// Result count used when the caller omits `top_k`.
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,

    /// Bind address for the tool-call HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_embedding_provider() -> String {
    "endpoint".to_string()
}
fn default_embedding_model() -> String {
    "multilingual-e5-small".to_string()
}
fn default_embedding_dimension() -> usize {
    384
}
fn default_embedding_batch_size() -> usize {
    12
}
fn default_embedding_concurrency() -> usize {
    4
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_min_chunk_size() -> usize {
    100
}
fn default_watcher_debounce_ms() -> u64 {
    200
}
fn default_watcher_max_queue() -> usize {
    50
}
fn default_max_concurrent_processing() -> usize {
    2
}
fn default_semantic_score_threshold() -> f32 {
    0.3
}
fn default_hybrid_rrf_k() -> usize {
    60
}
fn default_top_k() -> usize {
    5
}
fn default_bind() -> String {
    "127.0.0.1:9134".to_string()
}

impl Config {
    /// Resolved location of the LanceDB directory.
    pub fn store_uri(&self) -> PathBuf {
        self.vector_store_uri
            .clone()
            .unwrap_or_else(|| self.data_dir.join("lancedb"))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunk_size == 0 {
        anyhow::bail!("chunk_size must be > 0");
    }
    if config.chunk_overlap >= config.chunk_size {
        anyhow::bail!("chunk_overlap must be < chunk_size");
    }
    if config.min_chunk_size > config.chunk_size {
        anyhow::bail!("min_chunk_size must be <= chunk_size");
    }
    if config.embedding_dimension == 0 {
        anyhow::bail!("embedding_dimension must be > 0");
    }
    if config.embedding_batch_size == 0 {
        anyhow::bail!("embedding_batch_size must be > 0");
    }
    if config.embedding_concurrency == 0 {
        anyhow::bail!("embedding_concurrency must be > 0");
    }
    if config.top_k_default == 0 {
        anyhow::bail!("top_k_default must be > 0");
    }
    if !(0.0..=1.0).contains(&config.semantic_score_threshold) {
        anyhow::bail!("semantic_score_threshold must be in [0.0, 1.0]");
    }
    if config.hybrid_rrf_k == 0 {
        anyhow::bail!("hybrid_rrf_k must be > 0");
    }
    match config.embedding_provider.as_str() {
        "endpoint" => {
            if config.embedding_endpoint.is_none() {
                anyhow::bail!(
                    "embedding_endpoint must be set when embedding_provider is 'endpoint'"
                );
            }
        }
        "hashed" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be endpoint or hashed.",
            other
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> String {
        r#"
documents_dir = "/tmp/docs"
data_dir = "/tmp/data"
embedding_provider = "hashed"
"#
        .to_string()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = toml::from_str(&minimal_toml()).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.embedding_batch_size, 12);
        assert_eq!(config.embedding_concurrency, 4);
        assert_eq!(config.watcher_debounce_ms, 200);
        assert_eq!(config.watcher_max_queue, 50);
        assert_eq!(config.hybrid_rrf_k, 60);
        assert_eq!(config.store_uri(), PathBuf::from("/tmp/data/lancedb"));
    }

    #[test]
    fn unknown_option_rejected() {
        let toml = format!("{}\nshiny_new_knob = 3\n", minimal_toml());
        assert!(toml::from_str::<Config>(&toml).is_err());
    }

    #[test]
    fn endpoint_provider_requires_url() {
        let toml = minimal_toml().replace("hashed", "endpoint");
        let config: Config = toml::from_str(&toml).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let toml = format!("{}\nchunk_size = 50\nchunk_overlap = 50\n", minimal_toml());
        let config: Config = toml::from_str(&toml).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn vector_store_uri_overrides_default() {
        let toml = format!("{}\nvector_store_uri = \"/elsewhere/vs\"\n", minimal_toml());
        let config: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.store_uri(), PathBuf::from("/elsewhere/vs"));
    }
}
