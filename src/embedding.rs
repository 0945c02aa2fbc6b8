//! Embedding client: the adapter between the engine and the model runner.
//!
//! Two backends sit behind one trait:
//! - **`EndpointBackend`** — calls an OpenAI-compatible `/v1/embeddings`
//!   endpoint with batching, retry, and exponential backoff.
//! - **`HashedBackend`** — deterministic bag-of-words feature hashing; no
//!   network, no model. Used by the test suite and for offline smoke runs.
//!
//! Vector normalization happens in exactly one place, on the way out of
//! [`EmbeddingClient::embed_passages`]. Everything downstream (the store,
//! the search engine) assumes unit-norm vectors and treats cosine distance
//! as the only metric.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::Config;
use crate::error::{RagError, Result};

/// Retry attempts for a single embedding request.
const MAX_RETRIES: u32 = 3;
/// Per-request budget.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A concrete embedding implementation. Returns raw (not necessarily
/// normalized) vectors; the client wrapper owns normalization.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Model identity recorded on every chunk at ingest time.
    fn model_name(&self) -> &str;
    /// Vector length the backend produces.
    fn dimension(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Public embedding client. Owns the backend and the normalization site.
pub struct EmbeddingClient {
    backend: Box<dyn EmbeddingBackend>,
}

impl EmbeddingClient {
    pub fn new(backend: Box<dyn EmbeddingBackend>) -> Self {
        Self { backend }
    }

    /// Build the backend selected by the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend: Box<dyn EmbeddingBackend> = match config.embedding_provider.as_str() {
            "endpoint" => {
                let url = config.embedding_endpoint.clone().ok_or_else(|| {
                    RagError::Initialization("embedding_endpoint is not configured".to_string())
                })?;
                Box::new(EndpointBackend::new(
                    url,
                    config.embedding_model.clone(),
                    config.embedding_dimension,
                )?)
            }
            "hashed" => Box::new(HashedBackend::new(config.embedding_dimension)),
            other => {
                return Err(RagError::Initialization(format!(
                    "unknown embedding provider: {other}"
                )))
            }
        };
        Ok(Self::new(backend))
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    /// Embed many passages. Output vectors are unit-norm; this is the only
    /// normalization site in the crate.
    pub async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = self.backend.embed(texts).await?;
        for (i, vector) in vectors.iter_mut().enumerate() {
            if vector.len() != self.backend.dimension() {
                return Err(RagError::Embedding(format!(
                    "backend returned dimension {} for input {} (expected {})",
                    vector.len(),
                    i,
                    self.backend.dimension()
                )));
            }
            normalize_in_place(vector);
        }
        Ok(vectors)
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_passages(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("empty embedding response".to_string()))
    }

    /// Reachability probe for composite health reporting.
    pub async fn healthy(&self) -> bool {
        self.embed_passages(&["ping".to_string()]).await.is_ok()
    }
}

fn normalize_in_place(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two equal-length vectors; 0.0 on mismatch.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

// ============ Endpoint backend ============

/// Calls an OpenAI-compatible embeddings endpoint.
pub struct EndpointBackend {
    url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl EndpointBackend {
    pub fn new(url: String, model: String, dimension: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RagError::Initialization(format!("http client: {e}")))?;
        Ok(Self {
            url,
            model,
            dimension,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for EndpointBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&self.url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| RagError::Embedding(e.to_string()))?;
                        return parse_embeddings_response(&json);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let text = response.text().await.unwrap_or_default();
                        last_err = Some(RagError::Embedding(format!(
                            "embedding endpoint error {status}: {text}"
                        )));
                        continue;
                    }

                    // Other client errors: don't retry
                    let text = response.text().await.unwrap_or_default();
                    return Err(RagError::Embedding(format!(
                        "embedding endpoint error {status}: {text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(RagError::Embedding(format!(
                        "embedding endpoint unreachable at {}: {e}",
                        self.url
                    )));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::Embedding("embedding failed after retries".to_string())))
    }
}

fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::Embedding("invalid response: missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| RagError::Embedding("invalid response: missing embedding".to_string()))?;
        let vector: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vector);
    }
    Ok(embeddings)
}

// ============ Hashed backend ============

/// Deterministic bag-of-words feature hashing.
///
/// Each lowercase word maps to a pseudo-random direction derived from its
/// SHA-256 digest; a text's raw vector is the sum of its word directions.
/// Identical texts embed identically, and texts sharing vocabulary land
/// closer together, which is enough structure for ranking tests without a
/// model in the loop.
pub struct HashedBackend {
    dimension: usize,
}

impl HashedBackend {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn word_direction(&self, word: &str) -> Vec<f32> {
        let mut direction = Vec::with_capacity(self.dimension);
        let mut counter = 0u32;
        while direction.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(word.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for byte in digest.iter() {
                if direction.len() == self.dimension {
                    break;
                }
                // Map 0..=255 onto [-1, 1].
                direction.push(*byte as f32 / 127.5 - 1.0);
            }
            counter += 1;
        }
        direction
    }
}

#[async_trait]
impl EmbeddingBackend for HashedBackend {
    fn model_name(&self) -> &str {
        "hashed-bow"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let mut acc = vec![0.0f32; self.dimension];
            for word in text.to_lowercase().unicode_words() {
                for (slot, value) in acc.iter_mut().zip(self.word_direction(word)) {
                    *slot += value;
                }
            }
            out.push(acc);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed_client(dimension: usize) -> EmbeddingClient {
        EmbeddingClient::new(Box::new(HashedBackend::new(dimension)))
    }

    #[tokio::test]
    async fn passages_come_back_unit_norm() {
        let client = hashed_client(64);
        let vectors = client
            .embed_passages(&["one small step".to_string(), "데이터베이스".to_string()])
            .await
            .unwrap();
        for vector in &vectors {
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
            assert_eq!(vector.len(), 64);
        }
    }

    #[tokio::test]
    async fn identical_texts_embed_identically() {
        let client = hashed_client(32);
        let a = client.embed_query("exactly the same words").await.unwrap();
        let b = client.embed_query("exactly the same words").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn shared_vocabulary_raises_similarity() {
        let client = hashed_client(128);
        let doc = client
            .embed_query("vector databases store high dimensional data")
            .await
            .unwrap();
        let related = client
            .embed_query("what stores high dimensional data")
            .await
            .unwrap();
        let unrelated = client
            .embed_query("quarterly pumpkin harvest report")
            .await
            .unwrap();
        assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let client = hashed_client(16);
        assert!(client.embed_passages(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hashed_backend_reports_healthy() {
        let client = hashed_client(16);
        assert!(client.healthy().await);
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn parse_openai_wire_shape() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] }
            ]
        });
        let parsed = parse_embeddings_response(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].len(), 2);
    }

    #[test]
    fn parse_rejects_missing_data() {
        let json = serde_json::json!({ "oops": true });
        assert!(parse_embeddings_response(&json).is_err());
    }
}
