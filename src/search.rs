//! Query engine: semantic, keyword, and hybrid retrieval.
//!
//! - **Semantic** — cosine similarity over stored vectors, filtered by a
//!   configured score floor. Query vectors are cached (LRU) by query text.
//! - **Keyword** — FTS routed by query language: pre-segmented queries hit
//!   the whitespace-analyzed `tokenized_text` column, everything else the
//!   English-analyzed `text` column.
//! - **Hybrid** — both sublists fetched in parallel at `2 × top_k`, merged
//!   by `(doc_id, ordinal)`, ranked with Reciprocal Rank Fusion. A failed
//!   sublist degrades the query to semantic-only rather than failing it.

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::{RagError, Result};
use crate::language;
use crate::models::{ChunkRecord, DocumentMetadata, SearchHit, SearchMode};
use crate::store::{FtsColumn, LanceStore};

/// Cached query vectors, keyed by the raw query string.
const QUERY_CACHE_CAPACITY: usize = 1000;

pub struct SearchEngine {
    store: Arc<LanceStore>,
    embedder: Arc<EmbeddingClient>,
    score_threshold: f32,
    rrf_k: usize,
    top_k_default: usize,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl SearchEngine {
    pub fn new(store: Arc<LanceStore>, embedder: Arc<EmbeddingClient>, config: &Config) -> Self {
        Self {
            store,
            embedder,
            score_threshold: config.semantic_score_threshold,
            rrf_k: config.hybrid_rrf_k,
            top_k_default: config.top_k_default,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        }
    }

    /// Execute a query. `top_k = None` uses the configured default.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        mode: SearchMode,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(RagError::Validation("query must not be empty".to_string()));
        }
        let top_k = top_k.unwrap_or(self.top_k_default);
        if top_k == 0 {
            return Err(RagError::Validation("top_k must be > 0".to_string()));
        }

        match mode {
            SearchMode::Semantic => self.semantic(query, top_k).await,
            SearchMode::Keyword => self.keyword(query, top_k).await,
            SearchMode::Hybrid => self.hybrid(query, top_k, 0.5).await,
        }
    }

    /// Hybrid search with an explicit semantic weight in [0, 1].
    ///
    /// `0.5` is the balanced default; other values scale each sublist's
    /// RRF contribution, shading the fusion toward one ranker.
    pub async fn search_weighted(
        &self,
        query: &str,
        top_k: Option<usize>,
        semantic_weight: f32,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(RagError::Validation("query must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&semantic_weight) {
            return Err(RagError::Validation(
                "semantic_weight must be in [0, 1]".to_string(),
            ));
        }
        let top_k = top_k.unwrap_or(self.top_k_default);
        if top_k == 0 {
            return Err(RagError::Validation("top_k must be > 0".to_string()));
        }
        self.hybrid(query, top_k, semantic_weight).await
    }

    /// Drop all cached query vectors.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.clear();
        }
    }

    async fn query_vector(&self, query: &str) -> Result<Vec<f32>> {
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(vector) = cache.get(query) {
                return Ok(vector.clone());
            }
        }
        let vector = self.embedder.embed_query(query).await?;
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(query.to_string(), vector.clone());
        }
        Ok(vector)
    }

    async fn semantic(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let candidates = self.semantic_candidates(query, top_k).await?;
        Ok(candidates
            .into_iter()
            .filter(|(_, score)| *score >= self.score_threshold)
            .map(|(record, score)| to_hit(record, score))
            .collect())
    }

    async fn semantic_candidates(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>> {
        let vector = self.query_vector(query).await?;
        self.store.semantic_search(&vector, top_k).await
    }

    async fn keyword(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let candidates = self.keyword_candidates(query, top_k).await?;
        Ok(candidates
            .into_iter()
            .map(|(record, score)| to_hit(record, score))
            .collect())
    }

    async fn keyword_candidates(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>> {
        let lowered = query.to_lowercase();
        let (tag, _) = language::detect(&lowered);
        if language::requires_pretokenization(tag) {
            let segmented = language::tokenized_form(&lowered, tag);
            self.store
                .fulltext_search(&segmented, FtsColumn::TokenizedText, top_k)
                .await
        } else {
            self.store
                .fulltext_search(&lowered, FtsColumn::Text, top_k)
                .await
        }
    }

    async fn hybrid(
        &self,
        query: &str,
        top_k: usize,
        semantic_weight: f32,
    ) -> Result<Vec<SearchHit>> {
        let candidate_k = top_k * 2;
        let (semantic, keyword) = tokio::join!(
            self.semantic_candidates(query, candidate_k),
            self.keyword_candidates(query, candidate_k),
        );

        let (semantic, keyword) = match (semantic, keyword) {
            (Ok(s), Ok(k)) => (s, k),
            (Ok(s), Err(e)) => {
                warn!("keyword sublist failed, degrading to semantic-only: {e}");
                (s, Vec::new())
            }
            (Err(e), Ok(k)) => {
                warn!("semantic sublist failed, using keyword results only: {e}");
                (Vec::new(), k)
            }
            (Err(se), Err(_ke)) => {
                return Err(RagError::Search(format!("both sublists failed: {se}")));
            }
        };

        let weights = [2.0 * semantic_weight, 2.0 * (1.0 - semantic_weight)];
        let fused = rrf_fuse(&[semantic, keyword], &weights, self.rrf_k);
        Ok(fused
            .into_iter()
            .take(top_k)
            .map(|(record, score)| to_hit(record, score))
            .collect())
    }
}

fn to_hit(record: ChunkRecord, score: f32) -> SearchHit {
    let metadata = DocumentMetadata::from_json(&record.metadata);
    SearchHit {
        chunk_id: record.chunk_id,
        doc_id: record.doc_id,
        ordinal: record.ordinal,
        text: record.text,
        score,
        metadata,
    }
}

/// Reciprocal Rank Fusion over ranked candidate lists.
///
/// Each record appearing at 1-indexed position `r` in list `i` contributes
/// `weight[i] / (k + r)`; absent lists contribute nothing. With all
/// weights at 1 this is plain RRF. Output is sorted by fused score, ties
/// broken by `(doc_id, ordinal)` for determinism.
fn rrf_fuse(
    lists: &[Vec<(ChunkRecord, f32)>],
    weights: &[f32],
    k: usize,
) -> Vec<(ChunkRecord, f32)> {
    let mut scores: HashMap<(String, usize), f32> = HashMap::new();
    let mut records: HashMap<(String, usize), ChunkRecord> = HashMap::new();

    for (list, weight) in lists.iter().zip(weights.iter().chain(std::iter::repeat(&1.0))) {
        for (rank, (record, _)) in list.iter().enumerate() {
            let key = (record.doc_id.clone(), record.ordinal);
            let contribution = weight / (k as f32 + rank as f32 + 1.0);
            *scores.entry(key.clone()).or_insert(0.0) += contribution;
            records.entry(key).or_insert_with(|| record.clone());
        }
    }

    let mut fused: Vec<(ChunkRecord, f32)> = records
        .into_iter()
        .map(|(key, record)| {
            let score = scores[&key];
            (record, score)
        })
        .collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.doc_id.cmp(&b.0.doc_id))
            .then_with(|| a.0.ordinal.cmp(&b.0.ordinal))
    });
    fused
}
