//! Engine facade: the single entry point front-ends talk to.
//!
//! Owns every component and brings them up in dependency order: embedding
//! client, vector store (checked against the client's dimension), document
//! processor, search engine. Exactly one initialization may be in flight;
//! callers that arrive during `Initializing` await the same outcome.
//! Operations before `Ready` and after shutdown fail with an
//! initialization error.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::{RagError, Result};
use crate::models::{SearchHit, SearchMode};
use crate::processor::{DocumentProcessor, ProcessOutcome, SyncReport};
use crate::search::SearchEngine;
use crate::store::LanceStore;

/// Facade lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Terminated,
}

/// Composite status snapshot, as exposed over the tool-call surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub state: LifecycleState,
    pub uptime_s: u64,
    pub documents_count: usize,
    pub chunks_count: usize,
    pub model_name: String,
    pub healthy: bool,
}

struct Components {
    store: Arc<LanceStore>,
    embedder: Arc<EmbeddingClient>,
    processor: Arc<DocumentProcessor>,
    engine: SearchEngine,
}

pub struct RagEngine {
    config: Config,
    components: tokio::sync::OnceCell<Components>,
    state: RwLock<LifecycleState>,
    started_at: Instant,
}

impl RagEngine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            components: tokio::sync::OnceCell::new(),
            state: RwLock::new(LifecycleState::Uninitialized),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read().expect("state lock poisoned")
    }

    fn set_state(&self, next: LifecycleState) {
        *self.state.write().expect("state lock poisoned") = next;
    }

    /// Bring every component up. Reentrant: concurrent callers share one
    /// in-flight attempt; a completed engine returns immediately.
    pub async fn initialize(&self) -> Result<()> {
        match self.state() {
            LifecycleState::ShuttingDown | LifecycleState::Terminated => {
                return Err(RagError::Initialization(
                    "engine is shut down".to_string(),
                ));
            }
            LifecycleState::Ready => return Ok(()),
            LifecycleState::Uninitialized | LifecycleState::Initializing => {}
        }

        self.set_state(LifecycleState::Initializing);
        let result = self
            .components
            .get_or_try_init(|| async {
                let embedder = Arc::new(EmbeddingClient::from_config(&self.config)?);
                let store = Arc::new(
                    LanceStore::open(&self.config.store_uri(), embedder.dimension()).await?,
                );
                let processor = Arc::new(DocumentProcessor::new(
                    store.clone(),
                    embedder.clone(),
                    &self.config,
                ));
                let engine = SearchEngine::new(store.clone(), embedder.clone(), &self.config);
                info!(
                    "engine ready: model={} dimension={} store={}",
                    embedder.model_name(),
                    embedder.dimension(),
                    self.config.store_uri().display()
                );
                Ok::<_, RagError>(Components {
                    store,
                    embedder,
                    processor,
                    engine,
                })
            })
            .await;

        match result {
            Ok(_) => {
                self.set_state(LifecycleState::Ready);
                Ok(())
            }
            Err(e) => {
                self.set_state(LifecycleState::Uninitialized);
                Err(e)
            }
        }
    }

    fn ready(&self) -> Result<&Components> {
        if self.state() != LifecycleState::Ready {
            return Err(RagError::Initialization(format!(
                "engine is not ready (state: {:?})",
                self.state()
            )));
        }
        self.components
            .get()
            .ok_or_else(|| RagError::Initialization("engine is not ready".to_string()))
    }

    /// Ingest the given files. Per-file failures are collected, not fatal.
    pub async fn add_documents(&self, paths: &[PathBuf]) -> Result<Vec<(PathBuf, Result<ProcessOutcome>)>> {
        let components = self.ready()?;
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let outcome = components.processor.process(path, false).await;
            results.push((path.clone(), outcome));
        }
        Ok(results)
    }

    pub async fn remove_document(&self, path: &Path) -> Result<()> {
        self.ready()?.processor.remove(path).await
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        mode: SearchMode,
    ) -> Result<Vec<SearchHit>> {
        self.ready()?.engine.search(query, top_k, mode).await
    }

    /// Hybrid search with an explicit semantic-vs-keyword fusion weight.
    pub async fn search_weighted(
        &self,
        query: &str,
        top_k: Option<usize>,
        semantic_weight: f32,
    ) -> Result<Vec<SearchHit>> {
        self.ready()?
            .engine
            .search_weighted(query, top_k, semantic_weight)
            .await
    }

    /// Reconcile the store with the configured documents directory.
    pub async fn sync(&self) -> Result<SyncReport> {
        let root = self.config.documents_dir.clone();
        self.ready()?.processor.sync(&root).await
    }

    /// Forward a single path to the processor (watcher entry point).
    pub async fn process_path(&self, path: &Path, force: bool) -> Result<ProcessOutcome> {
        self.ready()?.processor.process(path, force).await
    }

    /// Drop everything and rebuild from the documents directory.
    pub async fn reindex(&self, clear_cache: bool) -> Result<SyncReport> {
        let components = self.ready()?;
        components.store.delete_all().await?;
        if clear_cache {
            components.engine.clear_cache();
        }
        let root = self.config.documents_dir.clone();
        components.processor.sync(&root).await
    }

    /// All docs currently indexed, `doc_id → metadata JSON`.
    pub async fn list_documents(&self) -> Result<std::collections::HashMap<String, String>> {
        self.ready()?.store.list_all_docs().await
    }

    /// Status snapshot with composite health.
    pub async fn info(&self) -> EngineInfo {
        let state = self.state();
        let uptime_s = self.started_at.elapsed().as_secs();

        let Ok(components) = self.ready() else {
            return EngineInfo {
                state,
                uptime_s,
                documents_count: 0,
                chunks_count: 0,
                model_name: self.config.embedding_model.clone(),
                healthy: false,
            };
        };

        let chunks_count = components.store.count_rows().await.unwrap_or(0);
        let documents_count = components.store.count_distinct_docs().await.unwrap_or(0);
        let store_reachable = components.store.count_rows().await.is_ok();
        let embedder_reachable = components.embedder.healthy().await;

        EngineInfo {
            state,
            uptime_s,
            documents_count,
            chunks_count,
            model_name: components.embedder.model_name().to_string(),
            healthy: store_reachable && embedder_reachable,
        }
    }

    /// Reject new work, then terminate. Idempotent.
    pub async fn shutdown(&self) {
        self.set_state(LifecycleState::ShuttingDown);
        info!("engine shutting down");
        self.set_state(LifecycleState::Terminated);
    }
}
