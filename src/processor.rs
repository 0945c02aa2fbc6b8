//! Document processor: keeps the store in step with the filesystem.
//!
//! The maintained invariant: for every managed file, the set of records
//! with its `doc_id` equals the chunking of the file's current content.
//! Updates are delete-then-insert; the gap between the two is a documented
//! window where the document is absent and readers are expected to
//! tolerate it.
//!
//! At-most-once per path is enforced with an in-memory in-flight set: a
//! second `process` on a path already being worked returns immediately.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunker::{self, ChunkParams};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::{FileErrorKind, RagError, Result};
use crate::language;
use crate::models::{chunk_id_for, derive_doc_id, ChunkRecord, DocumentMetadata, FileFingerprint};
use crate::reader;
use crate::store::LanceStore;

/// Per-file read budget.
const READ_TIMEOUT: Duration = Duration::from_secs(60);
/// Budget for embedding one document's batch set.
const EMBED_BATCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Chunking attempts before giving up on a file.
const CHUNK_ATTEMPTS: usize = 3;

/// What `process` did for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Chunks were (re)written; carries the new chunk count.
    Indexed(usize),
    /// Fingerprint matched the stored metadata; zero writes.
    Unchanged,
    /// Another task already holds this path; zero writes.
    InFlight,
}

/// Counters for one `sync` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub indexed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub removed: usize,
}

pub struct DocumentProcessor {
    store: Arc<LanceStore>,
    embedder: Arc<EmbeddingClient>,
    chunk_params: ChunkParams,
    embed_batch_size: usize,
    embed_concurrency: usize,
    sync_concurrency: usize,
    in_flight: Mutex<HashSet<PathBuf>>,
}

/// Removes a path from the in-flight set when the processing future is
/// dropped, completed or cancelled alike.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.path);
        }
    }
}

impl DocumentProcessor {
    pub fn new(store: Arc<LanceStore>, embedder: Arc<EmbeddingClient>, config: &Config) -> Self {
        Self {
            store,
            embedder,
            chunk_params: ChunkParams {
                target_size: config.chunk_size,
                overlap: config.chunk_overlap,
                min_size: config.min_chunk_size,
            },
            embed_batch_size: config.embedding_batch_size,
            embed_concurrency: config.embedding_concurrency,
            sync_concurrency: config.max_concurrent_processing.max(1),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<LanceStore> {
        &self.store
    }

    /// Ingest one file. See module docs for the at-most-once and
    /// delete-then-insert semantics.
    pub async fn process(&self, path: &Path, force: bool) -> Result<ProcessOutcome> {
        let key = path.to_path_buf();
        {
            let mut set = self
                .in_flight
                .lock()
                .map_err(|_| RagError::Cancelled)?;
            if !set.insert(key.clone()) {
                debug!("{} already in flight, skipping", path.display());
                return Ok(ProcessOutcome::InFlight);
            }
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            path: key,
        };

        self.process_locked(path, force).await
    }

    async fn process_locked(&self, path: &Path, force: bool) -> Result<ProcessOutcome> {
        let doc_id = derive_doc_id(path);

        let fingerprint = FileFingerprint::of(path).map_err(|e| {
            RagError::file(path, FileErrorKind::Unreadable, e.to_string())
        })?;

        if !force {
            if let Some(json) = self.store.doc_metadata(&doc_id).await? {
                if let Some(meta) = DocumentMetadata::from_json(&json) {
                    if fingerprint.matches(&meta) {
                        debug!("{} unchanged, skipping", path.display());
                        return Ok(ProcessOutcome::Unchanged);
                    }
                }
            }
        }

        let document = reader::load(path, READ_TIMEOUT).await?;
        let chunks = self
            .chunk_with_retry(path, document.text, document.kind)
            .await?;
        if chunks.is_empty() {
            // An empty file has an empty record set; make the store agree.
            self.store.delete_by_doc(&doc_id).await?;
            return Ok(ProcessOutcome::Indexed(0));
        }

        let records = self
            .build_records(path, &doc_id, &fingerprint, chunks)
            .await?;
        let count = records.len();

        // Update primitive: the document is absent between these two calls.
        self.store.delete_by_doc(&doc_id).await?;
        self.store.insert(&records).await?;

        info!("indexed {} ({count} chunks)", path.display());
        Ok(ProcessOutcome::Indexed(count))
    }

    async fn chunk_with_retry(
        &self,
        path: &Path,
        text: String,
        kind: chunker::ContentKind,
    ) -> Result<Vec<String>> {
        let params = self.chunk_params;
        let mut last_err = String::new();
        for attempt in 0..CHUNK_ATTEMPTS {
            let text = text.clone();
            match tokio::task::spawn_blocking(move || chunker::chunk_text(&text, kind, &params))
                .await
            {
                Ok(chunks) => return Ok(chunks),
                Err(e) => {
                    warn!("chunking attempt {} failed: {e}", attempt + 1);
                    last_err = e.to_string();
                }
            }
        }
        Err(RagError::file(
            path,
            FileErrorKind::ParseFailure,
            format!("chunking failed after {CHUNK_ATTEMPTS} attempts: {last_err}"),
        ))
    }

    async fn build_records(
        &self,
        path: &Path,
        doc_id: &str,
        fingerprint: &FileFingerprint,
        chunks: Vec<String>,
    ) -> Result<Vec<ChunkRecord>> {
        let total = chunks.len();
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let metadata = DocumentMetadata {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_path: canonical.to_string_lossy().into_owned(),
            file_size: fingerprint.size,
            file_hash: fingerprint.content_hash.clone(),
            modified_at: fingerprint.modified_at,
            indexed_at: chrono::Utc::now(),
            chunk_total: total,
        }
        .to_json();

        let vectors = self.embed_chunks(path, &chunks).await?;
        let model_name = self.embedder.model_name().to_string();

        let mut records = Vec::with_capacity(total);
        for (ordinal, (text, vector)) in chunks.into_iter().zip(vectors).enumerate() {
            let (tag, _confidence) = language::detect(&text);
            let tokenized_text = language::tokenized_form(&text, tag);
            records.push(ChunkRecord {
                chunk_id: chunk_id_for(doc_id, ordinal),
                doc_id: doc_id.to_string(),
                ordinal,
                text,
                tokenized_text,
                language: tag.to_string(),
                vector,
                model_name: model_name.clone(),
                metadata: metadata.clone(),
            });
        }
        Ok(records)
    }

    /// Embed all chunks in request-sized batches, up to the configured
    /// number of requests in flight, under a whole-batch budget.
    async fn embed_chunks(&self, path: &Path, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<Vec<String>> = chunks
            .chunks(self.embed_batch_size)
            .map(|b| b.to_vec())
            .collect();

        let embedder = self.embedder.clone();
        let work = stream::iter(batches)
            .map(|batch| {
                let embedder = embedder.clone();
                async move { embedder.embed_passages(&batch).await }
            })
            .buffered(self.embed_concurrency)
            .collect::<Vec<Result<Vec<Vec<f32>>>>>();

        let results = tokio::time::timeout(EMBED_BATCH_TIMEOUT, work)
            .await
            .map_err(|_| {
                RagError::file(
                    path,
                    FileErrorKind::EmbeddingFailure,
                    format!("embedding exceeded {}s", EMBED_BATCH_TIMEOUT.as_secs()),
                )
            })?;

        let mut vectors = Vec::with_capacity(chunks.len());
        for result in results {
            match result {
                Ok(batch) => vectors.extend(batch),
                Err(e) => {
                    return Err(RagError::file(
                        path,
                        FileErrorKind::EmbeddingFailure,
                        e.to_string(),
                    ))
                }
            }
        }
        Ok(vectors)
    }

    /// Drop a document by source path.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        let doc_id = derive_doc_id(path);
        self.store.delete_by_doc(&doc_id).await?;
        info!("removed {}", path.display());
        Ok(())
    }

    /// Reconcile the store with the directory tree under `root`:
    /// process every supported file, then drop documents whose source file
    /// no longer resolves. Single-file failures are logged, not fatal.
    pub async fn sync(&self, root: &Path) -> Result<SyncReport> {
        let files = enumerate_supported(root);
        let mut report = SyncReport::default();

        let outcomes = stream::iter(files)
            .map(|path| async move {
                let outcome = self.process(&path, false).await;
                (path, outcome)
            })
            .buffer_unordered(self.sync_concurrency)
            .collect::<Vec<_>>()
            .await;

        for (path, outcome) in outcomes {
            match outcome {
                Ok(ProcessOutcome::Indexed(_)) => report.indexed += 1,
                Ok(ProcessOutcome::Unchanged) => report.unchanged += 1,
                Ok(ProcessOutcome::InFlight) => {}
                Err(e) => {
                    warn!("sync: failed to process {}: {e}", path.display());
                    report.failed += 1;
                }
            }
        }

        // Removal pass: anything indexed whose file is gone.
        for (doc_id, json) in self.store.list_all_docs().await? {
            let still_there = DocumentMetadata::from_json(&json)
                .map(|meta| Path::new(&meta.file_path).is_file())
                .unwrap_or(false);
            if !still_there {
                if let Err(e) = self.store.delete_by_doc(&doc_id).await {
                    warn!("sync: failed to drop vanished doc {doc_id}: {e}");
                } else {
                    report.removed += 1;
                }
            }
        }

        info!(
            "sync complete: {} indexed, {} unchanged, {} failed, {} removed",
            report.indexed, report.unchanged, report.failed, report.removed
        );
        Ok(report)
    }
}

/// Supported files under `root`, tolerating entries that vanish mid-walk.
fn enumerate_supported(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| reader::is_supported(path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedBackend;

    fn test_config(dir: &Path) -> Config {
        let toml = format!(
            r#"
documents_dir = "{0}/docs"
data_dir = "{0}/data"
embedding_provider = "hashed"
embedding_dimension = 64
chunk_size = 200
chunk_overlap = 20
min_chunk_size = 10
"#,
            dir.display()
        );
        toml::from_str(&toml).unwrap()
    }

    async fn setup(dir: &Path) -> (DocumentProcessor, PathBuf) {
        let config = test_config(dir);
        let docs = config.documents_dir.clone();
        std::fs::create_dir_all(&docs).unwrap();
        let store = Arc::new(
            LanceStore::open(&config.store_uri(), config.embedding_dimension)
                .await
                .unwrap(),
        );
        let embedder = Arc::new(EmbeddingClient::new(Box::new(HashedBackend::new(
            config.embedding_dimension,
        ))));
        (DocumentProcessor::new(store, embedder, &config), docs)
    }

    #[tokio::test]
    async fn process_indexes_a_new_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (processor, docs) = setup(tmp.path()).await;
        let path = docs.join("a.txt");
        std::fs::write(&path, "Vector databases store high-dimensional data.").unwrap();

        let outcome = processor.process(&path, false).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Indexed(n) if n >= 1));
        assert!(processor.store().has_doc(&derive_doc_id(&path)).await.unwrap());
    }

    #[tokio::test]
    async fn reprocess_unchanged_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let (processor, docs) = setup(tmp.path()).await;
        let path = docs.join("a.txt");
        std::fs::write(&path, "Some stable content that does not change.").unwrap();

        processor.process(&path, false).await.unwrap();
        let rows_before = processor.store().count_rows().await.unwrap();

        let outcome = processor.process(&path, false).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Unchanged);
        assert_eq!(processor.store().count_rows().await.unwrap(), rows_before);
    }

    #[tokio::test]
    async fn force_reprocesses_unchanged_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (processor, docs) = setup(tmp.path()).await;
        let path = docs.join("a.txt");
        std::fs::write(&path, "Some stable content.").unwrap();

        processor.process(&path, false).await.unwrap();
        let outcome = processor.process(&path, true).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Indexed(_)));
    }

    #[tokio::test]
    async fn modified_file_replaces_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let (processor, docs) = setup(tmp.path()).await;
        let path = docs.join("a.txt");
        std::fs::write(&path, "old content entirely").unwrap();
        processor.process(&path, false).await.unwrap();

        std::fs::write(&path, "new content entirely").unwrap();
        processor.process(&path, false).await.unwrap();

        let doc_id = derive_doc_id(&path);
        let docs_map = processor.store().list_all_docs().await.unwrap();
        assert!(docs_map.contains_key(&doc_id));
        let hits = processor
            .store()
            .fulltext_search("new content", crate::store::FtsColumn::Text, 5)
            .await
            .unwrap();
        assert!(hits.iter().any(|(r, _)| r.doc_id == doc_id));
        let stale = processor
            .store()
            .fulltext_search("old", crate::store::FtsColumn::Text, 5)
            .await
            .unwrap();
        assert!(!stale.iter().any(|(r, _)| r.doc_id == doc_id));
    }

    #[tokio::test]
    async fn unsupported_extension_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let (processor, docs) = setup(tmp.path()).await;
        let path = docs.join("blob.bin");
        std::fs::write(&path, b"\x00\x01").unwrap();

        let err = processor.process(&path, false).await.unwrap_err();
        match err {
            RagError::FileProcessing { kind, .. } => {
                assert_eq!(kind, FileErrorKind::UnsupportedType)
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn remove_drops_all_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let (processor, docs) = setup(tmp.path()).await;
        let path = docs.join("a.txt");
        std::fs::write(&path, "content to be removed later").unwrap();
        processor.process(&path, false).await.unwrap();

        processor.remove(&path).await.unwrap();
        assert!(!processor.store().has_doc(&derive_doc_id(&path)).await.unwrap());
    }

    #[tokio::test]
    async fn sync_indexes_and_prunes() {
        let tmp = tempfile::tempdir().unwrap();
        let (processor, docs) = setup(tmp.path()).await;
        std::fs::write(docs.join("a.txt"), "alpha content for sync").unwrap();
        std::fs::write(docs.join("b.md"), "# Beta\n\nbeta content for sync").unwrap();
        std::fs::write(docs.join("skip.bin"), b"binary").unwrap();

        let report = processor.sync(&docs).await.unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed, 0);

        // Delete one source file; the next sync prunes its records.
        let a = docs.join("a.txt");
        let doc_a = derive_doc_id(&a);
        std::fs::remove_file(&a).unwrap();
        let report = processor.sync(&docs).await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(!processor.store().has_doc(&doc_a).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_process_single_writer() {
        let tmp = tempfile::tempdir().unwrap();
        let (processor, docs) = setup(tmp.path()).await;
        let processor = Arc::new(processor);
        let path = docs.join("a.txt");
        std::fs::write(&path, "contended content with enough words to chunk").unwrap();

        let a = {
            let p = processor.clone();
            let path = path.clone();
            tokio::spawn(async move { p.process(&path, true).await.unwrap() })
        };
        let b = {
            let p = processor.clone();
            let path = path.clone();
            tokio::spawn(async move { p.process(&path, true).await.unwrap() })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let writers = [a, b]
            .iter()
            .filter(|o| matches!(o, ProcessOutcome::Indexed(_)))
            .count();
        let skips = [a, b]
            .iter()
            .filter(|o| matches!(o, ProcessOutcome::InFlight))
            .count();
        // Either both ran back-to-back (scheduling) or one was skipped;
        // never two interleaved writers.
        assert!(writers >= 1);
        assert_eq!(writers + skips, 2);
    }

    #[tokio::test]
    async fn korean_chunks_carry_surface_tokens() {
        let tmp = tempfile::tempdir().unwrap();
        let (processor, docs) = setup(tmp.path()).await;
        let path = docs.join("ko.txt");
        std::fs::write(&path, "데이터베이스는 정보를 저장하고 검색합니다.").unwrap();
        processor.process(&path, false).await.unwrap();

        let hits = processor
            .store()
            .fulltext_search("데이터베이스는", crate::store::FtsColumn::TokenizedText, 5)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].0.language, "ko");
        assert!(!hits[0].0.tokenized_text.is_empty());
    }
}
