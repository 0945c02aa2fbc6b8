//! Core data types flowing through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// One stored row of the vector table.
///
/// Records are immutable once written: an update is expressed as
/// delete-by-`doc_id` followed by insertion of the replacement set.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// `{doc_id}:{ordinal}` — a pure function of the pair.
    pub chunk_id: String,
    /// Stable identifier derived from the source file's absolute path.
    pub doc_id: String,
    /// Position of this chunk within its document.
    pub ordinal: usize,
    /// Original chunk content.
    pub text: String,
    /// Whitespace-joined surface tokens; empty unless `language` requires
    /// pre-segmentation for FTS.
    pub tokenized_text: String,
    /// Detector output at ingest time (`en`, `ko`, ...).
    pub language: String,
    /// Unit-norm embedding; length equals the model dimension.
    pub vector: Vec<f32>,
    /// Embedding model identity at ingest time.
    pub model_name: String,
    /// Opaque JSON blob (see [`DocumentMetadata`]). Used for filtering,
    /// display, and change detection only — never queried field-by-field.
    pub metadata: String,
}

/// Schemaful content of the `metadata` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub file_hash: String,
    pub modified_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub chunk_total: usize,
}

impl DocumentMetadata {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

/// Size + mtime + content hash; decides whether a file needs reprocessing.
///
/// Derived at ingest, persisted inside `metadata` rather than as its own
/// column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub content_hash: String,
}

impl FileFingerprint {
    /// Stat + hash the file at `path`.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let bytes = std::fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let content_hash = format!("{:x}", hasher.finalize());
        let modified_at = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(Self {
            size: meta.len(),
            modified_at,
            content_hash,
        })
    }

    /// Whether stored metadata describes the same file content.
    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        self.size == metadata.file_size && self.content_hash == metadata.file_hash
    }
}

/// Derive the stable document identifier for a source path.
///
/// Uses the canonical absolute path so the id survives relative
/// invocations and symlinked roots. A removal event arrives after the
/// file is gone, so the fallback canonicalizes the parent directory and
/// re-attaches the file name, keeping the id equal to the one computed at
/// ingest time.
pub fn derive_doc_id(path: &Path) -> String {
    let canonical = path.canonicalize().unwrap_or_else(|_| {
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf()),
            _ => path.to_path_buf(),
        }
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// `chunk_id` is a function of `(doc_id, ordinal)`.
pub fn chunk_id_for(doc_id: &str, ordinal: usize) -> String {
    format!("{doc_id}:{ordinal}")
}

/// How a query should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Semantic,
    Keyword,
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "semantic" => Ok(SearchMode::Semantic),
            "keyword" => Ok(SearchMode::Keyword),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(format!(
                "Unknown search mode: {other}. Use semantic, keyword, or hybrid."
            )),
        }
    }
}

/// A ranked hit returned by the search engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub doc_id: String,
    pub ordinal: usize,
    pub text: String,
    pub score: f32,
    pub metadata: Option<DocumentMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn doc_id_is_stable_and_short() {
        let a = derive_doc_id(&PathBuf::from("/no/such/file.txt"));
        let b = derive_doc_id(&PathBuf::from("/no/such/file.txt"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn doc_id_differs_per_path() {
        let a = derive_doc_id(&PathBuf::from("/no/such/a.txt"));
        let b = derive_doc_id(&PathBuf::from("/no/such/b.txt"));
        assert_ne!(a, b);
    }

    #[test]
    fn chunk_id_encodes_pair() {
        assert_eq!(chunk_id_for("abc", 3), "abc:3");
    }

    #[test]
    fn doc_id_survives_file_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        std::fs::write(&path, "soon gone").unwrap();
        let before = derive_doc_id(&path);
        std::fs::remove_file(&path).unwrap();
        let after = derive_doc_id(&path);
        assert_eq!(before, after);
    }

    #[test]
    fn metadata_json_round_trips() {
        let meta = DocumentMetadata {
            file_name: "a.txt".into(),
            file_path: "/docs/a.txt".into(),
            file_size: 42,
            file_hash: "deadbeef".into(),
            modified_at: Utc::now(),
            indexed_at: Utc::now(),
            chunk_total: 3,
        };
        let restored = DocumentMetadata::from_json(&meta.to_json()).unwrap();
        assert_eq!(restored.file_name, "a.txt");
        assert_eq!(restored.chunk_total, 3);
    }

    #[test]
    fn fingerprint_matches_on_size_and_hash() {
        let fp = FileFingerprint {
            size: 10,
            modified_at: Utc::now(),
            content_hash: "h1".into(),
        };
        let meta = DocumentMetadata {
            file_name: "x".into(),
            file_path: "x".into(),
            file_size: 10,
            file_hash: "h1".into(),
            modified_at: Utc::now(),
            indexed_at: Utc::now(),
            chunk_total: 1,
        };
        assert!(fp.matches(&meta));
        let changed = FileFingerprint {
            content_hash: "h2".into(),
            ..fp
        };
        assert!(!changed.matches(&meta));
    }

    #[test]
    fn search_mode_parses() {
        assert_eq!("hybrid".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }
}
