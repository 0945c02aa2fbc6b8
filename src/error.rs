//! Error types shared across the engine.
//!
//! One enum, one variant per failure kind. Recoverable failures (a single
//! file during sync, a timed-out embedding batch) are absorbed with a log
//! entry at the call site; structural failures (dimension mismatch, store
//! unavailable at startup) propagate to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// What went wrong while ingesting a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorKind {
    /// Extension is not in the supported set.
    UnsupportedType,
    /// The file could not be opened or read.
    Unreadable,
    /// Reading exceeded the configured timeout.
    ReadTimeout,
    /// The file was read but its content could not be extracted.
    ParseFailure,
    /// Embedding the file's chunks failed after retries.
    EmbeddingFailure,
}

impl FileErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileErrorKind::UnsupportedType => "unsupported_type",
            FileErrorKind::Unreadable => "unreadable",
            FileErrorKind::ReadTimeout => "read_timeout",
            FileErrorKind::ParseFailure => "parse_failure",
            FileErrorKind::EmbeddingFailure => "embedding_failure",
        }
    }
}

impl std::fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("failed to process {path}: {kind}: {message}")]
    FileProcessing {
        path: PathBuf,
        kind: FileErrorKind,
        message: String,
    },

    #[error("vector store operation failed: {0}")]
    VectorStore(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{operation} exceeded {budget_secs}s budget")]
    Timeout {
        operation: &'static str,
        budget_secs: u64,
    },
}

impl RagError {
    pub fn file(path: impl Into<PathBuf>, kind: FileErrorKind, message: impl Into<String>) -> Self {
        RagError::FileProcessing {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_error_carries_kind_and_path() {
        let err = RagError::file("/tmp/a.bin", FileErrorKind::UnsupportedType, "extension .bin");
        match err {
            RagError::FileProcessing { kind, ref path, .. } => {
                assert_eq!(kind, FileErrorKind::UnsupportedType);
                assert_eq!(path, &PathBuf::from("/tmp/a.bin"));
            }
            other => panic!("unexpected variant: {other}"),
        }
    }

    #[test]
    fn kinds_have_stable_wire_names() {
        assert_eq!(FileErrorKind::ReadTimeout.as_str(), "read_timeout");
        assert_eq!(FileErrorKind::ParseFailure.as_str(), "parse_failure");
    }
}
