//! # ragdock
//!
//! **A local RAG server: watched-directory ingestion, hybrid retrieval,
//! tool-call API.**
//!
//! ragdock ingests documents from a watched directory, indexes them as
//! dense vectors plus full-text terms in an embedded LanceDB table, and
//! answers queries over a CLI and a JSON tool-call HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────────┐   ┌───────────┐
//! │  Watcher  │──▶│   Processor    │──▶│  LanceDB   │
//! │  + sync   │   │ read·chunk·embed│   │ vec + FTS │
//! └───────────┘   └────────────────┘   └─────┬─────┘
//!                                            │
//!                          ┌─────────────────┤
//!                          ▼                 ▼
//!                     ┌─────────┐      ┌──────────┐
//!                     │   CLI   │      │   HTTP    │
//!                     │(ragdock)│      │(tool-call)│
//!                     └─────────┘      └──────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. Files under `documents_dir` are read by [`reader`] (PDF, DOCX,
//!    HTML/XML, CSV, JSON, plain text) and split by the content-aware
//!    [`chunker`].
//! 2. [`language`] tags each chunk and pre-segments Korean text for the
//!    whitespace-analyzed FTS column.
//! 3. [`embedding`] turns chunks into unit-norm vectors (HTTP endpoint or
//!    deterministic hashed backend).
//! 4. [`store`] persists [`models::ChunkRecord`]s in one LanceDB table
//!    with a vector column and two inverted text indexes.
//! 5. [`search`] serves semantic, keyword, and hybrid (RRF) queries.
//! 6. [`rag`] owns the lifecycle; [`watcher`] and [`server`] feed it.
//!
//! ## Search Modes
//!
//! | Mode | Engine | Notes |
//! |------|--------|-------|
//! | `semantic` | cosine over stored vectors | score floor applies |
//! | `keyword` | LanceDB FTS | language-routed column |
//! | `hybrid` | Reciprocal Rank Fusion | degrades to semantic on sublist failure |

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod language;
pub mod models;
pub mod processor;
pub mod rag;
pub mod reader;
pub mod search;
pub mod server;
pub mod store;
pub mod watcher;
