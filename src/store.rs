//! LanceDB-backed chunk store.
//!
//! One columnar table holds every [`ChunkRecord`]: text, surface tokens,
//! language, metadata, and the embedding vector. Retrieval runs two ways
//! against the same rows — vector nearest-neighbor with cosine distance,
//! and full-text search over the inverted indexes on `text` (English
//! analyzer) and `tokenized_text` (whitespace analyzer, no stemming, for
//! pre-segmented scripts).
//!
//! Failure posture: reads against a missing or empty table return empty
//! results; writes surface `VectorStoreError`-kind failures to the caller.
//! Index optimization after writes is best-effort and only logged.

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::index::scalar::{FtsIndexBuilder, TokenizerConfig};
use lancedb::index::Index;
use lancedb::index::scalar::FullTextSearchQuery;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::DistanceType;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::models::ChunkRecord;

const TABLE_NAME: &str = "chunks";
/// Rows per appended RecordBatch.
const INSERT_BATCH_SIZE: usize = 128;

/// Which FTS column a full-text query should run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtsColumn {
    /// Stemmed/lowercased English analyzer over the original text.
    Text,
    /// Whitespace analyzer over pre-segmented surface tokens.
    TokenizedText,
}

impl FtsColumn {
    fn name(&self) -> &'static str {
        match self {
            FtsColumn::Text => "text",
            FtsColumn::TokenizedText => "tokenized_text",
        }
    }
}

/// Handle to the chunks table.
pub struct LanceStore {
    table: lancedb::Table,
    dimension: usize,
}

impl LanceStore {
    /// Open (or create) the store at `uri` for the given vector dimension.
    ///
    /// Creation and index setup are idempotent: an existing table is
    /// reopened, missing FTS indexes are added. A persisted table whose
    /// vector column disagrees with `dimension` is a configuration error —
    /// the embedding model changed under a live index.
    pub async fn open(uri: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(uri).map_err(|e| {
            RagError::Initialization(format!("cannot create store directory: {e}"))
        })?;
        let db = lancedb::connect(uri.to_string_lossy().as_ref())
            .execute()
            .await
            .map_err(|e| RagError::Initialization(format!("cannot open vector store: {e}")))?;

        let names = db
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Initialization(format!("cannot list tables: {e}")))?;

        let table = if names.iter().any(|n| n == TABLE_NAME) {
            let table = db
                .open_table(TABLE_NAME)
                .execute()
                .await
                .map_err(|e| RagError::Initialization(format!("cannot open table: {e}")))?;
            let persisted = persisted_dimension(&table).await?;
            if persisted != dimension {
                return Err(RagError::Initialization(format!(
                    "vector store holds dimension {persisted} but the embedding model \
                     produces {dimension}; reindex with force_reindex or restore the model"
                )));
            }
            table
        } else {
            let schema = table_schema(dimension);
            let empty = RecordBatch::new_empty(schema.clone());
            let batches = RecordBatchIterator::new(vec![Ok(empty)], schema);
            db.create_table(TABLE_NAME, Box::new(batches))
                .execute()
                .await
                .map_err(|e| RagError::Initialization(format!("cannot create table: {e}")))?
        };

        let store = Self { table, dimension };
        store.ensure_fts_indexes().await?;
        Ok(store)
    }

    /// Create the two inverted indexes if they are not present yet.
    async fn ensure_fts_indexes(&self) -> Result<()> {
        let existing = self
            .table
            .list_indices()
            .await
            .map_err(|e| RagError::Initialization(format!("cannot list indexes: {e}")))?;
        let indexed: Vec<&String> = existing.iter().flat_map(|idx| idx.columns.iter()).collect();

        if !indexed.iter().any(|c| c.as_str() == "text") {
            self.table
                .create_index(
                    &["text"],
                    Index::FTS(FtsIndexBuilder {
                        tokenizer_configs: TokenizerConfig::default()
                            .base_tokenizer("simple".to_string())
                            .lower_case(true)
                            .stem(true)
                            .remove_stop_words(true)
                            .ascii_folding(true),
                        ..FtsIndexBuilder::default()
                    }),
                )
                .execute()
                .await
                .map_err(|e| RagError::Initialization(format!("cannot index text: {e}")))?;
        }

        if !indexed.iter().any(|c| c.as_str() == "tokenized_text") {
            // Surface tokens are matched verbatim: whitespace splitting
            // only, no stemming, no stop words, case preserved.
            self.table
                .create_index(
                    &["tokenized_text"],
                    Index::FTS(FtsIndexBuilder {
                        tokenizer_configs: TokenizerConfig::default()
                            .base_tokenizer("whitespace".to_string())
                            .lower_case(false)
                            .stem(false)
                            .remove_stop_words(false)
                            .ascii_folding(false),
                        ..FtsIndexBuilder::default()
                    }),
                )
                .execute()
                .await
                .map_err(|e| {
                    RagError::Initialization(format!("cannot index tokenized_text: {e}"))
                })?;
        }

        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Append records in batches, then request index optimization.
    pub async fn insert(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        for record in records {
            if record.vector.len() != self.dimension {
                return Err(RagError::VectorStore(format!(
                    "record {} has vector length {} (table dimension {})",
                    record.chunk_id,
                    record.vector.len(),
                    self.dimension
                )));
            }
        }

        let schema = table_schema(self.dimension);
        for window in records.chunks(INSERT_BATCH_SIZE) {
            let batch = records_to_batch(window, self.dimension, &schema)?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema.clone());
            self.table
                .add(Box::new(batches))
                .execute()
                .await
                .map_err(|e| RagError::VectorStore(format!("insert failed: {e}")))?;
        }

        self.optimize_best_effort().await;
        Ok(())
    }

    /// Remove every row belonging to `doc_id`.
    pub async fn delete_by_doc(&self, doc_id: &str) -> Result<()> {
        self.table
            .delete(&format!("doc_id = '{}'", escape(doc_id)))
            .await
            .map_err(|e| RagError::VectorStore(format!("delete failed: {e}")))?;
        self.optimize_best_effort().await;
        Ok(())
    }

    /// Truncate the table.
    pub async fn delete_all(&self) -> Result<()> {
        self.table
            .delete("true")
            .await
            .map_err(|e| RagError::VectorStore(format!("truncate failed: {e}")))?;
        self.optimize_best_effort().await;
        Ok(())
    }

    /// Nearest neighbors by cosine distance, best first.
    ///
    /// `query_vector` is expected unit-norm; scores are cosine similarity
    /// in [-1, 1].
    pub async fn semantic_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let stream = self
            .table
            .vector_search(query_vector.to_vec())
            .map_err(|e| RagError::Search(format!("invalid query vector: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await;

        let stream = match stream {
            Ok(s) => s,
            // Empty/fresh tables are not an error at read time.
            Err(e) => {
                debug!("semantic search on empty store: {e}");
                return Ok(Vec::new());
            }
        };

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RagError::Search(format!("vector search stream: {e}")))?;

        let mut results = Vec::new();
        for batch in &batches {
            let scores = distance_scores(batch);
            for (i, record) in records_from_batch(batch)?.into_iter().enumerate() {
                // Cosine distance is 1 - cos; invert back to similarity.
                let score = scores.get(i).map(|d| 1.0 - d).unwrap_or(0.0);
                results.push((record, score));
            }
        }
        Ok(results)
    }

    /// Full-text search over one of the indexed text columns.
    ///
    /// Scores are the FTS engine's relevance values; ordering is whatever
    /// the engine produced, not re-sorted here.
    pub async fn fulltext_search(
        &self,
        query: &str,
        column: FtsColumn,
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let fts = FullTextSearchQuery::new(query.to_string())
            .columns(Some(vec![column.name().to_string()]));

        let stream = self
            .table
            .query()
            .full_text_search(fts)
            .limit(top_k)
            .execute()
            .await;

        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                debug!("fts on empty store: {e}");
                return Ok(Vec::new());
            }
        };

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RagError::Search(format!("fts stream: {e}")))?;

        let mut results = Vec::new();
        for batch in &batches {
            let scores = relevance_scores(batch);
            for (i, record) in records_from_batch(batch)?.into_iter().enumerate() {
                let score = scores.get(i).copied().unwrap_or(0.0);
                results.push((record, score));
            }
        }
        Ok(results)
    }

    pub async fn count_rows(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| RagError::VectorStore(format!("count failed: {e}")))
    }

    pub async fn has_doc(&self, doc_id: &str) -> Result<bool> {
        let count = self
            .table
            .count_rows(Some(format!("doc_id = '{}'", escape(doc_id))))
            .await
            .map_err(|e| RagError::VectorStore(format!("count failed: {e}")))?;
        Ok(count > 0)
    }

    pub async fn count_distinct_docs(&self) -> Result<usize> {
        Ok(self.list_all_docs().await?.len())
    }

    /// Metadata JSON for one document, if present.
    pub async fn doc_metadata(&self, doc_id: &str) -> Result<Option<String>> {
        let stream = self
            .table
            .query()
            .only_if(format!("doc_id = '{}'", escape(doc_id)))
            .select(Select::columns(&["metadata"]))
            .limit(1)
            .execute()
            .await;
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                debug!("metadata lookup on empty store: {e}");
                return Ok(None);
            }
        };
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RagError::VectorStore(format!("metadata lookup stream: {e}")))?;
        for batch in &batches {
            if batch.num_rows() > 0 {
                return Ok(Some(string_column(batch, "metadata")?.value(0).to_string()));
            }
        }
        Ok(None)
    }

    /// Map every `doc_id` in the store to its metadata JSON.
    pub async fn list_all_docs(&self) -> Result<HashMap<String, String>> {
        let stream = self
            .table
            .query()
            .select(Select::columns(&["doc_id", "metadata"]))
            .execute()
            .await;
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                debug!("doc listing on empty store: {e}");
                return Ok(HashMap::new());
            }
        };
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RagError::VectorStore(format!("doc listing stream: {e}")))?;

        let mut docs = HashMap::new();
        for batch in &batches {
            let ids = string_column(batch, "doc_id")?;
            let metas = string_column(batch, "metadata")?;
            for i in 0..batch.num_rows() {
                docs.insert(ids.value(i).to_string(), metas.value(i).to_string());
            }
        }
        Ok(docs)
    }

    async fn optimize_best_effort(&self) {
        if let Err(e) = self
            .table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
        {
            warn!("index optimization failed (continuing): {e}");
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

fn table_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("ordinal", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("tokenized_text", DataType::Utf8, false),
        Field::new("language", DataType::Utf8, false),
        Field::new("model_name", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            false,
        ),
    ]))
}

async fn persisted_dimension(table: &lancedb::Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| RagError::Initialization(format!("cannot read table schema: {e}")))?;
    for field in schema.fields() {
        if field.name() == "vector" {
            if let DataType::FixedSizeList(_, dim) = field.data_type() {
                return Ok(*dim as usize);
            }
        }
    }
    Err(RagError::Initialization(
        "persisted table has no vector column".to_string(),
    ))
}

fn records_to_batch(
    records: &[ChunkRecord],
    dimension: usize,
    schema: &Arc<Schema>,
) -> Result<RecordBatch> {
    let chunk_ids: Vec<&str> = records.iter().map(|r| r.chunk_id.as_str()).collect();
    let doc_ids: Vec<&str> = records.iter().map(|r| r.doc_id.as_str()).collect();
    let ordinals: Vec<i64> = records.iter().map(|r| r.ordinal as i64).collect();
    let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
    let tokenized: Vec<&str> = records.iter().map(|r| r.tokenized_text.as_str()).collect();
    let languages: Vec<&str> = records.iter().map(|r| r.language.as_str()).collect();
    let models: Vec<&str> = records.iter().map(|r| r.model_name.as_str()).collect();
    let metadata: Vec<&str> = records.iter().map(|r| r.metadata.as_str()).collect();

    let mut flat: Vec<f32> = Vec::with_capacity(records.len() * dimension);
    for record in records {
        flat.extend_from_slice(&record.vector);
    }
    let values = Float32Array::from(flat);
    let vectors = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension as i32,
        Arc::new(values),
        None,
    )
    .map_err(|e| RagError::VectorStore(format!("cannot build vector array: {e}")))?;

    RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(chunk_ids)),
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(Int64Array::from(ordinals)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(tokenized)),
            Arc::new(StringArray::from(languages)),
            Arc::new(StringArray::from(models)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(vectors),
        ],
    )
    .map_err(|e| RagError::VectorStore(format!("cannot build record batch: {e}")))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RagError::VectorStore(format!("column {name} missing or wrong type")))
}

fn records_from_batch(batch: &RecordBatch) -> Result<Vec<ChunkRecord>> {
    let chunk_ids = string_column(batch, "chunk_id")?;
    let doc_ids = string_column(batch, "doc_id")?;
    let texts = string_column(batch, "text")?;
    let tokenized = string_column(batch, "tokenized_text")?;
    let languages = string_column(batch, "language")?;
    let models = string_column(batch, "model_name")?;
    let metadata = string_column(batch, "metadata")?;
    let ordinals = batch
        .column_by_name("ordinal")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| RagError::VectorStore("column ordinal missing".to_string()))?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let vector = vectors
            .map(|col| {
                let item = col.value(i);
                item.as_any()
                    .downcast_ref::<Float32Array>()
                    .map(|floats| floats.values().to_vec())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        records.push(ChunkRecord {
            chunk_id: chunk_ids.value(i).to_string(),
            doc_id: doc_ids.value(i).to_string(),
            ordinal: ordinals.value(i) as usize,
            text: texts.value(i).to_string(),
            tokenized_text: tokenized.value(i).to_string(),
            language: languages.value(i).to_string(),
            vector,
            model_name: models.value(i).to_string(),
            metadata: metadata.value(i).to_string(),
        });
    }
    Ok(records)
}

fn distance_scores(batch: &RecordBatch) -> Vec<f32> {
    batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .map(|col| col.values().to_vec())
        .unwrap_or_default()
}

fn relevance_scores(batch: &RecordBatch) -> Vec<f32> {
    batch
        .column_by_name("_score")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .map(|col| col.values().to_vec())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chunk_id_for;

    fn record(doc_id: &str, ordinal: usize, text: &str, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            chunk_id: chunk_id_for(doc_id, ordinal),
            doc_id: doc_id.to_string(),
            ordinal,
            text: text.to_string(),
            tokenized_text: String::new(),
            language: "en".to_string(),
            vector,
            model_name: "test-model".to_string(),
            metadata: "{}".to_string(),
        }
    }

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in v.iter_mut() {
            *x /= norm;
        }
        v
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        drop(store);
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        assert_eq!(store.count_rows().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_on_reopen_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        drop(store);
        let err = LanceStore::open(dir.path(), 8).await.unwrap_err();
        assert!(matches!(err, RagError::Initialization(_)));
    }

    #[tokio::test]
    async fn insert_then_semantic_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        let target = unit(vec![1.0, 0.0, 0.0, 0.1]);
        store
            .insert(&[
                record("doc1", 0, "alpha", target.clone()),
                record("doc2", 0, "beta", unit(vec![0.0, 1.0, 0.0, 0.0])),
            ])
            .await
            .unwrap();

        let hits = store.semantic_search(&target, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.doc_id, "doc1");
        assert!(hits[0].1 > 0.99);
        assert_eq!(hits[0].0.vector.len(), 4);
    }

    #[tokio::test]
    async fn wrong_vector_length_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        let err = store
            .insert(&[record("doc1", 0, "alpha", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::VectorStore(_)));
    }

    #[tokio::test]
    async fn delete_by_doc_removes_only_that_doc() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        store
            .insert(&[
                record("doc1", 0, "alpha", unit(vec![1.0, 0.0, 0.0, 0.0])),
                record("doc1", 1, "beta", unit(vec![0.9, 0.1, 0.0, 0.0])),
                record("doc2", 0, "gamma", unit(vec![0.0, 1.0, 0.0, 0.0])),
            ])
            .await
            .unwrap();

        store.delete_by_doc("doc1").await.unwrap();
        assert!(!store.has_doc("doc1").await.unwrap());
        assert!(store.has_doc("doc2").await.unwrap());
        assert_eq!(store.count_rows().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_all_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        store
            .insert(&[record("doc1", 0, "alpha", unit(vec![1.0, 0.0, 0.0, 0.0]))])
            .await
            .unwrap();
        store.delete_all().await.unwrap();
        assert_eq!(store.count_rows().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fulltext_search_hits_text_column() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        store
            .insert(&[
                record(
                    "doc1",
                    0,
                    "vector databases store high-dimensional data",
                    unit(vec![1.0, 0.0, 0.0, 0.0]),
                ),
                record(
                    "doc2",
                    0,
                    "pumpkin harvest report",
                    unit(vec![0.0, 1.0, 0.0, 0.0]),
                ),
            ])
            .await
            .unwrap();

        let hits = store
            .fulltext_search("high-dimensional data", FtsColumn::Text, 5)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].0.doc_id, "doc1");
    }

    #[tokio::test]
    async fn tokenized_column_matches_surface_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        let mut korean = record(
            "doc1",
            0,
            "데이터베이스는 정보를 저장합니다",
            unit(vec![1.0, 0.0, 0.0, 0.0]),
        );
        korean.language = "ko".to_string();
        korean.tokenized_text = "데이터베이스는 데이 이터 터베 베이 이스 스는 정보를 저장합니다".to_string();
        store.insert(&[korean]).await.unwrap();

        let hits = store
            .fulltext_search("데이 이터", FtsColumn::TokenizedText, 5)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].0.doc_id, "doc1");
    }

    #[tokio::test]
    async fn reads_on_empty_store_return_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        assert!(store
            .semantic_search(&unit(vec![1.0, 0.0, 0.0, 0.0]), 5)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .fulltext_search("anything", FtsColumn::Text, 5)
            .await
            .unwrap()
            .is_empty());
        assert!(store.list_all_docs().await.unwrap().is_empty());
        assert_eq!(store.count_distinct_docs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn doc_listing_maps_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(dir.path(), 4).await.unwrap();
        let mut a = record("doc1", 0, "alpha", unit(vec![1.0, 0.0, 0.0, 0.0]));
        a.metadata = r#"{"file_name":"a.txt"}"#.to_string();
        let mut b = record("doc2", 0, "beta", unit(vec![0.0, 1.0, 0.0, 0.0]));
        b.metadata = r#"{"file_name":"b.txt"}"#.to_string();
        store.insert(&[a, b]).await.unwrap();

        let docs = store.list_all_docs().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs["doc1"].contains("a.txt"));
        assert_eq!(store.count_distinct_docs().await.unwrap(), 2);
    }
}
