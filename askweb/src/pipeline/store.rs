//! Cache tier collaborators: the embedding capability, the vector store,
//! and an in-memory store used by tests and small deployments.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::errors::StoreError;
use crate::ranking::RankedResult;

/// Content-addressed id of a document.
#[must_use]
pub fn record_id(document: &str) -> String {
    hex::encode(Sha256::digest(document.trim().as_bytes()))
}

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;

    /// Embeds many texts, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// One stored sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    /// SHA-256 of the document.
    pub id: String,
    /// Embedded text.
    pub document: String,
    /// Source domain.
    pub source: String,
    /// Citation text.
    pub doc: String,
    /// Embedding of `document`.
    pub embedding: Vec<f32>,
}

/// A record returned by a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMatch {
    /// Stored text.
    pub document: String,
    /// Source domain.
    pub source: String,
    /// Citation text.
    pub doc: String,
    /// Cosine distance to the query vector.
    pub distance: f32,
}

impl StoreMatch {
    /// Converts to a ranked result scored `1 - distance`.
    #[must_use]
    pub fn into_ranked(self) -> RankedResult {
        let score = (1.0 - f64::from(self.distance)).clamp(0.0, 1.0);
        RankedResult::new(self.document, self.source, score)
    }
}

/// Nearest-neighbor store for answered sentences.
///
/// Implementations handle their own synchronization.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Up to `limit` records closer than `threshold`, nearest first.
    async fn query(&self, vector: &[f32], threshold: f32, limit: usize) -> Result<Vec<StoreMatch>, StoreError>;

    /// Inserts records, skipping ids already present. Returns how many
    /// were new.
    async fn insert(&self, records: Vec<StoreRecord>) -> Result<usize, StoreError>;
}

/// A document waiting to be embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// Text to embed.
    pub document: String,
    /// Source domain.
    pub source: String,
    /// Citation text.
    pub doc: String,
}

/// Documents to embed and insert together, deduplicated by text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentBatch {
    entries: Vec<BatchEntry>,
}

impl DocumentBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document unless its text is empty or already present.
    pub fn push(&mut self, document: impl Into<String>, source: impl Into<String>, doc: impl Into<String>) {
        let document = document.into().trim().to_string();
        if document.is_empty() || self.entries.iter().any(|e| e.document == document) {
            return;
        }
        self.entries.push(BatchEntry {
            document,
            source: source.into(),
            doc: doc.into(),
        });
    }

    /// Builds a batch from caller rows.
    ///
    /// `document_field` names the string field that is embedded. `source`
    /// and `doc` fields are optional; `doc` defaults to the document.
    pub fn from_json_rows(rows: &[serde_json::Value], document_field: &str) -> Result<Self, StoreError> {
        let mut batch = Self::new();
        for (index, row) in rows.iter().enumerate() {
            let object = row
                .as_object()
                .ok_or_else(|| StoreError::invalid_row(index, "row is not an object"))?;
            let document = object
                .get(document_field)
                .and_then(serde_json::Value::as_str)
                .filter(|d| !d.trim().is_empty())
                .ok_or_else(|| {
                    StoreError::invalid_row(index, format!("'{document_field}' is missing or not a string"))
                })?;
            let text_field = |name: &str| object.get(name).and_then(serde_json::Value::as_str);
            batch.push(
                document,
                text_field("source").unwrap_or_default(),
                text_field("doc").unwrap_or(document),
            );
        }
        Ok(batch)
    }

    /// Builds a batch from ranked sentences.
    #[must_use]
    pub fn from_ranked(results: &[RankedResult]) -> Self {
        let mut batch = Self::new();
        for result in results.iter().filter(|r| !r.is_no_match()) {
            batch.push(result.text.as_str(), result.source_domain.as_str(), result.text.as_str());
        }
        batch
    }

    /// The pending entries.
    #[must_use]
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embeds every document and returns store records.
    pub async fn embed(self, embedder: &dyn Embedder) -> Result<Vec<StoreRecord>, StoreError> {
        let texts: Vec<String> = self.entries.iter().map(|e| e.document.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != self.entries.len() {
            return Err(StoreError::Embedding(format!(
                "expected {} vectors, got {}",
                self.entries.len(),
                vectors.len()
            )));
        }
        Ok(self
            .entries
            .into_iter()
            .zip(vectors)
            .map(|(entry, embedding)| StoreRecord {
                id: record_id(&entry.document),
                document: entry.document,
                source: entry.source,
                doc: entry.doc,
                embedding,
            })
            .collect())
    }
}

/// Cosine distance in `[0, 2]`; 1.0 when either vector is all zeros.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<StoreRecord>,
    ids: HashSet<String>,
    dimension: Option<usize>,
}

/// Linear-scan vector store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every record, in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<StoreRecord> {
        self.inner.read().records.clone()
    }

    /// Number of records per source.
    #[must_use]
    pub fn count_by_source(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for record in &self.inner.read().records {
            *counts.entry(record.source.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().records.len())
    }

    async fn query(&self, vector: &[f32], threshold: f32, limit: usize) -> Result<Vec<StoreMatch>, StoreError> {
        let inner = self.inner.read();
        if let Some(expected) = inner.dimension {
            if vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut matches: Vec<StoreMatch> = inner
            .records
            .iter()
            .map(|record| StoreMatch {
                document: record.document.clone(),
                source: record.source.clone(),
                doc: record.doc.clone(),
                distance: cosine_distance(vector, &record.embedding),
            })
            .filter(|m| m.distance < threshold)
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn insert(&self, records: Vec<StoreRecord>) -> Result<usize, StoreError> {
        let mut inner = self.inner.write();
        let expected = inner
            .dimension
            .or_else(|| records.first().map(|r| r.embedding.len()));
        if let Some(expected) = expected {
            if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: bad.embedding.len(),
                });
            }
            inner.dimension = Some(expected);
        }

        let mut inserted = 0;
        for record in records {
            if inner.ids.insert(record.id.clone()) {
                inner.records.push(record);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
