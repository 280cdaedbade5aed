//! Vector index abstraction shared by the ingest and search binaries.

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::course::{CourseMetadata, CourseRecord};

/// Pinecone index names are limited to this many characters.
pub const MAX_INDEX_NAME_LEN: usize = 45;

/// Validated vector index name (lowercase alphanumerics and `-`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexName(String);

impl IndexName {
    /// Builds a new index identifier.
    pub fn new<S: Into<String>>(name: S) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        anyhow::ensure!(!trimmed.is_empty(), "index name is required");
        anyhow::ensure!(
            trimmed.len() <= MAX_INDEX_NAME_LEN,
            "index name {:?} exceeds {} characters",
            trimmed,
            MAX_INDEX_NAME_LEN
        );
        anyhow::ensure!(
            trimmed
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-'),
            "index name {:?} may only contain lowercase letters, digits and '-'",
            trimmed
        );
        anyhow::ensure!(
            !trimmed.starts_with('-') && !trimmed.ends_with('-'),
            "index name {:?} must start and end with a letter or digit",
            trimmed
        );
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `(id, vector, metadata)` triple written to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Entry id (the course name).
    pub id: String,
    /// Embedding vector.
    pub values: Vec<f32>,
    /// Display fields.
    pub metadata: CourseMetadata,
}

impl IndexEntry {
    /// Pairs a course with its embedding.
    pub fn from_course(record: &CourseRecord, values: Vec<f32>) -> Self {
        Self {
            id: record.name.clone(),
            values,
            metadata: record.metadata(),
        }
    }
}

/// Nearest-neighbour hit returned by [`VectorIndex::query`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryMatch {
    /// Entry id.
    pub id: String,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
    /// Stored metadata, when requested and present.
    #[serde(default)]
    pub metadata: Option<CourseMetadata>,
}

/// Summary counters reported by the index service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Vectors across all namespaces.
    #[serde(default)]
    pub total_vector_count: u64,
    /// Vector width.
    #[serde(default)]
    pub dimension: usize,
}

/// Data-plane operations on one index.
///
/// Implementations must tolerate concurrent read-only use; the search service shares one
/// handle across requests.
pub trait VectorIndex: Send + Sync {
    /// Vector width the index was created with.
    fn dimension(&self) -> usize;

    /// Inserts or replaces entries by id, returning how many the service accepted.
    fn upsert(&self, entries: &[IndexEntry]) -> Result<usize>;

    /// Returns up to `top_k` matches with metadata, most similar first.
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>>;

    /// Current index statistics.
    fn stats(&self) -> Result<IndexStats>;
}
