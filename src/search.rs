//! Query embedding, similarity lookup and threshold filtering.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::course::CourseMetadata;
use crate::embedder::{Embedder, InputKind};
use crate::vector_store::VectorIndex;

/// Components of the query vector echoed back in `debug_info`.
pub const SNIPPET_LEN: usize = 5;

/// Body of `POST /search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// Natural-language query.
    pub query: String,
    /// Requested neighbours; signed so negative values reach validation instead of serde.
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    /// Minimum similarity kept in the response.
    #[serde(default)]
    pub score_threshold: f32,
}

fn default_top_k() -> i64 {
    5
}

impl SearchRequest {
    /// Request with the default `top_k` and threshold.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: default_top_k(),
            score_threshold: 0.0,
        }
    }
}

/// Body returned by `POST /search`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// Matches at or above the threshold, most similar first.
    pub results: Vec<SearchResult>,
    /// Query diagnostics.
    pub debug_info: DebugInfo,
}

/// One ranked course.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Index entry id (the course name).
    pub id: String,
    /// Cosine similarity.
    pub score: f32,
    /// Course display fields.
    pub data: CourseMetadata,
}

/// Diagnostics about the embedded query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugInfo {
    /// Query as received.
    pub query_text: String,
    /// Leading components of the query vector.
    pub query_vector_snippet: Vec<f32>,
    /// Query vector width.
    pub vector_dimensions: usize,
}

/// Failures surfaced by [`SearchService::search`].
#[derive(Debug, Error)]
pub enum SearchError {
    /// The request violates the endpoint contract.
    #[error("{0}")]
    InvalidRequest(String),
    /// The embedder produced a vector the index cannot compare against.
    #[error("query embedding has {actual} dimensions but index expects {expected}")]
    DimensionMismatch {
        /// Index width.
        expected: usize,
        /// Query vector width.
        actual: usize,
    },
    /// Embedding or index call failed.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl SearchError {
    /// Whether the caller, not the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SearchError::InvalidRequest(_))
    }
}

/// Default ceiling for `top_k`.
pub const DEFAULT_MAX_TOP_K: usize = 100;
/// Default number of memoised query embeddings.
pub const DEFAULT_EMBEDDING_CACHE_SIZE: usize = 1024;

/// Search limits fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// Larger `top_k` values are clamped to this.
    pub max_top_k: usize,
    /// Query embeddings memoised in memory (0 disables caching).
    pub embedding_cache_size: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_top_k: DEFAULT_MAX_TOP_K,
            embedding_cache_size: DEFAULT_EMBEDDING_CACHE_SIZE,
        }
    }
}

/// Embeds queries and looks them up in the index. Blocking; run on a blocking thread.
pub struct SearchService {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    max_top_k: usize,
    embedding_cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl SearchService {
    /// Wires the service to its collaborators.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        limits: SearchLimits,
    ) -> Self {
        Self {
            embedder,
            index,
            max_top_k: limits.max_top_k.max(1),
            embedding_cache: NonZeroUsize::new(limits.embedding_cache_size)
                .map(|capacity| Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Embeds a probe string and checks its width against the index.
    pub fn verify_dimensions(&self) -> Result<usize, SearchError> {
        let probe = self
            .embedder
            .embed("dimension probe", InputKind::Query)?;
        self.check_dimensions(&probe)?;
        Ok(probe.len())
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), SearchError> {
        let expected = self.index.dimension();
        if vector.len() != expected {
            return Err(SearchError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Runs one search request.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let top_k = self.validate(request)?;
        let embedding = self.embed_query(&request.query)?;
        self.check_dimensions(&embedding)?;

        let matches = self.index.query(&embedding, top_k)?;
        let results: Vec<SearchResult> = matches
            .into_iter()
            .filter(|hit| hit.score >= request.score_threshold)
            .map(|hit| SearchResult {
                id: hit.id,
                score: hit.score,
                data: hit.metadata.unwrap_or_default(),
            })
            .collect();
        tracing::info!(
            query = %request.query,
            top_k,
            threshold = request.score_threshold,
            returned = results.len(),
            "search served"
        );

        Ok(SearchResponse {
            results,
            debug_info: DebugInfo {
                query_text: request.query.clone(),
                query_vector_snippet: embedding.iter().take(SNIPPET_LEN).copied().collect(),
                vector_dimensions: embedding.len(),
            },
        })
    }

    fn validate(&self, request: &SearchRequest) -> Result<usize, SearchError> {
        if request.query.trim().is_empty() {
            return Err(SearchError::InvalidRequest(
                "query text must not be empty".to_string(),
            ));
        }
        if request.top_k < 1 {
            return Err(SearchError::InvalidRequest(format!(
                "top_k must be at least 1, got {}",
                request.top_k
            )));
        }
        if !request.score_threshold.is_finite() {
            return Err(SearchError::InvalidRequest(
                "score_threshold must be a finite number".to_string(),
            ));
        }
        let requested = usize::try_from(request.top_k).unwrap_or(usize::MAX);
        if requested > self.max_top_k {
            tracing::debug!(requested, max = self.max_top_k, "clamping top_k");
        }
        Ok(requested.min(self.max_top_k))
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>, SearchError> {
        if let Some(cache) = &self.embedding_cache {
            let mut guard = cache
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
            if let Some(hit) = guard.get(query) {
                return Ok(hit.clone());
            }
        }

        let embedding = self.embedder.embed(query, InputKind::Query)?;

        if let Some(cache) = &self.embedding_cache {
            let mut guard = cache
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
            guard.put(query.to_string(), embedding.clone());
        }
        Ok(embedding)
    }
}
