//! Blocking client for the Pinecone REST API (control plane and index data plane).

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::vector_store::{IndexEntry, IndexName, IndexStats, QueryMatch, VectorIndex};

/// Pinned REST API version sent with every request.
pub const API_VERSION: &str = "2024-10";
/// Public control plane endpoint.
pub const DEFAULT_CONTROLLER_URL: &str = "https://api.pinecone.io";
/// The only metric course embeddings are compared with.
pub const METRIC: &str = "cosine";

/// Headers shared by every Pinecone call.
pub fn auth_headers(api_key: &str) -> Result<HeaderMap> {
    anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");
    let mut headers = HeaderMap::new();
    headers.insert(
        "api-key",
        HeaderValue::from_str(api_key.trim()).context("invalid Pinecone API key")?,
    );
    headers.insert(
        "x-pinecone-api-version",
        HeaderValue::from_static(API_VERSION),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Index as reported by `GET /indexes/{name}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexDescription {
    /// Index name.
    pub name: String,
    /// Vector width.
    pub dimension: usize,
    /// Similarity metric.
    #[serde(default)]
    pub metric: String,
    /// Data plane host, usually without a scheme.
    #[serde(default)]
    pub host: String,
    /// Provisioning status.
    #[serde(default)]
    pub status: IndexStatus,
}

/// Provisioning status of an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexStatus {
    /// Whether the data plane accepts requests.
    #[serde(default)]
    pub ready: bool,
    /// Service state label (`Initializing`, `Ready`, ...).
    #[serde(default)]
    pub state: String,
}

/// Parameters for creating a serverless index.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    /// Index name.
    pub name: IndexName,
    /// Vector width.
    pub dimension: usize,
    /// Cloud provider (e.g. `aws`).
    pub cloud: String,
    /// Cloud region (e.g. `us-east-1`).
    pub region: String,
}

/// Bounded fixed-interval polling used while the service provisions or tears down an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyPolicy {
    /// Delay between checks.
    pub interval: Duration,
    /// Checks performed before giving up.
    pub max_attempts: usize,
}

impl Default for ReadyPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

#[derive(Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

/// Control plane client.
#[derive(Clone)]
pub struct PineconeClient {
    client: Client,
    controller_url: String,
}

impl PineconeClient {
    /// Builds a new control plane client.
    pub fn new(api_key: &str, controller_url: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(
            controller_url.starts_with("http://") || controller_url.starts_with("https://"),
            "Pinecone controller URL must be an http(s) URL"
        );
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(auth_headers(api_key)?)
            .build()
            .context("failed to build Pinecone HTTP client")?;
        Ok(Self {
            client,
            controller_url: controller_url.trim_end_matches('/').to_string(),
        })
    }

    fn index_url(&self, name: &IndexName) -> String {
        format!("{}/indexes/{}", self.controller_url, name)
    }

    /// Lists every index in the project.
    pub fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
        let resp = self
            .client
            .get(format!("{}/indexes", self.controller_url))
            .send()
            .context("failed to list indexes")?;
        let resp = check(resp, "list indexes")?;
        let listing: IndexList = resp.json().context("invalid index listing")?;
        Ok(listing.indexes)
    }

    /// Describes `name`, returning `None` when the index does not exist.
    pub fn describe_index(&self, name: &IndexName) -> Result<Option<IndexDescription>> {
        let resp = self
            .client
            .get(self.index_url(name))
            .send()
            .with_context(|| format!("failed to describe index {}", name))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp, "describe index")?;
        let description = resp
            .json()
            .with_context(|| format!("invalid description for index {}", name))?;
        Ok(Some(description))
    }

    /// Creates a serverless cosine index.
    pub fn create_index(&self, spec: &IndexSpec) -> Result<IndexDescription> {
        anyhow::ensure!(spec.dimension > 0, "embedding dimension must be positive");
        let body = CreateIndexRequest {
            name: spec.name.as_str(),
            dimension: spec.dimension,
            metric: METRIC,
            spec: ServerlessEnvelope {
                serverless: Serverless {
                    cloud: &spec.cloud,
                    region: &spec.region,
                },
            },
        };
        let resp = self
            .client
            .post(format!("{}/indexes", self.controller_url))
            .json(&body)
            .send()
            .with_context(|| format!("failed to create index {}", spec.name))?;
        let resp = check(resp, "create index")?;
        resp.json()
            .with_context(|| format!("invalid create response for index {}", spec.name))
    }

    /// Deletes `name`. Deleting a missing index is not an error.
    pub fn delete_index(&self, name: &IndexName) -> Result<()> {
        let resp = self
            .client
            .delete(self.index_url(name))
            .send()
            .with_context(|| format!("failed to delete index {}", name))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(resp, "delete index")?;
        Ok(())
    }

    /// Polls until the service reports `name` ready.
    pub fn wait_until_ready(
        &self,
        name: &IndexName,
        policy: ReadyPolicy,
    ) -> Result<IndexDescription> {
        for attempt in 1..=policy.max_attempts.max(1) {
            if let Some(description) = self.describe_index(name)? {
                if description.status.ready {
                    return Ok(description);
                }
                tracing::info!(
                    index = %name,
                    state = %description.status.state,
                    attempt,
                    "waiting for index to become ready"
                );
            } else {
                tracing::info!(index = %name, attempt, "index not visible yet");
            }
            thread::sleep(policy.interval);
        }
        anyhow::bail!(
            "index {} was not ready after {} attempts",
            name,
            policy.max_attempts.max(1)
        )
    }

    /// Polls until `name` no longer exists.
    pub fn wait_until_deleted(&self, name: &IndexName, policy: ReadyPolicy) -> Result<()> {
        for attempt in 1..=policy.max_attempts.max(1) {
            if self.describe_index(name)?.is_none() {
                return Ok(());
            }
            tracing::info!(index = %name, attempt, "waiting for index deletion");
            thread::sleep(policy.interval);
        }
        anyhow::bail!(
            "index {} still exists after {} attempts",
            name,
            policy.max_attempts.max(1)
        )
    }

    /// Opens a data plane handle on a described index.
    pub fn open_index(
        &self,
        description: &IndexDescription,
        namespace: &str,
    ) -> Result<PineconeIndex> {
        anyhow::ensure!(
            !description.host.trim().is_empty(),
            "index {} has no data plane host yet",
            description.name
        );
        let host = description.host.trim().trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        Ok(PineconeIndex {
            client: self.client.clone(),
            base_url,
            name: description.name.clone(),
            namespace: namespace.to_string(),
            dimension: description.dimension,
        })
    }
}

/// Data plane handle on one index and namespace.
#[derive(Clone)]
pub struct PineconeIndex {
    client: Client,
    base_url: String,
    name: String,
    namespace: String,
    dimension: usize,
}

impl PineconeIndex {
    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl VectorIndex for PineconeIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn upsert(&self, entries: &[IndexEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let body = UpsertRequest {
            vectors: entries,
            namespace: &self.namespace,
        };
        let resp = self
            .client
            .post(format!("{}/vectors/upsert", self.base_url))
            .json(&body)
            .send()
            .with_context(|| format!("failed to upsert into index {}", self.name))?;
        let parsed: UpsertResponse = check(resp, "upsert")?
            .json()
            .context("invalid upsert response")?;
        Ok(parsed.upserted_count)
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: &self.namespace,
        };
        let resp = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(&body)
            .send()
            .with_context(|| format!("failed to query index {}", self.name))?;
        let parsed: QueryResponse = check(resp, "query")?
            .json()
            .context("invalid query response")?;
        Ok(parsed.matches)
    }

    fn stats(&self) -> Result<IndexStats> {
        let resp = self
            .client
            .post(format!("{}/describe_index_stats", self.base_url))
            .json(&serde_json::json!({}))
            .send()
            .with_context(|| format!("failed to read stats for index {}", self.name))?;
        check(resp, "describe index stats")?
            .json()
            .context("invalid index stats response")
    }
}

fn check(resp: Response, operation: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(anyhow!("Pinecone {} failed ({}): {}", operation, status, body))
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'static str,
    spec: ServerlessEnvelope<'a>,
}

#[derive(Serialize)]
struct ServerlessEnvelope<'a> {
    serverless: Serverless<'a>,
}

#[derive(Serialize)]
struct Serverless<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexEntry],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}
