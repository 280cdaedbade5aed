//! Embedding model clients.
//!
//! Ingest and search must embed with the same model, so both binaries build their
//! [`Embedder`] from the same [`crate::config::EmbedderArgs`].

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(feature = "local_embed")]
pub mod local;
pub mod openai;
pub mod pinecone;

/// Which side of the retrieval pair a text is on.
///
/// Asymmetric models (e.g. the e5 family) embed passages and queries differently;
/// symmetric backends ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Documents written into the index.
    Passage,
    /// Search queries.
    Query,
}

impl InputKind {
    /// Wire label used by inference APIs.
    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Passage => "passage",
            InputKind::Query => "query",
        }
    }
}

/// Text to vector model, shared read-only across requests.
pub trait Embedder: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Maximum inputs accepted by one [`Embedder::embed_batch`] call.
    fn batch_size(&self) -> usize;

    /// Embeds `inputs`, returning one vector per input in the same order.
    fn embed_batch(&self, inputs: &[&str], kind: InputKind) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single string.
    fn embed(&self, input: &str, kind: InputKind) -> Result<Vec<f32>> {
        self.embed_batch(&[input], kind)?
            .pop()
            .ok_or_else(|| anyhow!("{} returned no embedding", self.model()))
    }
}

/// Transport settings shared by the remote backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts per batch, including the first.
    pub max_retries: usize,
    /// Maximum inputs per request.
    pub batch_size: usize,
}

/// A JSON `POST` endpoint that retries rate limits and transient failures with capped
/// exponential backoff.
pub(crate) struct JsonEndpoint {
    client: Client,
    url: String,
    service: &'static str,
    max_attempts: usize,
}

impl JsonEndpoint {
    pub(crate) fn new(
        service: &'static str,
        url: String,
        headers: HeaderMap,
        options: &RemoteOptions,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .default_headers(headers)
            .build()
            .with_context(|| format!("failed to build {} HTTP client", service))?;
        Ok(Self {
            client,
            url,
            service,
            max_attempts: options.max_retries.max(1),
        })
    }

    pub(crate) fn post<B, R>(&self, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut attempt = 0usize;
        loop {
            let (retryable, err) = match self.client.post(&self.url).json(body).send() {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json()
                        .with_context(|| format!("failed to parse {} response", self.service));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    (
                        should_retry(status),
                        anyhow!("{} request failed ({}): {}", self.service, status, text),
                    )
                }
                Err(err) => (
                    is_retryable_error(&err),
                    anyhow::Error::new(err).context(format!("{} request failed", self.service)),
                ),
            };
            attempt += 1;
            if !retryable || attempt >= self.max_attempts {
                return Err(err);
            }
            tracing::warn!(service = self.service, attempt, error = %err, "retrying embedding request");
            thread::sleep(retry_backoff(attempt));
        }
    }
}

pub(crate) fn ensure_batch_fits(len: usize, batch_size: usize) -> Result<()> {
    anyhow::ensure!(
        len <= batch_size,
        "batch of {} exceeds configured max {}",
        len,
        batch_size
    );
    Ok(())
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}
