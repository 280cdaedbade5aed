//! OpenAI-compatible `/embeddings` backend.

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use super::{ensure_batch_fits, Embedder, InputKind, JsonEndpoint, RemoteOptions};

/// Embeds through any service speaking the OpenAI embeddings protocol.
pub struct OpenAiEmbedder {
    endpoint: JsonEndpoint,
    model: String,
    dimensions: Option<usize>,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Connects to `{base_url}/embeddings` with a bearer token.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimensions: Option<usize>,
        options: RemoteOptions,
    ) -> Result<Self> {
        let api_key = api_key.trim();
        anyhow::ensure!(!api_key.is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI model name");
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .context("OpenAI API key is not a valid header value")?;
        headers.insert(AUTHORIZATION, bearer);
        let url = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            endpoint: JsonEndpoint::new("OpenAI embeddings", url, headers, &options)?,
            model,
            dimensions,
            batch_size: options.batch_size.max(1),
        })
    }
}

impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    // symmetric models: `kind` has no wire representation
    fn embed_batch(&self, inputs: &[&str], _kind: InputKind) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        ensure_batch_fits(inputs.len(), self.batch_size)?;
        let reply: OpenAiReply = self.endpoint.post(&OpenAiRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        })?;
        reply.into_ordered(inputs.len())
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct OpenAiReply {
    data: Vec<OpenAiVector>,
}

#[derive(Deserialize)]
struct OpenAiVector {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiReply {
    /// Places each vector at its input position; every position must be filled once.
    fn into_ordered(self, expected: usize) -> Result<Vec<Vec<f32>>> {
        let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
        for item in self.data {
            let slot = slots.get_mut(item.index).ok_or_else(|| {
                anyhow!(
                    "OpenAI returned embedding index {} for {} inputs",
                    item.index,
                    expected
                )
            })?;
            anyhow::ensure!(
                slot.is_none(),
                "OpenAI returned embedding index {} twice",
                item.index
            );
            *slot = Some(item.embedding);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                slot.ok_or_else(|| anyhow!("OpenAI response has no embedding for input {}", position))
            })
            .collect()
    }
}
