//! Pinecone Inference embedding client.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::{ensure_batch_fits, Embedder, InputKind, JsonEndpoint, RemoteOptions};
use crate::pinecone::auth_headers;

/// Embeds with a model hosted by Pinecone Inference.
pub struct PineconeEmbedder {
    endpoint: JsonEndpoint,
    model: String,
    batch_size: usize,
}

impl PineconeEmbedder {
    /// Builds a new Pinecone Inference client.
    ///
    /// # Arguments
    /// * `api_key` - Value for the `Api-Key` header (usually from `PINECONE_API_KEY`)
    /// * `controller_url` - Control plane base, e.g. `https://api.pinecone.io`
    /// * `model` - Hosted model name (e.g. `multilingual-e5-large`)
    pub fn new(
        api_key: &str,
        controller_url: &str,
        model: String,
        options: RemoteOptions,
    ) -> Result<Self> {
        anyhow::ensure!(
            controller_url.starts_with("http://") || controller_url.starts_with("https://"),
            "Pinecone controller URL must be an http(s) URL"
        );
        anyhow::ensure!(!model.trim().is_empty(), "missing Pinecone model name");
        let url = format!("{}/embed", controller_url.trim_end_matches('/'));
        Ok(Self {
            endpoint: JsonEndpoint::new("Pinecone inference", url, auth_headers(api_key)?, &options)?,
            model,
            batch_size: options.batch_size.max(1),
        })
    }
}

impl Embedder for PineconeEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(&self, inputs: &[&str], kind: InputKind) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        ensure_batch_fits(inputs.len(), self.batch_size)?;
        let request = InferenceRequest {
            model: &self.model,
            parameters: InferenceParameters {
                input_type: kind.as_str(),
                truncate: "END",
            },
            inputs: inputs.iter().map(|text| InferenceInput { text }).collect(),
        };
        let payload: InferenceResponse = self.endpoint.post(&request)?;
        payload.into_embeddings(inputs.len())
    }
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    model: &'a str,
    parameters: InferenceParameters,
    inputs: Vec<InferenceInput<'a>>,
}

#[derive(Serialize)]
struct InferenceParameters {
    input_type: &'static str,
    truncate: &'static str,
}

#[derive(Serialize)]
struct InferenceInput<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    data: Vec<InferenceData>,
}

impl InferenceResponse {
    fn into_embeddings(self, expected_len: usize) -> Result<Vec<Vec<f32>>> {
        if self.data.is_empty() {
            return Err(anyhow!("Pinecone response missing embedding payloads"));
        }
        anyhow::ensure!(
            self.data.len() == expected_len,
            "Pinecone returned {} embeddings for {} inputs",
            self.data.len(),
            expected_len
        );
        Ok(self.data.into_iter().map(|d| d.values).collect())
    }
}

#[derive(Debug, Deserialize)]
struct InferenceData {
    values: Vec<f32>,
}
