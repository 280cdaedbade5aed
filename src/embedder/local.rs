//! In-process embeddings via fastembed (`local_embed` feature).

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use fastembed::{EmbeddingModel as FastembedModel, InitOptions, TextEmbedding};

use super::{Embedder, InputKind};

/// Model name accepted by [`LocalEmbedder::load`].
pub const LOCAL_MODEL_NAME: &str = "all-MiniLM-L6-v2";
/// Output width of [`LOCAL_MODEL_NAME`].
pub const LOCAL_MODEL_DIMENSIONS: usize = 384;

/// Wrapper around a fastembed model. `TextEmbedding::embed` takes `&mut self`, hence the mutex.
pub struct LocalEmbedder {
    inner: Mutex<TextEmbedding>,
    batch_size: usize,
}

impl LocalEmbedder {
    /// Loads the model, downloading weights into `cache_dir` on first use.
    pub fn load(model: &str, cache_dir: Option<PathBuf>, batch_size: usize) -> Result<Self> {
        anyhow::ensure!(
            model.eq_ignore_ascii_case(LOCAL_MODEL_NAME),
            "local embedder only supports {}, got {}",
            LOCAL_MODEL_NAME,
            model
        );
        let mut options =
            InitOptions::new(FastembedModel::AllMiniLML6V2).with_show_download_progress(true);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }
        let inner = TextEmbedding::try_new(options)
            .map_err(|err| anyhow!("failed to load embedding model {}: {}", model, err))?;
        Ok(Self {
            inner: Mutex::new(inner),
            batch_size: batch_size.max(1),
        })
    }
}

impl Embedder for LocalEmbedder {
    fn model(&self) -> &str {
        LOCAL_MODEL_NAME
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(&self, inputs: &[&str], _kind: InputKind) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| anyhow!("embedding model mutex poisoned: {}", err))?;
        guard
            .embed(inputs.to_vec(), Some(self.batch_size))
            .map_err(|err| anyhow!("local embedding failed: {}", err))
    }
}
