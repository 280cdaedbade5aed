//! Command-line/environment configuration shared by the ingest and search binaries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::embedder::openai::OpenAiEmbedder;
use crate::embedder::pinecone::PineconeEmbedder;
use crate::embedder::{Embedder, RemoteOptions};
use crate::pinecone::{PineconeClient, DEFAULT_CONTROLLER_URL};
use crate::vector_store::IndexName;

/// Loads `.env` (if any) into the process environment. Variables already set win.
///
/// Runs before [`init_tracing`] so `RUST_LOG` may come from the file; the loaded path is
/// returned for logging once the subscriber is up.
pub fn load_env() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Installs the stderr `tracing` subscriber, honouring `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Vector index connection flags.
#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// API key for the vector index service
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pub pinecone_api_key: String,

    /// Name of the index holding course vectors
    #[arg(long, env = "COURSE_INDEX_NAME", default_value = "my-index")]
    pub index_name: String,

    /// Namespace inside the index (empty = default namespace)
    #[arg(long, env = "COURSE_INDEX_NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Control plane base URL
    #[arg(long, env = "PINECONE_CONTROLLER_URL", default_value = DEFAULT_CONTROLLER_URL)]
    pub pinecone_controller_url: String,

    /// Max seconds to wait for each index request
    #[arg(long, env = "PINECONE_TIMEOUT_SECS", default_value_t = 30)]
    pub pinecone_timeout_secs: u64,
}

impl IndexArgs {
    /// Validated index name.
    pub fn index_name(&self) -> Result<IndexName> {
        IndexName::new(self.index_name.as_str())
    }

    /// Builds the control plane client.
    pub fn client(&self) -> Result<PineconeClient> {
        PineconeClient::new(
            &self.pinecone_api_key,
            &self.pinecone_controller_url,
            Duration::from_secs(self.pinecone_timeout_secs.max(1)),
        )
    }
}

/// Embedding backends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EmbedProvider {
    /// Pinecone Inference, authenticated with the index API key.
    Pinecone,
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
    /// In-process fastembed model (requires the `local_embed` feature).
    Local,
}

impl EmbedProvider {
    /// Model used when `--embed-model` is not given.
    pub fn default_model(self) -> &'static str {
        match self {
            EmbedProvider::Pinecone => "multilingual-e5-large",
            EmbedProvider::Openai => "text-embedding-3-small",
            EmbedProvider::Local => "all-MiniLM-L6-v2",
        }
    }
}

/// Embedding model flags. Flattened into both binaries so ingest and search agree.
#[derive(Args, Debug, Clone)]
pub struct EmbedderArgs {
    /// Embedding backend
    #[arg(
        long,
        env = "COURSE_EMBED_PROVIDER",
        value_enum,
        default_value_t = EmbedProvider::Pinecone
    )]
    pub embed_provider: EmbedProvider,

    /// Model identifier (defaults depend on the provider)
    #[arg(long, env = "COURSE_EMBED_MODEL")]
    pub embed_model: Option<String>,

    /// Optional dimension override when supported by the model (OpenAI only)
    #[arg(long, env = "COURSE_EMBED_DIMENSIONS")]
    pub embed_dimensions: Option<usize>,

    /// OpenAI API key, required with `--embed-provider openai`
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL for the OpenAI-compatible API
    #[arg(
        long,
        env = "COURSE_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Directory caching local model weights
    #[arg(long, env = "COURSE_EMBED_CACHE_DIR")]
    pub embed_cache_dir: Option<PathBuf>,

    /// Max texts sent per embedding request
    #[arg(long, env = "COURSE_EMBED_BATCH", default_value_t = 32)]
    pub embed_batch: usize,

    /// Max seconds to wait for each embedding request
    #[arg(long, env = "COURSE_EMBED_TIMEOUT_SECS", default_value_t = 30)]
    pub embed_timeout_secs: u64,

    /// Attempts for rate limits or transient embedding errors
    #[arg(long, env = "COURSE_EMBED_MAX_RETRIES", default_value_t = 5)]
    pub embed_max_retries: usize,
}

impl EmbedderArgs {
    /// Effective model name.
    pub fn model(&self) -> String {
        self.embed_model
            .clone()
            .unwrap_or_else(|| self.embed_provider.default_model().to_string())
    }

    /// Builds the configured embedder. Pinecone Inference reuses the index credentials.
    pub fn build(&self, index: &IndexArgs) -> Result<Arc<dyn Embedder>> {
        let options = RemoteOptions {
            timeout: Duration::from_secs(self.embed_timeout_secs.max(1)),
            max_retries: self.embed_max_retries,
            batch_size: self.embed_batch.max(1),
        };
        let model = self.model();
        tracing::info!(provider = ?self.embed_provider, %model, "building embedder");
        match self.embed_provider {
            EmbedProvider::Pinecone => Ok(Arc::new(PineconeEmbedder::new(
                &index.pinecone_api_key,
                &index.pinecone_controller_url,
                model,
                options,
            )?)),
            EmbedProvider::Openai => {
                let api_key = self.openai_api_key.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("--openai-api-key (OPENAI_API_KEY) is required for the openai provider")
                })?;
                Ok(Arc::new(OpenAiEmbedder::new(
                    api_key,
                    &self.openai_base_url,
                    model,
                    self.embed_dimensions,
                    options,
                )?))
            }
            EmbedProvider::Local => self.build_local(&model, options.batch_size),
        }
    }

    #[cfg(feature = "local_embed")]
    fn build_local(&self, model: &str, batch_size: usize) -> Result<Arc<dyn Embedder>> {
        Ok(Arc::new(crate::embedder::local::LocalEmbedder::load(
            model,
            self.embed_cache_dir.clone(),
            batch_size,
        )?))
    }

    #[cfg(not(feature = "local_embed"))]
    fn build_local(&self, _model: &str, _batch_size: usize) -> Result<Arc<dyn Embedder>> {
        anyhow::bail!("the local embedder requires building with `--features local_embed`")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        index: IndexArgs,
        #[command(flatten)]
        embedder: EmbedderArgs,
    }

    fn parse(args: &[&str]) -> TestCli {
        let mut argv = vec!["test", "--pinecone-api-key", "pc-test"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).expect("parse")
    }

    #[test]
    fn load_env_returns_the_file_it_read() {
        if let Some(path) = load_env() {
            assert!(path.is_file(), "{path:?}");
            assert_eq!(path.file_name().and_then(|name| name.to_str()), Some(".env"));
        }
    }

    #[test]
    fn defaults_match_catalog_deployment() {
        let cli = parse(&[]);
        assert_eq!(cli.index.index_name().expect("name").as_str(), "my-index");
        assert_eq!(cli.index.pinecone_controller_url, DEFAULT_CONTROLLER_URL);
        assert_eq!(cli.embedder.embed_provider, EmbedProvider::Pinecone);
        assert_eq!(cli.embedder.model(), "multilingual-e5-large");
    }

    #[test]
    fn explicit_model_overrides_provider_default() {
        let cli = parse(&["--embed-provider", "openai", "--embed-model", "custom"]);
        assert_eq!(cli.embedder.embed_provider, EmbedProvider::Openai);
        assert_eq!(cli.embedder.model(), "custom");
    }

    #[test]
    fn openai_requires_key() {
        let mut cli = parse(&["--embed-provider", "openai"]);
        cli.embedder.openai_api_key = None;
        let err = cli.embedder.build(&cli.index).err().expect("missing key");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn builds_pinecone_embedder_from_index_credentials() {
        let cli = parse(&["--embed-batch", "0"]);
        let embedder = cli.embedder.build(&cli.index).expect("build");
        assert_eq!(embedder.model(), "multilingual-e5-large");
        assert_eq!(embedder.batch_size(), 1);
    }
}
