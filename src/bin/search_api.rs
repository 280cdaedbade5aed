use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use course_search::config::{init_tracing, load_env};
use course_search::search::{DEFAULT_EMBEDDING_CACHE_SIZE, DEFAULT_MAX_TOP_K};
use course_search::{
    router, AppState, EmbedderArgs, IndexArgs, SearchLimits, SearchService, VectorIndex,
};
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(
    name = "course-search-api",
    about = "HTTP API answering semantic course searches against the vector index"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "COURSE_SEARCH_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    /// Maximum top-k allowed per request; larger requests are clamped.
    #[arg(long, default_value_t = DEFAULT_MAX_TOP_K)]
    max_top_k: usize,

    /// Cached query embeddings (0 disables the cache).
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_CACHE_SIZE)]
    embedding_cache_size: usize,

    #[command(flatten)]
    index: IndexArgs,

    #[command(flatten)]
    embedder: EmbedderArgs,
}

fn main() -> Result<()> {
    let env_file = load_env();
    init_tracing();
    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }
    let cli = ApiCli::parse();
    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;

    // The blocking HTTP clients are built before the async runtime starts.
    let index_name = cli.index.index_name()?;
    let client = cli.index.client()?;
    let Some(description) = client.describe_index(&index_name)? else {
        let available: Vec<String> = client
            .list_indexes()?
            .into_iter()
            .map(|index| index.name)
            .collect();
        bail!(
            "index {} does not exist (available: [{}]); run course-ingest first",
            index_name,
            available.join(", ")
        );
    };
    let index = client.open_index(&description, &cli.index.namespace)?;
    let stats = index.stats()?;
    tracing::info!(
        index = index.name(),
        vectors = stats.total_vector_count,
        dimension = index.dimension(),
        "connected to index"
    );

    let embedder = cli.embedder.build(&cli.index)?;
    let limits = SearchLimits {
        max_top_k: cli.max_top_k.max(1),
        embedding_cache_size: cli.embedding_cache_size,
    };
    let service = SearchService::new(embedder, Arc::new(index), limits);
    let dimension = service
        .verify_dimensions()
        .context("query embedder does not match the index")?;
    tracing::info!(dimension, model = %cli.embedder.model(), "query embedder verified");

    let state = AppState::new(service);
    let runtime = Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(serve(addr, state.clone()))?;
    drop(runtime);
    drop(state);
    Ok(())
}

async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    println!("Course search API listening on http://{}", addr);
    axum::serve(listener, router(state))
        .await
        .context("server shutdown")?;
    Ok(())
}
