use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use course_search::config::{init_tracing, load_env};
use course_search::course::DEFAULT_ENCODING;
use course_search::ingest::{check_duplicates, DEFAULT_UPSERT_BATCH};
use course_search::{
    build_entries, load_courses, prepare_index, upsert_entries, DuplicatePolicy, EmbedderArgs,
    IndexArgs, IndexSpec, ReadyPolicy, VectorIndex,
};

#[derive(Parser, Debug)]
#[command(
    name = "course-ingest",
    about = "Embed the course catalog and upsert it into the vector index"
)]
struct IngestCli {
    /// Course catalog CSV
    #[arg(long, env = "COURSE_INGEST_INPUT", default_value = "course_descriptions.csv")]
    input: PathBuf,

    /// Text encoding of the catalog (any WHATWG label)
    #[arg(long, env = "COURSE_INGEST_ENCODING", default_value = DEFAULT_ENCODING)]
    encoding: String,

    /// Delete and recreate the index instead of upserting into it
    #[arg(long, default_value_t = false)]
    recreate: bool,

    /// Cloud provider for newly created indexes
    #[arg(long, env = "COURSE_INDEX_CLOUD", default_value = "aws")]
    cloud: String,

    /// Cloud region for newly created indexes
    #[arg(long, env = "COURSE_INDEX_REGION", default_value = "us-east-1")]
    region: String,

    /// Entries sent per upsert request
    #[arg(long, env = "COURSE_UPSERT_BATCH", default_value_t = DEFAULT_UPSERT_BATCH)]
    upsert_batch: usize,

    /// Seconds between index readiness checks
    #[arg(long, default_value_t = 5)]
    ready_poll_secs: u64,

    /// Readiness checks before giving up
    #[arg(long, default_value_t = 60)]
    ready_max_attempts: usize,

    /// How to treat rows sharing a course name
    #[arg(long, value_enum, default_value_t = DuplicatePolicy::Overwrite)]
    on_duplicate: DuplicatePolicy,

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
    let cli = IngestCli::parse();

    let index_name = cli.index.index_name()?;
    let records = load_courses(&cli.input, &cli.encoding)
        .with_context(|| format!("failed to load course catalog {:?}", cli.input))?;
    if records.is_empty() {
        println!("No courses in {:?}; nothing to do.", cli.input);
        return Ok(());
    }
    tracing::info!(rows = records.len(), input = ?cli.input, "loaded course catalog");
    check_duplicates(&records, cli.on_duplicate)?;

    let embedder = cli.embedder.build(&cli.index)?;
    let (entries, dimension) = build_entries(&records, embedder.as_ref())?;
    tracing::info!(
        entries = entries.len(),
        dimension,
        model = embedder.model(),
        "embeddings created"
    );

    let client = cli.index.client()?;
    let spec = IndexSpec {
        name: index_name,
        dimension,
        cloud: cli.cloud,
        region: cli.region,
    };
    let policy = ReadyPolicy {
        interval: Duration::from_secs(cli.ready_poll_secs),
        max_attempts: cli.ready_max_attempts.max(1),
    };
    let description = prepare_index(&client, &spec, cli.recreate, policy)?;
    let index = client.open_index(&description, &cli.index.namespace)?;
    tracing::info!(index = index.name(), "index ready");

    let summary = upsert_entries(&index, &entries, cli.upsert_batch, |sent| {
        if let Err(err) = render_progress(sent) {
            tracing::debug!(error = %err, "failed to render progress");
        }
    })?;
    println!();
    println!(
        "Successfully upserted {} record{} in {} batch{} into {}.",
        summary.upserted,
        if summary.upserted == 1 { "" } else { "s" },
        summary.batches,
        if summary.batches == 1 { "" } else { "es" },
        spec.name
    );

    let stats = index.stats()?;
    println!(
        "Index {} now holds {} vectors of dimension {}.",
        spec.name, stats.total_vector_count, stats.dimension
    );
    Ok(())
}

fn render_progress(upserted: usize) -> Result<()> {
    let plural = if upserted == 1 { "" } else { "s" };
    print!("\rUpserted {} record{}...", upserted, plural);
    io::stdout().flush()?;
    Ok(())
}
