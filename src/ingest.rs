//! Catalog ingestion: describe, embed, prepare the index, upsert in batches.

use std::collections::HashMap;

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::course::CourseRecord;
use crate::embedder::{Embedder, InputKind};
use crate::pinecone::{IndexDescription, IndexSpec, PineconeClient, ReadyPolicy, METRIC};
use crate::vector_store::{IndexEntry, VectorIndex};

/// Entries sent per upsert request unless overridden.
pub const DEFAULT_UPSERT_BATCH: usize = 100;

/// What to do when two catalog rows share a course name.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DuplicatePolicy {
    /// Keep going; the later row overwrites the earlier entry in the index.
    #[default]
    Overwrite,
    /// Abort before touching the index.
    Reject,
}

/// Course names appearing more than once, in first-seen order.
pub fn find_duplicates(records: &[CourseRecord]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut ordered = Vec::new();
    for record in records {
        let count = counts.entry(record.name.as_str()).or_insert(0);
        *count += 1;
        if *count == 2 {
            ordered.push(record.name.clone());
        }
    }
    ordered
}

/// Applies `policy` to the duplicate ids in `records`.
pub fn check_duplicates(records: &[CourseRecord], policy: DuplicatePolicy) -> Result<Vec<String>> {
    let duplicates = find_duplicates(records);
    if duplicates.is_empty() {
        return Ok(duplicates);
    }
    match policy {
        DuplicatePolicy::Overwrite => {
            tracing::warn!(
                count = duplicates.len(),
                ids = ?duplicates,
                "duplicate course names; later rows overwrite earlier ones"
            );
            Ok(duplicates)
        }
        DuplicatePolicy::Reject => anyhow::bail!(
            "{} duplicate course name(s) in catalog: {}",
            duplicates.len(),
            duplicates.join(", ")
        ),
    }
}

/// Embeds every course description, in catalog order, and pairs it with its metadata.
///
/// All vectors must share one width, which is returned alongside the entries.
pub fn build_entries(
    records: &[CourseRecord],
    embedder: &dyn Embedder,
) -> Result<(Vec<IndexEntry>, usize)> {
    let texts: Vec<String> = records.iter().map(CourseRecord::description_text).collect();
    let batch_size = embedder.batch_size().max(1);
    let mut entries = Vec::with_capacity(records.len());
    let mut dimension = None;
    for (batch_no, (chunk, texts)) in records
        .chunks(batch_size)
        .zip(texts.chunks(batch_size))
        .enumerate()
    {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = embedder
            .embed_batch(&inputs, InputKind::Passage)
            .with_context(|| format!("failed to embed batch {}", batch_no + 1))?;
        anyhow::ensure!(
            vectors.len() == chunk.len(),
            "embedding count {} mismatched pending {}",
            vectors.len(),
            chunk.len()
        );
        for (record, vector) in chunk.iter().zip(vectors) {
            let expected = *dimension.get_or_insert(vector.len());
            anyhow::ensure!(
                vector.len() == expected && expected > 0,
                "embedding for {:?} has {} dimensions, expected {}",
                record.name,
                vector.len(),
                expected
            );
            entries.push(IndexEntry::from_course(record, vector));
        }
        tracing::debug!(embedded = entries.len(), total = records.len(), "embedded batch");
    }
    Ok((entries, dimension.unwrap_or(0)))
}

/// Makes sure an index matching `spec` exists and is ready.
///
/// With `recreate`, any existing index is deleted first. Otherwise an existing index is
/// reused as long as its dimension matches.
pub fn prepare_index(
    client: &PineconeClient,
    spec: &IndexSpec,
    recreate: bool,
    policy: ReadyPolicy,
) -> Result<IndexDescription> {
    let existing = client.describe_index(&spec.name)?;
    match existing {
        Some(_) if recreate => {
            tracing::warn!(index = %spec.name, "deleting existing index");
            client.delete_index(&spec.name)?;
            client.wait_until_deleted(&spec.name, policy)?;
            create(client, spec)?;
        }
        Some(description) => {
            anyhow::ensure!(
                description.dimension == spec.dimension,
                "index {} has dimension {} but embeddings have {}; rerun with --recreate or \
                 switch to the model the index was built with",
                spec.name,
                description.dimension,
                spec.dimension
            );
            anyhow::ensure!(
                description.metric.eq_ignore_ascii_case(METRIC),
                "index {} uses the {} metric but search scores assume {}; rerun with --recreate",
                spec.name,
                description.metric,
                METRIC
            );
            tracing::info!(index = %spec.name, "reusing existing index");
        }
        None => create(client, spec)?,
    }
    client.wait_until_ready(&spec.name, policy)
}

fn create(client: &PineconeClient, spec: &IndexSpec) -> Result<()> {
    tracing::info!(
        index = %spec.name,
        dimension = spec.dimension,
        cloud = %spec.cloud,
        region = %spec.region,
        "creating index"
    );
    client.create_index(spec)?;
    Ok(())
}

/// Outcome of [`upsert_entries`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Requests sent.
    pub batches: usize,
    /// Entries acknowledged by the service.
    pub upserted: usize,
}

/// Upserts `entries` in order, `batch_size` at a time. Stops at the first failed batch.
///
/// `on_progress` receives the running total of sent entries after each batch.
pub fn upsert_entries<F>(
    index: &dyn VectorIndex,
    entries: &[IndexEntry],
    batch_size: usize,
    mut on_progress: F,
) -> Result<UpsertSummary>
where
    F: FnMut(usize),
{
    let batch_size = batch_size.max(1);
    let mut summary = UpsertSummary::default();
    let mut sent = 0usize;
    for (batch_no, batch) in entries.chunks(batch_size).enumerate() {
        let accepted = index.upsert(batch).with_context(|| {
            format!(
                "upsert batch {} ({} entries) failed after {} entries were written",
                batch_no + 1,
                batch.len(),
                sent
            )
        })?;
        summary.batches += 1;
        summary.upserted += accepted;
        sent += batch.len();
        on_progress(sent);
    }
    Ok(summary)
}
