#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Result};
use course_search::{Embedder, IndexEntry, IndexStats, InputKind, QueryMatch, VectorIndex};

const VOCABULARY: &[&str] = &[
    "python",
    "programming",
    "functions",
    "loops",
    "sql",
    "queries",
    "database",
    "databases",
    "relational",
    "fundamentals",
    "select",
    "join",
];

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Bag-of-words embedder over a fixed vocabulary, deterministic and offline.
pub struct KeywordEmbedder {
    pub queries: Mutex<usize>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            queries: Mutex::new(0),
        }
    }

    pub fn dimension() -> usize {
        VOCABULARY.len()
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; VOCABULARY.len()];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let token = token.to_lowercase();
            if let Some(slot) = VOCABULARY.iter().position(|word| *word == token) {
                vector[slot] += 1.0;
            }
        }
        vector
    }
}

impl Embedder for KeywordEmbedder {
    fn model(&self) -> &str {
        "keyword-test"
    }

    fn batch_size(&self) -> usize {
        8
    }

    fn embed_batch(&self, inputs: &[&str], kind: InputKind) -> Result<Vec<Vec<f32>>> {
        if inputs.len() > self.batch_size() {
            bail!("batch of {} exceeds {}", inputs.len(), self.batch_size());
        }
        if kind == InputKind::Query {
            *self.queries.lock().unwrap() += inputs.len();
        }
        Ok(inputs.iter().map(|text| Self::vectorize(text)).collect())
    }
}

/// Exact cosine search over entries kept in memory, keyed by id.
pub struct MemoryIndex {
    dimension: usize,
    entries: Mutex<Vec<IndexEntry>>,
    pub upsert_calls: Mutex<Vec<usize>>,
}

impl MemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Mutex::new(Vec::new()),
            upsert_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.id.clone())
            .collect()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndex for MemoryIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn upsert(&self, batch: &[IndexEntry]) -> Result<usize> {
        self.upsert_calls.lock().unwrap().push(batch.len());
        let mut entries = self.entries.lock().unwrap();
        for entry in batch {
            if entry.values.len() != self.dimension {
                bail!(
                    "vector {} has {} dimensions, index expects {}",
                    entry.id,
                    entry.values.len(),
                    self.dimension
                );
            }
            match entries.iter_mut().find(|existing| existing.id == entry.id) {
                Some(existing) => *existing = entry.clone(),
                None => entries.push(entry.clone()),
            }
        }
        Ok(batch.len())
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
        let entries = self.entries.lock().unwrap();
        let mut scored: Vec<QueryMatch> = entries
            .iter()
            .map(|entry| QueryMatch {
                id: entry.id.clone(),
                score: cosine(vector, &entry.values),
                metadata: Some(entry.metadata.clone()),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            total_vector_count: self.entries.lock().unwrap().len() as u64,
            dimension: self.dimension,
        })
    }
}

/// Loads the fixture catalog into a fresh memory index.
pub fn seeded_index(embedder: &KeywordEmbedder) -> MemoryIndex {
    let records = course_search::load_courses(&fixture("courses.csv"), "windows-1252")
        .expect("fixture loads");
    let (entries, dimension) =
        course_search::build_entries(&records, embedder).expect("entries build");
    let index = MemoryIndex::new(dimension);
    course_search::upsert_entries(&index, &entries, 100, |_| {}).expect("upsert");
    index
}
