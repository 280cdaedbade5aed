//! Course catalog rows and the text/metadata derived from them.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

/// Encoding label used by the catalog exports this pipeline was built for.
pub const DEFAULT_ENCODING: &str = "windows-1252";

/// One row of the course catalog CSV.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CourseRecord {
    /// Course name; doubles as the index id.
    #[serde(rename = "course_name")]
    pub name: String,
    /// URL slug.
    #[serde(rename = "course_slug")]
    pub slug: String,
    /// Primary technology taught (e.g. `Python`).
    #[serde(rename = "course_technology")]
    pub technology: String,
    /// Topic bucket.
    #[serde(rename = "course_topic")]
    pub topic: String,
    /// Long-form description.
    #[serde(rename = "course_description")]
    pub description: String,
    /// One-line description shown in search results.
    #[serde(rename = "course_description_short")]
    pub description_short: String,
}

impl CourseRecord {
    /// Synthesized sentence carrying the identifying fields.
    ///
    /// Always a single line. Catalogs embedded by earlier tooling broke this sentence after
    /// the slug clause (newline plus indentation), so vectors from such an index differ
    /// slightly from the ones produced here; re-ingest with `--recreate` to align them.
    pub fn summary_sentence(&self) -> String {
        format!(
            "The course name is {}, the slug is {}, the technology is {} and the course topic is {}",
            self.name, self.slug, self.technology, self.topic
        )
    }

    /// Text submitted to the embedding model for this course.
    pub fn description_text(&self) -> String {
        [
            self.description.as_str(),
            self.summary_sentence().as_str(),
            self.description_short.as_str(),
        ]
        .join(" ")
    }

    /// Display fields stored alongside the vector.
    pub fn metadata(&self) -> CourseMetadata {
        CourseMetadata {
            course_name: self.name.clone(),
            description: self.description_short.clone(),
            technology: self.technology.clone(),
            topic: self.topic.clone(),
            slug: self.slug.clone(),
        }
    }
}

/// Metadata persisted with each index entry and echoed back by search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseMetadata {
    /// Course name.
    #[serde(default)]
    pub course_name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Technology tag.
    #[serde(default)]
    pub technology: String,
    /// Topic tag.
    #[serde(default)]
    pub topic: String,
    /// URL slug.
    #[serde(default)]
    pub slug: String,
}

/// Reads and decodes the catalog at `path`.
pub fn load_courses(path: &Path, encoding_label: &str) -> Result<Vec<CourseRecord>> {
    let encoding = Encoding::for_label(encoding_label.trim().as_bytes())
        .ok_or_else(|| anyhow!("unknown text encoding {:?}", encoding_label))?;
    let bytes = fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        tracing::warn!(
            path = %path.display(),
            encoding = encoding.name(),
            "catalog contained bytes that could not be decoded; replaced with U+FFFD"
        );
    }
    read_courses(text.as_bytes()).with_context(|| format!("invalid course catalog {:?}", path))
}

/// Header columns every catalog must carry.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "course_name",
    "course_slug",
    "course_technology",
    "course_topic",
    "course_description",
    "course_description_short",
];

/// Parses catalog rows from an already-decoded UTF-8 reader.
///
/// Fails when any of [`REQUIRED_COLUMNS`] is absent from the header, even if the
/// catalog has no rows.
pub fn read_courses<R: std::io::Read>(reader: R) -> Result<Vec<CourseRecord>> {
    let mut rows = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = rows.headers().context("failed to read catalog header")?;
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|header| header == *column))
        .collect();
    if !missing.is_empty() {
        bail!("catalog header is missing column(s): {}", missing.join(", "));
    }
    let mut records = Vec::new();
    for (row, result) in rows.deserialize::<CourseRecord>().enumerate() {
        // header is line 1
        let record = result.with_context(|| format!("invalid course row at line {}", row + 2))?;
        records.push(record);
    }
    Ok(records)
}
