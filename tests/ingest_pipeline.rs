mod common;

use std::io::Write;

use common::{fixture, seeded_index, KeywordEmbedder, MemoryIndex};
use course_search::ingest::check_duplicates;
use course_search::{build_entries, load_courses, upsert_entries, DuplicatePolicy, VectorIndex};
use pretty_assertions::assert_eq;

#[test]
fn fixture_catalog_is_indexed_by_course_name() {
    let embedder = KeywordEmbedder::new();
    let index = seeded_index(&embedder);
    assert_eq!(
        index.ids(),
        vec!["Introduction to Python", "Introduction to SQL"]
    );
    let stats = index.stats().unwrap();
    assert_eq!(stats.total_vector_count, 2);
    assert_eq!(stats.dimension, KeywordEmbedder::dimension());
}

#[test]
fn reingesting_overwrites_instead_of_duplicating() {
    let embedder = KeywordEmbedder::new();
    let records = load_courses(&fixture("courses.csv"), "windows-1252").unwrap();
    let (entries, dimension) = build_entries(&records, &embedder).unwrap();
    let index = MemoryIndex::new(dimension);
    upsert_entries(&index, &entries, 100, |_| {}).unwrap();
    upsert_entries(&index, &entries, 100, |_| {}).unwrap();
    assert_eq!(index.stats().unwrap().total_vector_count, 2);
}

#[test]
fn large_catalog_is_upserted_in_batches_of_one_hundred() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "course_name,course_slug,course_technology,course_topic,course_description,course_description_short"
    )
    .unwrap();
    for n in 0..250 {
        writeln!(
            file,
            "Course {n},course-{n},Python,Programming,Python functions part {n},Short {n}"
        )
        .unwrap();
    }
    file.flush().unwrap();

    let records = load_courses(file.path(), "windows-1252").unwrap();
    assert_eq!(records.len(), 250);
    assert!(check_duplicates(&records, DuplicatePolicy::Reject)
        .unwrap()
        .is_empty());

    let embedder = KeywordEmbedder::new();
    let (entries, dimension) = build_entries(&records, &embedder).unwrap();
    let index = MemoryIndex::new(dimension);
    let mut progress = Vec::new();
    let summary = upsert_entries(&index, &entries, 100, |sent| progress.push(sent)).unwrap();

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.upserted, 250);
    assert_eq!(*index.upsert_calls.lock().unwrap(), vec![100, 100, 50]);
    assert_eq!(progress, vec![100, 200, 250]);
}

#[test]
fn windows_1252_catalog_decodes_accents() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        b"course_name,course_slug,course_technology,course_topic,course_description,course_description_short\n\
          Caf\xe9 Analytics,cafe-analytics,SQL,Data,Analyse caf\xe9 sales with SQL,Caf\xe9 data\n",
    )
    .unwrap();
    let records = load_courses(file.path(), "windows-1252").unwrap();
    assert_eq!(records[0].name, "Café Analytics");
}
