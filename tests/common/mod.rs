//! Shared test utilities for the integration suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::SeedableRng;
use strata_testkit::{
    Directory, Document, Field, HarnessConfig, IndexWriter, IndexWriterConfig, RandomIndexWriter,
    Term,
};
use tempfile::TempDir;

// ============================================================================
// Directories
// ============================================================================

/// Filesystem directory that lives as long as the returned TempDir.
pub fn fs_directory() -> (TempDir, Directory) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let directory = Directory::open_fs(temp.path().join("index")).expect("Failed to open fs directory");
    (temp, directory)
}

// ============================================================================
// Documents
// ============================================================================

pub fn doc(i: u64) -> Document {
    Document::new()
        .with(Field::keyword("id", i.to_string()))
        .with(Field::text("body", format!("the quick brown fox number {}", i)))
        .with(Field::numeric("n", i as i64))
}

pub fn id(i: u64) -> Term {
    Term::new("id", i.to_string())
}

// ============================================================================
// Writers
// ============================================================================

pub fn random_writer(
    seed: u64,
    directory: Directory,
    harness: HarnessConfig,
) -> RandomIndexWriter<IndexWriter> {
    let mut rng = StdRng::seed_from_u64(seed);
    RandomIndexWriter::with_harness_config(&mut rng, directory, IndexWriterConfig::new(), harness)
        .expect("Failed to open random writer")
}
