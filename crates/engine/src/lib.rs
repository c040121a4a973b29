//! Segmented document index engine for Strata
//!
//! This crate implements the engine contract from `strata-core`:
//! - IndexWriter: buffered writes, sequence-numbered deletes, commits
//! - Segments: immutable stored docs + postings, copy-on-write live docs
//! - Merging: tiered / no-merge policies, serial or concurrent schedulers
//! - Directory: in-memory or filesystem commit storage
//! - DirectoryReader: point-in-time readers, NRT or opened from a commit
//!
//! Diagnostics flow through an [`InfoStream`](strata_core::InfoStream) on the
//! `"IW"`, `"MS"` and `"TP"` channels.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod directory;
pub mod info_stream;
pub mod merge;
pub mod reader;
pub mod segment;
pub mod tokenizer;
pub mod writer;

pub use config::{IndexWriterConfig, DEFAULT_CODEC, KNOWN_CODECS, LEGACY_CODEC};
pub use directory::Directory;
pub use info_stream::TracingInfoStream;
pub use merge::{MergePolicy, MergeScheduler};
pub use reader::DirectoryReader;
pub use segment::Segment;
pub use writer::IndexWriter;
