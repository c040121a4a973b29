//! Strata testkit - randomized writer harness for Strata indexes
//!
//! Bundles the document model, the reference engine and the randomized
//! harness that drives it.
//!
//! # Quick Start
//!
//! ```
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use strata_testkit::{Directory, Document, Field, IndexWriter, IndexWriterConfig, RandomIndexWriter};
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let mut writer: RandomIndexWriter<IndexWriter> =
//!     RandomIndexWriter::new(&mut rng, Directory::ram(), IndexWriterConfig::new()).unwrap();
//! writer.add_document(Document::new().with(Field::text("body", "hello"))).unwrap();
//! writer.close().unwrap();
//! ```
//!
//! # Architecture
//!
//! - `strata-core`: documents, queries, errors and the engine traits
//! - `strata-engine`: segment-based reference [`IndexWriter`]
//! - `strata-randomized`: [`RandomIndexWriter`] and its policy/test points

pub use strata_core::*;
pub use strata_engine::{
    Directory, DirectoryReader, IndexWriter, IndexWriterConfig, MergePolicy, MergeScheduler,
    TracingInfoStream, DEFAULT_CODEC, KNOWN_CODECS, LEGACY_CODEC,
};
pub use strata_randomized::*;
