//! Randomized index writer harness for Strata
//!
//! Wraps an [`IndexEngine`](strata_core::IndexEngine) so that tests exercise
//! rarely taken paths without varying parameters by hand:
//! - RandomPolicy: the single seeded source of every decision
//! - TestPointInfoStream / RandomYield: thread perturbation at engine test points
//! - RandomIndexWriter: randomized routing, auto-commit, reader acquisition
//! - HarnessConfig: tunable odds and intervals, `STRATA_TEST_SEED`
//!
//! # Example
//!
//! ```
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use strata_core::{Document, Field, IndexReader};
//! use strata_engine::{Directory, IndexWriter, IndexWriterConfig};
//! use strata_randomized::RandomIndexWriter;
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let mut writer: RandomIndexWriter<IndexWriter> =
//!     RandomIndexWriter::new(&mut rng, Directory::ram(), IndexWriterConfig::new()).unwrap();
//! writer
//!     .add_document(Document::new().with(Field::keyword("id", "1")))
//!     .unwrap();
//! let reader = writer.get_reader().unwrap();
//! assert_eq!(reader.num_docs(), 1);
//! writer.close().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod policy;
pub mod test_point;
pub mod writer;

pub use config::{test_seed, HarnessConfig, SEED_ENV_VAR};
pub use policy::RandomPolicy;
pub use test_point::{RandomYield, TestPoint, TestPointInfoStream};
pub use writer::{Decision, ForceMergeKind, RandomIndexWriter, ReaderPath};
