//! Core types and traits for Strata
//!
//! This crate defines the foundational types used throughout the system:
//! - Document model: Document, Field, FieldValue, Term, Query, DocValueUpdate
//! - Error: StrataError / StrataResult
//! - InfoStream: diagnostic sink seam and its reserved component names
//! - Traits: the index engine contract (IndexEngine, IndexReader, EngineConfig)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod info_stream;
pub mod traits;

pub use document::{DocValueUpdate, Document, Field, FieldValue, Query, Term};
pub use error::{StrataError, StrataResult};
pub use info_stream::{
    InfoStream, NullInfoStream, MERGE_COMPONENT, TEST_POINT_COMPONENT, WRITER_COMPONENT,
};
pub use traits::{EngineConfig, IndexEngine, IndexReader};
