//! Core traits for the index engine contract
//!
//! This module defines the traits a document-indexing engine implements so
//! that higher layers (the randomized harness in particular) can drive it
//! without knowing its internals.
//!
//! Thread safety: engines and readers must be `Send + Sync`. Writers take
//! `&self` and synchronize internally; merge work may run on threads owned by
//! the engine.

use std::sync::Arc;

use crate::document::{Document, Query, Term};
use crate::error::StrataResult;
use crate::info_stream::InfoStream;

/// Configuration knobs the harness needs to see or replace before the engine
/// is opened.
pub trait EngineConfig {
    /// Currently configured diagnostic sink, if any.
    fn info_stream(&self) -> Option<Arc<dyn InfoStream>>;

    /// Replace the diagnostic sink.
    fn set_info_stream(&mut self, stream: Arc<dyn InfoStream>);

    /// Name of the codec segments will be written with.
    fn codec_name(&self) -> &str;

    /// True if the configured merge policy never merges.
    fn is_no_merge(&self) -> bool;
}

/// Point-in-time view over an index.
///
/// Document ids are dense in `0..max_doc()`; deleted ids stay allocated until
/// a merge reclaims them.
pub trait IndexReader: Send + Sync {
    /// Number of live (non-deleted) documents.
    fn num_docs(&self) -> usize;

    /// One greater than the largest document id, deleted or not.
    fn max_doc(&self) -> usize;

    /// Number of segments backing this reader.
    fn segment_count(&self) -> usize;

    /// True if `doc` is deleted or out of range.
    fn is_deleted(&self, doc: u32) -> bool;

    /// Stored fields of a live document, with doc-value updates folded in.
    fn document(&self, doc: u32) -> Option<Document>;

    /// Ids of live documents matching `query`, ascending.
    fn search(&self, query: &Query) -> Vec<u32>;

    /// Numeric doc value of a live document.
    fn numeric_value(&self, doc: u32, field: &str) -> Option<i64>;

    /// Binary doc value of a live document.
    fn binary_value(&self, doc: u32, field: &str) -> Option<Vec<u8>>;

    /// True if any document id is deleted.
    fn has_deletions(&self) -> bool {
        self.num_docs() < self.max_doc()
    }

    /// Number of live documents containing `term`.
    fn doc_freq(&self, term: &Term) -> usize {
        self.search(&Query::Term(term.clone())).len()
    }

    /// Ids of all live documents, ascending.
    fn live_docs(&self) -> Vec<u32> {
        (0..self.max_doc() as u32)
            .filter(|&doc| !self.is_deleted(doc))
            .collect()
    }
}

/// The write API of an indexing engine.
///
/// Every mutating call is individually valid; callers (and the randomized
/// harness) may choose freely among semantically equivalent calls, e.g.
/// [`add_document`](IndexEngine::add_document) versus
/// [`add_documents`](IndexEngine::add_documents) with one document.
pub trait IndexEngine: Sized + Send + Sync {
    /// Backing storage location.
    type Directory: Clone + Send + Sync;
    /// Writer configuration.
    type Config: EngineConfig;
    /// Reader type returned by reader acquisition.
    type Reader: IndexReader;

    /// Open a writer over `directory`.
    fn open(directory: Self::Directory, config: Self::Config) -> StrataResult<Self>;

    /// Open a standalone reader over the latest commit in `directory`,
    /// using up to `thread_hint` threads to load it.
    fn open_reader(directory: &Self::Directory, thread_hint: usize) -> StrataResult<Self::Reader>;

    /// Directory this writer writes to.
    fn directory(&self) -> &Self::Directory;

    /// Name of the codec in use.
    fn codec_name(&self) -> &str;

    /// Add one document.
    fn add_document(&self, doc: Document) -> StrataResult<()>;

    /// Add a block of documents atomically.
    fn add_documents(&self, docs: Vec<Document>) -> StrataResult<()>;

    /// Delete documents containing `term`, then add `doc`.
    fn update_document(&self, term: &Term, doc: Document) -> StrataResult<()>;

    /// Delete documents containing `term`, then add `docs` as a block.
    fn update_documents(&self, term: &Term, docs: Vec<Document>) -> StrataResult<()>;

    /// Delete documents containing `term`.
    fn delete_documents(&self, term: &Term) -> StrataResult<()>;

    /// Delete documents matching `query`.
    fn delete_by_query(&self, query: &Query) -> StrataResult<()>;

    /// Set (or clear) a numeric doc value on every document containing `term`.
    fn update_numeric_value(&self, term: &Term, field: &str, value: Option<i64>)
        -> StrataResult<()>;

    /// Set (or clear) a binary doc value on every document containing `term`.
    fn update_binary_value(
        &self,
        term: &Term,
        field: &str,
        value: Option<Vec<u8>>,
    ) -> StrataResult<()>;

    /// Delete every document.
    fn delete_all(&self) -> StrataResult<()>;

    /// Copy the live documents of `readers` into this index.
    fn add_indexes(&self, readers: &[Self::Reader]) -> StrataResult<()>;

    /// Flush buffered changes and make them durable in the directory.
    fn commit(&self) -> StrataResult<()>;

    /// Merge until at most `max_segments` segments remain.
    fn force_merge(&self, max_segments: usize) -> StrataResult<()>;

    /// Rewrite segments that carry deletions.
    fn force_merge_deletes(&self, wait: bool) -> StrataResult<()>;

    /// Number of flushed segments.
    fn segment_count(&self) -> usize;

    /// Live documents, buffered ones included, with pending deletes applied.
    fn num_docs(&self) -> usize;

    /// Documents including deleted ones not yet merged away.
    fn max_doc(&self) -> usize;

    /// Near-real-time reader over the writer's current state.
    fn reader(&self, apply_deletions: bool) -> StrataResult<Self::Reader>;

    /// Close the writer, releasing its resources.
    fn close(self) -> StrataResult<()>;
}
