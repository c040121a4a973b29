//! The index writer
//!
//! All mutable state sits behind one `parking_lot::Mutex`. Operations get a
//! sequence number from a single counter: documents remember theirs, and
//! buffered deletes / doc-value updates only reach documents with a lower
//! one. That is what makes `update_document` (delete, then add) safe while
//! both halves are still buffered.
//!
//! # Lifecycle
//!
//! 1. `open`: take the directory lock, load the latest commit if any
//! 2. mutate: documents buffer in RAM and flush into segments
//! 3. `commit`: flush, resolve buffered deletes, persist a commit point
//! 4. `close`: commit if configured and dirty, release the lock
//!
//! Dropping a writer without `close` discards uncommitted changes.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::{
    DocValueUpdate, Document, EngineConfig, IndexEngine, InfoStream, Query, StrataError,
    StrataResult, Term, TEST_POINT_COMPONENT, WRITER_COMPONENT,
};

use crate::config::IndexWriterConfig;
use crate::directory::{CommitPoint, Directory, DirectoryLock};
use crate::info_stream::{emit, TracingInfoStream};
use crate::merge::OneMerge;
use crate::reader::DirectoryReader;
use crate::segment::{document_matches, Segment, SegmentState};

/// A buffered delete or doc-value update.
#[derive(Debug)]
enum PendingOp {
    Delete {
        seq: u64,
        query: Query,
    },
    DocValue {
        seq: u64,
        term: Term,
        field: String,
        update: DocValueUpdate,
    },
}

#[derive(Debug)]
struct WriterState {
    segments: Vec<SegmentState>,
    /// Documents not yet flushed, with their sequence numbers
    buffer: Vec<(u64, Document)>,
    pending: Vec<PendingOp>,
    next_seq: u64,
    next_segment_id: u64,
    generation: u64,
    /// Changes since the last commit
    dirty: bool,
}

impl WriterState {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn next_segment_id(&mut self) -> u64 {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        id
    }
}

/// Single writer over a [`Directory`].
pub struct IndexWriter {
    directory: Directory,
    config: IndexWriterConfig,
    info_stream: Arc<dyn InfoStream>,
    state: Mutex<WriterState>,
    _lock: DirectoryLock,
}

impl std::fmt::Debug for IndexWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWriter")
            .field("directory", &self.directory)
            .field("config", &self.config)
            .finish()
    }
}

impl IndexWriter {
    /// Open a writer, continuing from the latest commit in `directory`.
    ///
    /// # Errors
    ///
    /// - [`StrataError::Config`] if the config is invalid
    /// - [`StrataError::LockObtainFailed`] if another writer holds the directory
    /// - I/O or corruption errors loading the existing commit
    pub fn open(directory: Directory, config: IndexWriterConfig) -> StrataResult<Self> {
        config.validate()?;
        let lock = directory.obtain_lock()?;
        let info_stream = config
            .info_stream()
            .unwrap_or_else(|| Arc::new(TracingInfoStream::new()) as Arc<dyn InfoStream>);

        let mut state = WriterState {
            segments: Vec::new(),
            buffer: Vec::new(),
            pending: Vec::new(),
            next_seq: 0,
            next_segment_id: 0,
            generation: 0,
            dirty: false,
        };
        if let Some(commit) = directory.read_commit(1)? {
            state.next_segment_id = commit.segments.iter().map(|s| s.id() + 1).max().unwrap_or(0);
            state.next_seq = commit
                .segments
                .iter()
                .filter_map(|s| s.core.max_seq())
                .max()
                .map_or(0, |s| s + 1);
            state.generation = commit.generation;
            state.segments = commit.segments;
        }

        tracing::info!(
            target: "strata::engine",
            directory = ?directory,
            codec = %config.codec,
            generation = state.generation,
            segments = state.segments.len(),
            merge_policy = config.merge_policy.name(),
            "Index writer opened"
        );
        emit(&*info_stream, WRITER_COMPONENT, || {
            format!("init: {:?} generation={}", config, state.generation)
        });

        Ok(IndexWriter {
            directory,
            config,
            info_stream,
            state: Mutex::new(state),
            _lock: lock,
        })
    }

    /// Writer configuration
    pub fn config(&self) -> &IndexWriterConfig {
        &self.config
    }

    /// Generation of the last commit this writer made or loaded; 0 if none.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// True if there are changes not yet committed.
    pub fn has_uncommitted_changes(&self) -> bool {
        self.state.lock().dirty
    }

    fn test_point(&self, message: &'static str) {
        emit(&*self.info_stream, TEST_POINT_COMPONENT, || message.to_string());
    }

    // ------------------------------------------------------------------------
    // Buffering
    // ------------------------------------------------------------------------

    fn buffer_documents(&self, delete: Option<&Term>, docs: Vec<Document>) -> StrataResult<()> {
        self.test_point("addDocument start");
        let mut state = self.state.lock();
        if let Some(term) = delete {
            let seq = state.next_seq();
            state.pending.push(PendingOp::Delete {
                seq,
                query: Query::Term(term.clone()),
            });
            state.dirty = true;
        }
        if docs.is_empty() {
            return Ok(());
        }
        for doc in docs {
            let seq = state.next_seq();
            state.buffer.push((seq, doc));
        }
        state.dirty = true;
        if state.buffer.len() >= self.config.max_buffered_docs {
            self.flush(&mut state);
            self.maybe_merge(&mut state)?;
        }
        Ok(())
    }

    fn buffer_op(&self, op: impl FnOnce(u64) -> PendingOp) {
        let mut state = self.state.lock();
        let seq = state.next_seq();
        state.pending.push(op(seq));
        state.dirty = true;
    }

    /// Turn buffered documents into a new segment.
    fn flush(&self, state: &mut WriterState) {
        if state.buffer.is_empty() {
            return;
        }
        self.test_point("flush start");
        let id = state.next_segment_id();
        let (seqs, docs): (Vec<u64>, Vec<Document>) =
            std::mem::take(&mut state.buffer).into_iter().unzip();
        let segment = Segment::new(id, &self.config.codec, docs, seqs);
        emit(&*self.info_stream, WRITER_COMPONENT, || {
            format!("flush: segment={} docs={}", id, segment.doc_count())
        });
        state.segments.push(SegmentState::new(segment));
    }

    /// Resolve buffered deletes and doc-value updates, in order.
    fn apply_pending(&self, state: &mut WriterState) {
        if state.pending.is_empty() {
            return;
        }
        self.test_point("applyDeletes start");
        let ops = std::mem::take(&mut state.pending);
        let mut deleted = 0usize;
        for op in &ops {
            match op {
                PendingOp::Delete { seq, query } => {
                    for segment in &mut state.segments {
                        let hits: Vec<u32> = segment
                            .matching(query)
                            .into_iter()
                            .filter(|&d| segment.core.seq(d) < *seq)
                            .collect();
                        for doc in hits {
                            if segment.delete(doc) {
                                deleted += 1;
                            }
                        }
                    }
                    let before = state.buffer.len();
                    state
                        .buffer
                        .retain(|(doc_seq, doc)| !(*doc_seq < *seq && document_matches(doc, query)));
                    deleted += before - state.buffer.len();
                }
                PendingOp::DocValue {
                    seq,
                    term,
                    field,
                    update,
                } => {
                    let query = Query::Term(term.clone());
                    for segment in &mut state.segments {
                        let hits: BTreeSet<u32> = segment.matching(&query);
                        for doc in hits {
                            if segment.core.seq(doc) < *seq && !segment.is_deleted(doc) {
                                segment.update_doc_value(doc, field, update);
                            }
                        }
                    }
                    for (doc_seq, doc) in &mut state.buffer {
                        if *doc_seq < *seq && document_matches(doc, &query) {
                            doc.apply_doc_value(field, update);
                        }
                    }
                }
            }
        }
        let before = state.segments.len();
        state.segments.retain(|s| s.live_count() > 0);
        let dropped = before - state.segments.len();
        emit(&*self.info_stream, WRITER_COMPONENT, || {
            format!(
                "applyDeletes: ops={} deleted={} dropped_segments={}",
                ops.len(),
                deleted,
                dropped
            )
        });
    }

    // ------------------------------------------------------------------------
    // Merging
    // ------------------------------------------------------------------------

    fn maybe_merge(&self, state: &mut WriterState) -> StrataResult<()> {
        let plans = self.config.merge_policy.find_merges(&state.segments);
        self.run_merges(state, plans)
    }

    /// Execute planned merges and swap the results in for their sources.
    fn run_merges(&self, state: &mut WriterState, plans: Vec<Vec<usize>>) -> StrataResult<()> {
        if plans.is_empty() {
            return Ok(());
        }
        let mut merged_away = BTreeSet::new();
        let mut merges = Vec::with_capacity(plans.len());
        for plan in plans {
            let sources = plan
                .iter()
                .map(|&i| {
                    merged_away.insert(i);
                    state.segments[i].clone()
                })
                .collect();
            merges.push(OneMerge {
                segment_id: state.next_segment_id(),
                codec: self.config.codec.clone(),
                sources,
            });
        }

        let results = self.config.merge_scheduler.run(merges, &*self.info_stream)?;

        self.test_point("commitMerge");
        let mut index = 0usize;
        state.segments.retain(|_| {
            let keep = !merged_away.contains(&index);
            index += 1;
            keep
        });
        state.segments.extend(
            results
                .into_iter()
                .filter(|s| s.doc_count() > 0)
                .map(SegmentState::new),
        );
        state.dirty = true;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Writer API
    // ------------------------------------------------------------------------

    /// Add one document
    pub fn add_document(&self, doc: Document) -> StrataResult<()> {
        self.buffer_documents(None, vec![doc])
    }

    /// Add documents as one block
    pub fn add_documents(&self, docs: Vec<Document>) -> StrataResult<()> {
        self.buffer_documents(None, docs)
    }

    /// Replace documents containing `term` with `doc`
    pub fn update_document(&self, term: &Term, doc: Document) -> StrataResult<()> {
        self.buffer_documents(Some(term), vec![doc])
    }

    /// Replace documents containing `term` with `docs`
    pub fn update_documents(&self, term: &Term, docs: Vec<Document>) -> StrataResult<()> {
        self.buffer_documents(Some(term), docs)
    }

    /// Delete documents matching `query`; resolved lazily.
    pub fn delete_by_query(&self, query: &Query) -> StrataResult<()> {
        let query = query.clone();
        self.buffer_op(|seq| PendingOp::Delete { seq, query });
        Ok(())
    }

    /// Set or clear a doc value on every document containing `term`.
    pub fn update_doc_value(
        &self,
        term: &Term,
        field: &str,
        update: DocValueUpdate,
    ) -> StrataResult<()> {
        if field.is_empty() {
            return Err(StrataError::invalid_input("doc value field name is empty"));
        }
        let term = term.clone();
        let field = field.to_string();
        self.buffer_op(|seq| PendingOp::DocValue {
            seq,
            term,
            field,
            update,
        });
        Ok(())
    }

    /// Drop every document, buffered or flushed.
    pub fn delete_all(&self) -> StrataResult<()> {
        let mut state = self.state.lock();
        let dropped = state.segments.len();
        state.segments.clear();
        state.buffer.clear();
        state.pending.clear();
        state.dirty = true;
        emit(&*self.info_stream, WRITER_COMPONENT, || {
            format!("deleteAll: dropped_segments={}", dropped)
        });
        Ok(())
    }

    /// Copy the live documents of `readers` into one new segment.
    pub fn add_indexes(&self, readers: &[DirectoryReader]) -> StrataResult<()> {
        let docs: Vec<Document> = readers
            .iter()
            .flat_map(|r| r.segments().iter())
            .flat_map(|s| s.live_documents().into_iter().map(|(_, doc)| doc))
            .collect();
        let mut state = self.state.lock();
        self.flush(&mut state);
        if docs.is_empty() {
            return Ok(());
        }
        let seqs: Vec<u64> = docs.iter().map(|_| state.next_seq()).collect();
        let id = state.next_segment_id();
        let segment = Segment::new(id, &self.config.codec, docs, seqs);
        emit(&*self.info_stream, WRITER_COMPONENT, || {
            format!(
                "addIndexes: readers={} segment={} docs={}",
                readers.len(),
                id,
                segment.doc_count()
            )
        });
        state.segments.push(SegmentState::new(segment));
        state.dirty = true;
        self.maybe_merge(&mut state)
    }

    /// Flush, resolve buffered deletes and persist a new commit point.
    pub fn commit(&self) -> StrataResult<()> {
        self.test_point("startCommit");
        let mut state = self.state.lock();
        self.flush(&mut state);
        self.apply_pending(&mut state);
        let commit = CommitPoint {
            generation: state.generation + 1,
            segments: state.segments.clone(),
        };
        self.directory.write_commit(&commit)?;
        state.generation = commit.generation;
        state.dirty = false;
        self.test_point("finishCommit");
        tracing::info!(
            target: "strata::engine",
            generation = commit.generation,
            segments = commit.segments.len(),
            "Commit complete"
        );
        Ok(())
    }

    /// Merge down to at most `max_segments` segments.
    ///
    /// A no-op under [`MergePolicy::NoMerge`](crate::MergePolicy::NoMerge).
    pub fn force_merge(&self, max_segments: usize) -> StrataResult<()> {
        if max_segments == 0 {
            return Err(StrataError::invalid_input(
                "force_merge max_segments must be at least 1",
            ));
        }
        let mut state = self.state.lock();
        self.flush(&mut state);
        self.apply_pending(&mut state);
        emit(&*self.info_stream, WRITER_COMPONENT, || {
            format!(
                "forceMerge: max_segments={} current={}",
                max_segments,
                state.segments.len()
            )
        });
        loop {
            let plans = self
                .config
                .merge_policy
                .find_forced_merges(&state.segments, max_segments);
            if plans.is_empty() {
                return Ok(());
            }
            self.run_merges(&mut state, plans)?;
        }
    }

    /// Rewrite every segment that carries deletions.
    ///
    /// Merges always complete before returning, so `wait` only shows up in
    /// diagnostics.
    pub fn force_merge_deletes(&self, wait: bool) -> StrataResult<()> {
        let mut state = self.state.lock();
        self.flush(&mut state);
        self.apply_pending(&mut state);
        let plans = self
            .config
            .merge_policy
            .find_forced_deletes_merges(&state.segments);
        emit(&*self.info_stream, WRITER_COMPONENT, || {
            format!("forceMergeDeletes: wait={} merges={}", wait, plans.len())
        });
        self.run_merges(&mut state, plans)
    }

    /// Number of flushed segments
    pub fn segment_count(&self) -> usize {
        self.state.lock().segments.len()
    }

    /// Live documents, buffered included, after resolving buffered deletes.
    pub fn num_docs(&self) -> usize {
        let mut state = self.state.lock();
        self.apply_pending(&mut state);
        state.segments.iter().map(SegmentState::live_count).sum::<usize>() + state.buffer.len()
    }

    /// Documents including deleted ones not yet merged away.
    pub fn max_doc(&self) -> usize {
        let state = self.state.lock();
        state.segments.iter().map(SegmentState::max_doc).sum::<usize>() + state.buffer.len()
    }

    /// Near-real-time reader; flushes the buffer first.
    ///
    /// With `apply_deletions == false`, buffered deletes and doc-value
    /// updates stay pending and are invisible to the returned reader.
    pub fn reader(&self, apply_deletions: bool) -> StrataResult<DirectoryReader> {
        let mut state = self.state.lock();
        self.flush(&mut state);
        if apply_deletions {
            self.apply_pending(&mut state);
        }
        self.maybe_merge(&mut state)?;
        emit(&*self.info_stream, WRITER_COMPONENT, || {
            format!(
                "getReader: apply_deletions={} segments={}",
                apply_deletions,
                state.segments.len()
            )
        });
        Ok(DirectoryReader::new(state.segments.clone(), None))
    }

    /// Close the writer, committing first if configured and dirty.
    pub fn close(self) -> StrataResult<()> {
        let dirty = self.state.lock().dirty;
        if self.config.commit_on_close && dirty {
            self.commit()?;
        }
        emit(&*self.info_stream, WRITER_COMPONENT, || "close".to_string());
        tracing::info!(target: "strata::engine", directory = ?self.directory, "Index writer closed");
        Ok(())
    }
}

impl IndexEngine for IndexWriter {
    type Directory = Directory;
    type Config = IndexWriterConfig;
    type Reader = DirectoryReader;

    fn open(directory: Directory, config: IndexWriterConfig) -> StrataResult<Self> {
        IndexWriter::open(directory, config)
    }

    fn open_reader(directory: &Directory, thread_hint: usize) -> StrataResult<DirectoryReader> {
        DirectoryReader::open(directory, thread_hint)
    }

    fn directory(&self) -> &Directory {
        &self.directory
    }

    fn codec_name(&self) -> &str {
        &self.config.codec
    }

    fn add_document(&self, doc: Document) -> StrataResult<()> {
        IndexWriter::add_document(self, doc)
    }

    fn add_documents(&self, docs: Vec<Document>) -> StrataResult<()> {
        IndexWriter::add_documents(self, docs)
    }

    fn update_document(&self, term: &Term, doc: Document) -> StrataResult<()> {
        IndexWriter::update_document(self, term, doc)
    }

    fn update_documents(&self, term: &Term, docs: Vec<Document>) -> StrataResult<()> {
        IndexWriter::update_documents(self, term, docs)
    }

    fn delete_documents(&self, term: &Term) -> StrataResult<()> {
        self.delete_by_query(&Query::Term(term.clone()))
    }

    fn delete_by_query(&self, query: &Query) -> StrataResult<()> {
        IndexWriter::delete_by_query(self, query)
    }

    fn update_numeric_value(&self, term: &Term, field: &str, value: Option<i64>) -> StrataResult<()> {
        self.update_doc_value(term, field, DocValueUpdate::Numeric(value))
    }

    fn update_binary_value(
        &self,
        term: &Term,
        field: &str,
        value: Option<Vec<u8>>,
    ) -> StrataResult<()> {
        self.update_doc_value(term, field, DocValueUpdate::Binary(value))
    }

    fn delete_all(&self) -> StrataResult<()> {
        IndexWriter::delete_all(self)
    }

    fn add_indexes(&self, readers: &[DirectoryReader]) -> StrataResult<()> {
        IndexWriter::add_indexes(self, readers)
    }

    fn commit(&self) -> StrataResult<()> {
        IndexWriter::commit(self)
    }

    fn force_merge(&self, max_segments: usize) -> StrataResult<()> {
        IndexWriter::force_merge(self, max_segments)
    }

    fn force_merge_deletes(&self, wait: bool) -> StrataResult<()> {
        IndexWriter::force_merge_deletes(self, wait)
    }

    fn segment_count(&self) -> usize {
        IndexWriter::segment_count(self)
    }

    fn num_docs(&self) -> usize {
        IndexWriter::num_docs(self)
    }

    fn max_doc(&self) -> usize {
        IndexWriter::max_doc(self)
    }

    fn reader(&self, apply_deletions: bool) -> StrataResult<DirectoryReader> {
        IndexWriter::reader(self, apply_deletions)
    }

    fn close(self) -> StrataResult<()> {
        IndexWriter::close(self)
    }
}
