//! Randomized index writer
//!
//! [`RandomIndexWriter`] wraps any [`IndexEngine`] and, for every call,
//! picks one of several equivalent ways to carry it out:
//!
//! - single-document writes sometimes go through the batch entry point
//! - commits happen on their own after a random, growing number of writes
//! - reader requests choose between near-real-time and reopened readers,
//!   sometimes committing or force-merging first
//! - closing sometimes force-merges first
//!
//! Every choice comes from one seeded [`RandomPolicy`] and is appended to a
//! decision log, so a seed plus a call sequence fully reproduces a run.
//! Engine test points are intercepted by [`TestPointInfoStream`] to perturb
//! thread scheduling inside the engine.
//!
//! # Disposal
//!
//! [`close`](RandomIndexWriter::close) consumes the writer. Dropping it
//! without `close` performs the same disposal; during a panic unwind the
//! random merge is skipped and the engine is only closed.

use std::sync::Arc;

use rand::RngCore;
use strata_core::{
    Document, EngineConfig, IndexEngine, Query, StrataError, StrataResult, Term,
};

use crate::config::HarnessConfig;
use crate::policy::RandomPolicy;
use crate::test_point::{RandomYield, TestPoint, TestPointInfoStream};

/// How a reader request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderPath {
    /// Writer-backed near-real-time reader
    NearRealTime,
    /// Commit, then a reader over the new commit
    Reopen,
}

/// Outcome of a random force merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceMergeKind {
    /// Merged down to one segment
    Full,
    /// Merged down to at most `limit` segments
    Partial {
        /// Segment limit passed to the engine
        limit: usize,
    },
}

/// One randomized choice, in the order it was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First auto-commit threshold
    InitialThreshold(u64),
    /// Whether random force merges are enabled for this writer
    ForceMergeEnabled(bool),
    /// Whether a single-document write took the batch path
    BatchReroute(bool),
    /// An auto-commit fired at `counter`; the next fires at `next_threshold`
    AutoCommit {
        /// Write counter when the commit fired
        counter: u64,
        /// Counter value of the next auto-commit
        next_threshold: u64,
    },
    /// Whether a reader request force-merged first
    ReaderForceMerge(bool),
    /// Reader acquisition strategy
    ReaderPath(ReaderPath),
    /// Whether a near-real-time reader committed first
    NrtCommitFirst(bool),
    /// Reopen path: `Some(threads)` opened from the directory, `None` fell
    /// back to the writer's reader
    ReopenThreads(Option<usize>),
    /// A random force merge ran
    ForceMerge(ForceMergeKind),
    /// Whether close force-merged first
    CloseForceMerge(bool),
}

/// Seeded randomizing wrapper around an index engine's writer.
pub struct RandomIndexWriter<E: IndexEngine> {
    engine: Option<E>,
    policy: RandomPolicy,
    config: HarnessConfig,
    codec: String,
    /// add/update calls so far
    doc_count: u64,
    /// `doc_count` value of the next auto-commit
    flush_at: u64,
    flush_at_factor: f64,
    force_merge_enabled: bool,
    force_merge_assert_enabled: bool,
    reader_requested: bool,
    decisions: Vec<Decision>,
}

impl<E: IndexEngine> std::fmt::Debug for RandomIndexWriter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomIndexWriter")
            .field("seed", &self.policy.seed())
            .field("codec", &self.codec)
            .field("doc_count", &self.doc_count)
            .field("flush_at", &self.flush_at)
            .field("force_merge_enabled", &self.force_merge_enabled)
            .field("reader_requested", &self.reader_requested)
            .field("closed", &self.engine.is_none())
            .finish()
    }
}

impl<E: IndexEngine> RandomIndexWriter<E> {
    /// Open with the default [`HarnessConfig`].
    ///
    /// Draws two values from `rng`: the policy seed and the test-point seed.
    pub fn new<R: RngCore + ?Sized>(
        rng: &mut R,
        directory: E::Directory,
        config: E::Config,
    ) -> StrataResult<Self> {
        Self::with_harness_config(rng, directory, config, HarnessConfig::default())
    }

    /// Open with explicit harness knobs and the default [`RandomYield`]
    /// test point.
    pub fn with_harness_config<R: RngCore + ?Sized>(
        rng: &mut R,
        directory: E::Directory,
        config: E::Config,
        harness: HarnessConfig,
    ) -> StrataResult<Self> {
        harness.validate()?;
        let policy = RandomPolicy::substream(rng);
        let test_point = Arc::new(RandomYield::substream(rng, harness.yield_one_in));
        Self::open(policy, directory, config, harness, test_point)
    }

    /// Open with a caller-supplied test point instead of [`RandomYield`].
    ///
    /// Draws one value from `rng`: the policy seed.
    pub fn with_test_point<R: RngCore + ?Sized>(
        rng: &mut R,
        directory: E::Directory,
        config: E::Config,
        harness: HarnessConfig,
        test_point: Arc<dyn TestPoint>,
    ) -> StrataResult<Self> {
        harness.validate()?;
        let policy = RandomPolicy::substream(rng);
        Self::open(policy, directory, config, harness, test_point)
    }

    fn open(
        mut policy: RandomPolicy,
        directory: E::Directory,
        mut config: E::Config,
        harness: HarnessConfig,
        test_point: Arc<dyn TestPoint>,
    ) -> StrataResult<Self> {
        let stream = TestPointInfoStream::new(config.info_stream(), test_point);
        config.set_info_stream(Arc::new(stream));
        let no_merge = config.is_no_merge();

        let engine = E::open(directory, config)?;
        let codec = engine.codec_name().to_string();

        let flush_at = policy.int_in(harness.commit_interval_min, harness.commit_interval_max);
        let force_merge_enabled = !no_merge && policy.coin();

        tracing::debug!(
            target: "strata::randomized",
            seed = policy.seed(),
            codec = %codec,
            flush_at,
            force_merge_enabled,
            "RandomIndexWriter opened"
        );

        Ok(RandomIndexWriter {
            engine: Some(engine),
            policy,
            config: harness,
            codec,
            doc_count: 0,
            flush_at,
            flush_at_factor: 1.0,
            force_merge_enabled,
            force_merge_assert_enabled: true,
            reader_requested: false,
            decisions: vec![
                Decision::InitialThreshold(flush_at),
                Decision::ForceMergeEnabled(force_merge_enabled),
            ],
        })
    }

    fn engine(&self) -> StrataResult<&E> {
        self.engine.as_ref().ok_or(StrataError::Closed)
    }

    fn record(&mut self, decision: Decision) {
        tracing::trace!(target: "strata::randomized", ?decision, "decision");
        self.decisions.push(decision);
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Add a document, sometimes as a batch of one.
    pub fn add_document(&mut self, doc: Document) -> StrataResult<()> {
        let batched = self.policy.one_in(self.config.batch_reroute_one_in);
        self.record(Decision::BatchReroute(batched));
        let engine = self.engine()?;
        if batched {
            engine.add_documents(vec![doc])?;
        } else {
            engine.add_document(doc)?;
        }
        self.maybe_commit()
    }

    /// Add documents as one block.
    pub fn add_documents(&mut self, docs: Vec<Document>) -> StrataResult<()> {
        self.engine()?.add_documents(docs)?;
        self.maybe_commit()
    }

    /// Replace documents containing `term`, sometimes as a batch of one.
    pub fn update_document(&mut self, term: &Term, doc: Document) -> StrataResult<()> {
        let batched = self.policy.one_in(self.config.batch_reroute_one_in);
        self.record(Decision::BatchReroute(batched));
        let engine = self.engine()?;
        if batched {
            engine.update_documents(term, vec![doc])?;
        } else {
            engine.update_document(term, doc)?;
        }
        self.maybe_commit()
    }

    /// Replace documents containing `term` with a block.
    pub fn update_documents(&mut self, term: &Term, docs: Vec<Document>) -> StrataResult<()> {
        self.engine()?.update_documents(term, docs)?;
        self.maybe_commit()
    }

    /// Advance the write counter and commit when it reaches the threshold.
    ///
    /// The threshold moves ahead of the counter even if the commit fails,
    /// so one failed commit does not stop auto-commits for good.
    fn maybe_commit(&mut self) -> StrataResult<()> {
        self.doc_count += 1;
        if self.doc_count < self.flush_at {
            return Ok(());
        }
        let committed = self.engine()?.commit();

        let lo = scale(self.config.commit_interval_min, self.flush_at_factor);
        let hi = scale(self.config.commit_interval_max, self.flush_at_factor).max(lo);
        self.flush_at = self.doc_count + self.policy.int_in(lo, hi);
        if self.flush_at_factor < self.config.commit_growth_cap {
            self.flush_at_factor *= self.config.commit_growth;
        }
        tracing::debug!(
            target: "strata::randomized",
            doc_count = self.doc_count,
            next = self.flush_at,
            committed = committed.is_ok(),
            "Auto-commit"
        );
        self.record(Decision::AutoCommit {
            counter: self.doc_count,
            next_threshold: self.flush_at,
        });
        committed
    }

    /// Delete documents containing `term`.
    pub fn delete_documents(&mut self, term: &Term) -> StrataResult<()> {
        self.engine()?.delete_documents(term)
    }

    /// Delete documents matching `query`.
    pub fn delete_by_query(&mut self, query: &Query) -> StrataResult<()> {
        self.engine()?.delete_by_query(query)
    }

    /// Set or clear a numeric doc value.
    pub fn update_numeric_value(
        &mut self,
        term: &Term,
        field: &str,
        value: Option<i64>,
    ) -> StrataResult<()> {
        self.engine()?.update_numeric_value(term, field, value)
    }

    /// Set or clear a binary doc value.
    pub fn update_binary_value(
        &mut self,
        term: &Term,
        field: &str,
        value: Option<Vec<u8>>,
    ) -> StrataResult<()> {
        self.engine()?.update_binary_value(term, field, value)
    }

    /// Delete every document.
    pub fn delete_all(&mut self) -> StrataResult<()> {
        self.engine()?.delete_all()
    }

    /// Copy the live documents of `readers` into this index.
    pub fn add_indexes(&mut self, readers: &[E::Reader]) -> StrataResult<()> {
        self.engine()?.add_indexes(readers)
    }

    /// Commit now.
    pub fn commit(&mut self) -> StrataResult<()> {
        self.engine()?.commit()
    }

    /// Merge down to at most `max_segments` segments.
    pub fn force_merge(&mut self, max_segments: usize) -> StrataResult<()> {
        self.engine()?.force_merge(max_segments)
    }

    /// Rewrite segments with deletions, waiting for completion.
    pub fn force_merge_deletes(&mut self) -> StrataResult<()> {
        self.force_merge_deletes_with(true)
    }

    /// Rewrite segments with deletions.
    pub fn force_merge_deletes_with(&mut self, wait: bool) -> StrataResult<()> {
        self.engine()?.force_merge_deletes(wait)
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Live documents in the engine
    pub fn num_docs(&self) -> StrataResult<usize> {
        Ok(self.engine()?.num_docs())
    }

    /// Documents in the engine, deleted included
    pub fn max_doc(&self) -> StrataResult<usize> {
        Ok(self.engine()?.max_doc())
    }

    /// Segments in the engine
    pub fn segment_count(&self) -> StrataResult<usize> {
        Ok(self.engine()?.segment_count())
    }

    /// The wrapped engine
    pub fn inner(&self) -> StrataResult<&E> {
        self.engine()
    }

    /// Codec the engine writes with
    pub fn codec_name(&self) -> &str {
        &self.codec
    }

    /// Seed of the decision policy
    pub fn seed(&self) -> u64 {
        self.policy.seed()
    }

    /// Harness knobs in effect
    pub fn harness_config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Every randomized choice so far, oldest first.
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// add/update calls so far
    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }

    /// Counter value at which the next auto-commit fires
    pub fn next_commit_at(&self) -> u64 {
        self.flush_at
    }

    /// Current growth factor of the auto-commit interval
    pub fn commit_interval_factor(&self) -> f64 {
        self.flush_at_factor
    }

    /// True once any reader has been requested
    pub fn reader_requested(&self) -> bool {
        self.reader_requested
    }

    /// Whether random force merges run
    pub fn force_merge_enabled(&self) -> bool {
        self.force_merge_enabled
    }

    /// Enable or disable random force merges
    pub fn set_force_merge_enabled(&mut self, enabled: bool) {
        self.force_merge_enabled = enabled;
    }

    /// Whether partial force merges check the resulting segment count
    pub fn force_merge_assert_enabled(&self) -> bool {
        self.force_merge_assert_enabled
    }

    /// Enable or disable the partial force merge segment-count check
    pub fn set_force_merge_assert_enabled(&mut self, enabled: bool) {
        self.force_merge_assert_enabled = enabled;
    }

    // ------------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------------

    /// Reader with deletions applied.
    pub fn get_reader(&mut self) -> StrataResult<E::Reader> {
        self.get_reader_with(true)
    }

    /// Reader over the current index, acquired by a randomly chosen route.
    ///
    /// With `apply_deletions == false` the near-real-time route is always
    /// taken, since only the writer can hand out a reader that skips
    /// buffered deletes.
    pub fn get_reader_with(&mut self, apply_deletions: bool) -> StrataResult<E::Reader> {
        self.reader_requested = true;

        let merge_first = self.policy.one_in(self.config.reader_force_merge_one_in);
        self.record(Decision::ReaderForceMerge(merge_first));
        if merge_first {
            self.random_force_merge()?;
        }

        let nrt = !apply_deletions || (self.codec != self.config.legacy_codec && self.policy.coin());
        if nrt {
            self.record(Decision::ReaderPath(ReaderPath::NearRealTime));
            let commit_first = self.policy.one_in(self.config.nrt_commit_one_in);
            self.record(Decision::NrtCommitFirst(commit_first));
            let engine = self.engine()?;
            if commit_first {
                engine.commit()?;
            }
            return engine.reader(apply_deletions);
        }

        self.record(Decision::ReaderPath(ReaderPath::Reopen));
        self.engine()?.commit()?;
        if self.policy.coin() {
            let threads = self.policy.int_in(1, self.config.max_reader_threads) as usize;
            self.record(Decision::ReopenThreads(Some(threads)));
            E::open_reader(self.engine()?.directory(), threads)
        } else {
            self.record(Decision::ReopenThreads(None));
            self.engine()?.reader(apply_deletions)
        }
    }

    // ------------------------------------------------------------------------
    // Merging and disposal
    // ------------------------------------------------------------------------

    /// Force-merge to one segment or to a random limit.
    ///
    /// # Panics
    ///
    /// If the assertion flag is set and a partial merge leaves more segments
    /// than the limit.
    fn random_force_merge(&mut self) -> StrataResult<()> {
        if !self.force_merge_enabled {
            return Ok(());
        }
        let segment_count = self.engine()?.segment_count();
        if self.policy.coin() || segment_count == 0 {
            self.record(Decision::ForceMerge(ForceMergeKind::Full));
            tracing::debug!(target: "strata::randomized", "Random force merge to 1 segment");
            return self.engine()?.force_merge(1);
        }

        let limit = self.policy.int_in(1, segment_count as u64) as usize;
        self.record(Decision::ForceMerge(ForceMergeKind::Partial { limit }));
        tracing::debug!(
            target: "strata::randomized",
            limit,
            segment_count,
            "Random partial force merge"
        );
        let engine = self.engine()?;
        engine.force_merge(limit)?;
        let actual = engine.segment_count();
        assert!(
            !self.force_merge_assert_enabled || actual <= limit,
            "limit={} actual={}",
            limit,
            actual
        );
        Ok(())
    }

    /// Maybe force-merge, then close the engine. Idempotent.
    fn dispose(&mut self) -> StrataResult<()> {
        if self.engine.is_none() {
            return Ok(());
        }
        let mut merged = Ok(());
        if !self.reader_requested {
            let merge_first = self.policy.one_in(self.config.close_force_merge_one_in);
            self.record(Decision::CloseForceMerge(merge_first));
            if merge_first {
                merged = self.random_force_merge();
            }
        }
        let closed = match self.engine.take() {
            Some(engine) => engine.close(),
            None => Ok(()),
        };
        tracing::debug!(
            target: "strata::randomized",
            seed = self.policy.seed(),
            doc_count = self.doc_count,
            decisions = self.decisions.len(),
            "RandomIndexWriter closed"
        );
        merged.and(closed)
    }

    /// Close the writer.
    ///
    /// If no reader was ever requested, force-merges first one time in
    /// eight (by default). The engine is closed even if that merge fails.
    pub fn close(mut self) -> StrataResult<()> {
        self.dispose()
    }
}

impl<E: IndexEngine> Drop for RandomIndexWriter<E> {
    fn drop(&mut self) {
        if self.engine.is_none() {
            return;
        }
        let result = if std::thread::panicking() {
            // A second panic from the merge check would abort
            match self.engine.take() {
                Some(engine) => engine.close(),
                None => Ok(()),
            }
        } else {
            self.dispose()
        };
        if let Err(e) = result {
            tracing::error!(
                target: "strata::randomized",
                error = %e,
                "Failed to close index writer on drop"
            );
        }
    }
}

/// `base * factor`, truncated, at least 1.
fn scale(base: u64, factor: f64) -> u64 {
    ((base as f64 * factor) as u64).max(1)
}
