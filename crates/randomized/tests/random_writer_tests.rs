//! Integration tests for RandomIndexWriter
//!
//! These tests verify:
//! - Same seed + same calls => same decisions
//! - Every randomized route leaves the index in the same observable state
//! - Auto-commit counter/threshold bookkeeping
//! - The partial force-merge check fires on a misbehaving engine
//! - Disposal closes the engine exactly once, including on drop and unwind

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use strata_core::{
    Document, EngineConfig, Field, IndexEngine, IndexReader, InfoStream, Query, StrataError,
    StrataResult, Term, WRITER_COMPONENT,
};
use strata_engine::{
    Directory, DirectoryReader, IndexWriter, IndexWriterConfig, MergePolicy, MergeScheduler,
};
use strata_randomized::{
    test_seed, Decision, ForceMergeKind, HarnessConfig, RandomIndexWriter, ReaderPath, TestPoint,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn doc(i: u64) -> Document {
    Document::new()
        .with(Field::keyword("id", i.to_string()))
        .with(Field::text("body", format!("body of document {}", i)))
        .with(Field::numeric("n", i as i64))
        .with(Field::binary("raw", i.to_le_bytes().to_vec()))
}

fn id(i: u64) -> Term {
    Term::new("id", i.to_string())
}

fn open(seed: u64) -> RandomIndexWriter<IndexWriter> {
    let mut rng = StdRng::seed_from_u64(seed);
    RandomIndexWriter::new(&mut rng, Directory::ram(), IndexWriterConfig::new())
        .expect("Failed to open random writer")
}

fn auto_commits(w: &RandomIndexWriter<IndexWriter>) -> usize {
    w.decisions()
        .iter()
        .filter(|d| matches!(d, Decision::AutoCommit { .. }))
        .count()
}

// ============================================================================
// Determinism
// ============================================================================

fn workload(w: &mut RandomIndexWriter<IndexWriter>) {
    for i in 0..60 {
        w.add_document(doc(i)).unwrap();
        if i % 7 == 0 {
            w.update_document(&id(i / 2), doc(i / 2)).unwrap();
        }
        if i % 11 == 0 {
            w.delete_documents(&id(i / 3)).unwrap();
            let _ = w.get_reader().unwrap();
        }
    }
    w.add_documents(vec![doc(100), doc(101)]).unwrap();
    let _ = w.get_reader_with(false).unwrap();
}

#[test]
fn test_same_seed_same_decisions() {
    init_tracing();
    let mut a = open(7);
    let mut b = open(7);
    workload(&mut a);
    workload(&mut b);
    assert_eq!(a.seed(), b.seed());
    assert_eq!(a.decisions(), b.decisions());
    assert_eq!(a.num_docs().unwrap(), b.num_docs().unwrap());
}

#[test]
fn test_different_seeds_diverge() {
    let mut a = open(1);
    let mut b = open(2);
    workload(&mut a);
    workload(&mut b);
    assert_ne!(a.decisions(), b.decisions());
}

// ============================================================================
// Route equivalence
// ============================================================================

#[test]
fn test_single_and_batch_add_paths_are_equivalent() {
    let mut routes = BTreeSet::new();
    for seed in 0..20 {
        let mut w = open(seed);
        for i in 0..30 {
            w.add_document(doc(i)).unwrap();
        }
        for d in w.decisions() {
            if let Decision::BatchReroute(batched) = d {
                routes.insert(*batched);
            }
        }
        let reader = w.get_reader().unwrap();
        assert_eq!(reader.num_docs(), 30);
        for i in 0..30 {
            let hits = reader.search(&Query::Term(id(i)));
            assert_eq!(hits.len(), 1, "seed={} id={}", seed, i);
            assert_eq!(reader.document(hits[0]).unwrap(), doc(i));
        }
        w.close().unwrap();
    }
    assert_eq!(routes, BTreeSet::from([false, true]));
}

#[test]
fn test_single_and_batch_update_paths_are_equivalent() {
    for seed in 0..20 {
        let mut w = open(seed);
        for i in 0..10 {
            w.add_document(doc(i)).unwrap();
        }
        for i in 0..10 {
            let replacement = doc(i).with(Field::keyword("version", "2"));
            w.update_document(&id(i), replacement).unwrap();
        }
        let reader = w.get_reader().unwrap();
        assert_eq!(reader.num_docs(), 10);
        let v2 = reader.search(&Query::Term(Term::new("version", "2")));
        assert_eq!(v2.len(), 10, "seed={}", seed);
        w.close().unwrap();
    }
}

#[test]
fn test_deletions_visible_on_every_reader_path() {
    let mut nrt = false;
    let mut reopened_direct = false;
    let mut reopened_writer = false;

    for seed in 0..64 {
        let mut w = open(seed);
        for i in 0..20 {
            w.add_document(doc(i)).unwrap();
        }
        w.delete_documents(&id(3)).unwrap();
        w.delete_by_query(&Query::NumericRange {
            field: "n".into(),
            min: 10,
            max: 12,
        })
        .unwrap();
        w.update_numeric_value(&id(5), "n", Some(500)).unwrap();

        let reader = w.get_reader().unwrap();
        assert_eq!(reader.num_docs(), 16, "seed={}", seed);
        assert!(reader.search(&Query::Term(id(3))).is_empty());
        let five = reader.search(&Query::Term(id(5)));
        assert_eq!(reader.numeric_value(five[0], "n"), Some(500));

        for d in w.decisions() {
            match d {
                Decision::ReaderPath(ReaderPath::NearRealTime) => nrt = true,
                Decision::ReopenThreads(Some(threads)) => {
                    assert!((1..=10).contains(threads));
                    reopened_direct = true;
                }
                Decision::ReopenThreads(None) => reopened_writer = true,
                _ => {}
            }
        }
        w.close().unwrap();
    }
    assert!(nrt && reopened_direct && reopened_writer);
}

#[test]
fn test_add_indexes_and_delete_all_pass_through() {
    let mut source = open(11);
    for i in 0..5 {
        source.add_document(doc(i)).unwrap();
    }
    let reader = source.get_reader().unwrap();

    let mut target = open(12);
    target.add_indexes(&[reader]).unwrap();
    assert_eq!(target.num_docs().unwrap(), 5);
    assert_eq!(target.doc_count(), 0);
    target.delete_all().unwrap();
    assert_eq!(target.num_docs().unwrap(), 0);
    target.force_merge_deletes().unwrap();
    assert_eq!(target.max_doc().unwrap(), 0);
}

// ============================================================================
// Auto-commit
// ============================================================================

#[test]
fn test_seed_42_fifty_adds() {
    init_tracing();
    let mut w = open(42);
    let first_threshold = w.next_commit_at();
    for i in 0..50 {
        w.add_document(doc(i)).unwrap();
    }
    assert_eq!(w.num_docs().unwrap(), 50);
    assert_eq!(w.doc_count(), 50);
    let committed = auto_commits(&w) > 0;
    assert_eq!(committed, first_threshold <= 50);
    assert_eq!(w.inner().unwrap().generation() > 0, committed);
}

#[test]
fn test_narrow_interval_always_auto_commits() {
    let harness = HarnessConfig {
        commit_interval_min: 5,
        commit_interval_max: 40,
        ..Default::default()
    };
    let mut rng = StdRng::seed_from_u64(42);
    let dir = Directory::ram();
    let mut w: RandomIndexWriter<IndexWriter> =
        RandomIndexWriter::with_harness_config(&mut rng, dir.clone(), IndexWriterConfig::new(), harness)
            .unwrap();
    for i in 0..50 {
        w.add_document(doc(i)).unwrap();
    }
    assert!(auto_commits(&w) >= 1);
    let committed = DirectoryReader::open(&dir, 2).unwrap();
    assert!(committed.num_docs() >= 5);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_counter_monotonic_and_threshold_ahead(seed in any::<u64>(), ops in 1usize..400) {
        let mut w = open(seed);
        let mut last_factor = w.commit_interval_factor();
        for i in 0..ops as u64 {
            let before = w.doc_count();
            if i % 3 == 0 {
                w.update_document(&id(i % 17), doc(i)).unwrap();
            } else {
                w.add_document(doc(i)).unwrap();
            }
            prop_assert_eq!(w.doc_count(), before + 1);
            prop_assert!(w.next_commit_at() > w.doc_count());
            prop_assert!(w.commit_interval_factor() >= last_factor);
            last_factor = w.commit_interval_factor();
        }
    }
}

#[test]
fn test_growth_factor_stops_at_cap() {
    let harness = HarnessConfig {
        commit_interval_min: 1,
        commit_interval_max: 1,
        commit_growth: 1.05,
        commit_growth_cap: 1.2,
        ..Default::default()
    };
    let mut expected = 1.0f64;
    while expected < harness.commit_growth_cap {
        expected *= harness.commit_growth;
    }

    let mut rng = StdRng::seed_from_u64(21);
    let mut w: RandomIndexWriter<IndexWriter> =
        RandomIndexWriter::with_harness_config(&mut rng, Directory::ram(), IndexWriterConfig::new(), harness)
            .unwrap();
    let mut factors = Vec::new();
    for i in 0..30 {
        w.add_document(doc(i)).unwrap();
        factors.push(w.commit_interval_factor());
    }
    assert_eq!(auto_commits(&w), 30);
    assert!(factors.iter().all(|f| *f <= expected));
    assert_eq!(*factors.last().unwrap(), expected);
    // 1.0 -> 1.05 -> 1.1025 -> 1.157625 -> 1.2155..., then flat
    assert!(factors[..3].iter().all(|f| *f < 1.2));
    assert!(factors[3..].iter().all(|f| *f == expected));
}

#[test]
fn test_failed_auto_commit_keeps_threshold_ahead() {
    let harness = HarnessConfig {
        commit_interval_min: 3,
        commit_interval_max: 3,
        commit_growth: 1.0,
        ..Default::default()
    };
    let config = StuckConfig {
        failing_commits: Arc::new(AtomicUsize::new(1)),
        ..Default::default()
    };
    let commits = Arc::clone(&config.commits);
    let mut rng = StdRng::seed_from_u64(8);
    let mut w: RandomIndexWriter<StuckEngine> =
        RandomIndexWriter::with_harness_config(&mut rng, (), config, harness).unwrap();
    w.set_force_merge_enabled(false);

    w.add_document(doc(0)).unwrap();
    w.add_document(doc(1)).unwrap();
    assert!(matches!(w.add_document(doc(2)), Err(StrataError::Io(_))));
    assert_eq!(w.doc_count(), 3);
    assert_eq!(w.next_commit_at(), 6);
    assert_eq!(commits.load(Ordering::SeqCst), 0);

    for i in 3..12 {
        w.add_document(doc(i)).unwrap();
        assert!(w.next_commit_at() > w.doc_count());
    }
    assert_eq!(commits.load(Ordering::SeqCst), 3);
    let counters: Vec<u64> = w
        .decisions()
        .iter()
        .filter_map(|d| match d {
            Decision::AutoCommit { counter, .. } => Some(*counter),
            _ => None,
        })
        .collect();
    assert_eq!(counters, vec![3, 6, 9, 12]);
}

#[test]
fn test_reproducible_random_workload() {
    init_tracing();
    let seed = test_seed(None).unwrap();
    let mut w = open(seed);
    let mut live = BTreeSet::new();
    for i in 0..200u64 {
        let key = i % 40;
        match i % 5 {
            0 | 1 | 2 => {
                w.update_document(&id(key), doc(key)).unwrap();
                live.insert(key);
            }
            3 => {
                w.delete_documents(&id(key)).unwrap();
                live.remove(&key);
            }
            _ => {
                let reader = w.get_reader().unwrap();
                assert_eq!(reader.num_docs(), live.len(), "seed={}", seed);
            }
        }
    }
    assert_eq!(w.num_docs().unwrap(), live.len(), "seed={}", seed);
    w.close().unwrap();
}

// ============================================================================
// Force-merge check
// ============================================================================

/// Engine double whose force_merge ignores its limit.
///
/// `failing_commits` commits are rejected before commits start succeeding.
#[derive(Clone, Default)]
struct StuckConfig {
    info_stream: Option<Arc<dyn InfoStream>>,
    closes: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
    failing_commits: Arc<AtomicUsize>,
}

impl EngineConfig for StuckConfig {
    fn info_stream(&self) -> Option<Arc<dyn InfoStream>> {
        self.info_stream.clone()
    }

    fn set_info_stream(&mut self, stream: Arc<dyn InfoStream>) {
        self.info_stream = Some(stream);
    }

    fn codec_name(&self) -> &str {
        "Strata10"
    }

    fn is_no_merge(&self) -> bool {
        false
    }
}

struct EmptyReader;

impl IndexReader for EmptyReader {
    fn num_docs(&self) -> usize {
        0
    }
    fn max_doc(&self) -> usize {
        0
    }
    fn segment_count(&self) -> usize {
        0
    }
    fn is_deleted(&self, _doc: u32) -> bool {
        true
    }
    fn document(&self, _doc: u32) -> Option<Document> {
        None
    }
    fn search(&self, _query: &Query) -> Vec<u32> {
        Vec::new()
    }
    fn numeric_value(&self, _doc: u32, _field: &str) -> Option<i64> {
        None
    }
    fn binary_value(&self, _doc: u32, _field: &str) -> Option<Vec<u8>> {
        None
    }
}

struct StuckEngine {
    closes: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
    failing_commits: Arc<AtomicUsize>,
}

impl IndexEngine for StuckEngine {
    type Directory = ();
    type Config = StuckConfig;
    type Reader = EmptyReader;

    fn open(_directory: (), config: StuckConfig) -> StrataResult<Self> {
        Ok(StuckEngine {
            closes: config.closes,
            commits: config.commits,
            failing_commits: config.failing_commits,
        })
    }
    fn open_reader(_directory: &(), _thread_hint: usize) -> StrataResult<EmptyReader> {
        Ok(EmptyReader)
    }
    fn directory(&self) -> &() {
        &()
    }
    fn codec_name(&self) -> &str {
        "Strata10"
    }
    fn add_document(&self, _doc: Document) -> StrataResult<()> {
        Ok(())
    }
    fn add_documents(&self, _docs: Vec<Document>) -> StrataResult<()> {
        Ok(())
    }
    fn update_document(&self, _term: &Term, _doc: Document) -> StrataResult<()> {
        Ok(())
    }
    fn update_documents(&self, _term: &Term, _docs: Vec<Document>) -> StrataResult<()> {
        Ok(())
    }
    fn delete_documents(&self, _term: &Term) -> StrataResult<()> {
        Ok(())
    }
    fn delete_by_query(&self, _query: &Query) -> StrataResult<()> {
        Ok(())
    }
    fn update_numeric_value(&self, _t: &Term, _f: &str, _v: Option<i64>) -> StrataResult<()> {
        Ok(())
    }
    fn update_binary_value(&self, _t: &Term, _f: &str, _v: Option<Vec<u8>>) -> StrataResult<()> {
        Ok(())
    }
    fn delete_all(&self) -> StrataResult<()> {
        Ok(())
    }
    fn add_indexes(&self, _readers: &[EmptyReader]) -> StrataResult<()> {
        Ok(())
    }
    fn commit(&self) -> StrataResult<()> {
        let rejected = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(StrataError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "commit rejected",
            )));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn force_merge(&self, _max_segments: usize) -> StrataResult<()> {
        Ok(())
    }
    fn force_merge_deletes(&self, _wait: bool) -> StrataResult<()> {
        Ok(())
    }
    fn segment_count(&self) -> usize {
        5
    }
    fn num_docs(&self) -> usize {
        0
    }
    fn max_doc(&self) -> usize {
        0
    }
    fn reader(&self, _apply_deletions: bool) -> StrataResult<EmptyReader> {
        Ok(EmptyReader)
    }
    fn close(self) -> StrataResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn merge_on_every_reader() -> HarnessConfig {
    HarnessConfig {
        reader_force_merge_one_in: 1,
        ..Default::default()
    }
}

fn stuck(seed: u64, closes: &Arc<AtomicUsize>) -> RandomIndexWriter<StuckEngine> {
    let mut rng = StdRng::seed_from_u64(seed);
    let config = StuckConfig {
        closes: Arc::clone(closes),
        ..Default::default()
    };
    let mut w = RandomIndexWriter::with_harness_config(&mut rng, (), config, merge_on_every_reader())
        .unwrap();
    w.set_force_merge_enabled(true);
    w
}

#[test]
#[should_panic(expected = "limit=")]
fn test_partial_merge_over_limit_panics() {
    let closes = Arc::new(AtomicUsize::new(0));
    let mut w = stuck(3, &closes);
    for _ in 0..200 {
        let _ = w.get_reader().unwrap();
    }
}

#[test]
fn test_partial_merge_check_can_be_disabled() {
    let closes = Arc::new(AtomicUsize::new(0));
    let mut w = stuck(3, &closes);
    w.set_force_merge_assert_enabled(false);
    for _ in 0..50 {
        let _ = w.get_reader().unwrap();
    }
    assert!(w
        .decisions()
        .iter()
        .any(|d| matches!(d, Decision::ForceMerge(ForceMergeKind::Partial { .. }))));
    w.close().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_disabled_random_merge_never_merges() {
    let closes = Arc::new(AtomicUsize::new(0));
    let mut w = stuck(3, &closes);
    w.set_force_merge_enabled(false);
    for _ in 0..50 {
        let _ = w.get_reader().unwrap();
    }
    assert!(!w
        .decisions()
        .iter()
        .any(|d| matches!(d, Decision::ForceMerge(_))));
}

// ============================================================================
// Disposal
// ============================================================================

#[test]
fn test_close_closes_engine_once() {
    let closes = Arc::new(AtomicUsize::new(0));
    let mut w = stuck(1, &closes);
    w.set_force_merge_assert_enabled(false);
    w.close().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_drop_closes_engine_once() {
    let closes = Arc::new(AtomicUsize::new(0));
    {
        let mut w = stuck(1, &closes);
        w.set_force_merge_assert_enabled(false);
        w.add_document(doc(1)).unwrap();
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unwind_still_closes_engine() {
    let closes = Arc::new(AtomicUsize::new(0));
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let mut w = stuck(3, &closes);
        for _ in 0..200 {
            let _ = w.get_reader().unwrap();
        }
    }));
    assert!(result.is_err());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_drop_commits_and_releases_directory() {
    let dir = Directory::ram();
    {
        let mut rng = StdRng::seed_from_u64(9);
        let mut w: RandomIndexWriter<IndexWriter> =
            RandomIndexWriter::new(&mut rng, dir.clone(), IndexWriterConfig::new()).unwrap();
        for i in 0..3 {
            w.add_document(doc(i)).unwrap();
        }
    }
    assert_eq!(DirectoryReader::open(&dir, 1).unwrap().num_docs(), 3);
    assert!(IndexWriter::open(dir, IndexWriterConfig::new()).is_ok());
}

// ============================================================================
// Test points
// ============================================================================

#[derive(Default)]
struct CountingTestPoint {
    total: AtomicUsize,
    on_merge_threads: AtomicUsize,
}

impl TestPoint for CountingTestPoint {
    fn apply(&self, _message: &str) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let on_merge_thread = std::thread::current()
            .name()
            .map_or(false, |name| name.starts_with("strata-merge-"));
        if on_merge_thread {
            self.on_merge_threads.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Default)]
struct WriterOnlySink {
    seen: Mutex<Vec<String>>,
}

impl InfoStream for WriterOnlySink {
    fn message(&self, component: &str, message: &str) {
        self.seen.lock().push(format!("{}: {}", component, message));
    }

    fn is_enabled(&self, component: &str) -> bool {
        component == WRITER_COMPONENT
    }
}

#[test]
fn test_test_points_reach_callback_from_merge_threads() {
    let points = Arc::new(CountingTestPoint::default());
    let sink = Arc::new(WriterOnlySink::default());
    let config = IndexWriterConfig::new()
        .with_max_buffered_docs(2)
        .with_merge_policy(MergePolicy::Tiered {
            segments_per_tier: 2,
            max_merge_at_once: 2,
        })
        .with_merge_scheduler(MergeScheduler::Concurrent { max_threads: 2 })
        .with_info_stream(sink.clone());
    let mut rng = StdRng::seed_from_u64(5);
    let mut w: RandomIndexWriter<IndexWriter> = RandomIndexWriter::with_test_point(
        &mut rng,
        Directory::ram(),
        config,
        HarnessConfig::default(),
        points.clone(),
    )
    .unwrap();
    for i in 0..40 {
        w.add_document(doc(i)).unwrap();
    }
    w.commit().unwrap();
    w.close().unwrap();

    assert!(points.total.load(Ordering::Relaxed) > 40);
    assert!(points.on_merge_threads.load(Ordering::Relaxed) > 0);
    let seen = sink.seen.lock();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|m| m.starts_with("IW: ")));
}
