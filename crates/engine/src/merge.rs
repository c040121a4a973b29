//! Merge selection and execution
//!
//! [`MergePolicy`] decides which segments to combine; [`MergeScheduler`]
//! decides where the work runs. Concurrent merges run on named scoped
//! worker threads (`strata-merge-0`, `strata-merge-1`, ...), and every merge
//! emits test-point messages from the thread doing the work so harnesses can
//! perturb the interleaving.

use std::io;

use strata_core::{InfoStream, StrataError, StrataResult, MERGE_COMPONENT, TEST_POINT_COMPONENT};

use crate::info_stream::emit;
use crate::segment::{Segment, SegmentState};

// ============================================================================
// MergePolicy
// ============================================================================

/// Which segments get merged, naturally after a flush or on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Keep at most `segments_per_tier` segments by merging the smallest,
    /// combining at most `max_merge_at_once` segments per merge.
    Tiered {
        /// Segment count that triggers a natural merge when exceeded
        segments_per_tier: usize,
        /// Largest number of segments a single merge combines
        max_merge_at_once: usize,
    },
    /// Never merge, not even when forced.
    NoMerge,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy::Tiered {
            segments_per_tier: 10,
            max_merge_at_once: 10,
        }
    }
}

impl MergePolicy {
    /// True for [`MergePolicy::NoMerge`].
    pub fn is_no_merge(&self) -> bool {
        matches!(self, MergePolicy::NoMerge)
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            MergePolicy::Tiered { .. } => "tiered",
            MergePolicy::NoMerge => "no-merge",
        }
    }

    /// Merges to run after a flush. Each inner vec holds segment indices.
    pub(crate) fn find_merges(&self, segments: &[SegmentState]) -> Vec<Vec<usize>> {
        let MergePolicy::Tiered {
            segments_per_tier,
            max_merge_at_once,
        } = *self
        else {
            return Vec::new();
        };
        if segments.len() <= segments_per_tier.max(1) {
            return Vec::new();
        }
        let excess = segments.len() - segments_per_tier.max(1);
        let width = (excess + 1).clamp(2, max_merge_at_once.max(2));
        vec![smallest_first(segments).into_iter().take(width).collect()]
    }

    /// Merges needed to get down to `max_segments`.
    ///
    /// A single segment is still rewritten when merging to one and it carries
    /// deletions. Call repeatedly until it returns nothing.
    pub(crate) fn find_forced_merges(
        &self,
        segments: &[SegmentState],
        max_segments: usize,
    ) -> Vec<Vec<usize>> {
        let MergePolicy::Tiered {
            max_merge_at_once, ..
        } = *self
        else {
            return Vec::new();
        };
        if segments.len() <= max_segments {
            if max_segments == 1 && segments.len() == 1 && segments[0].has_deletions() {
                return vec![vec![0]];
            }
            return Vec::new();
        }
        let mut excess = segments.len() - max_segments;
        let mut remaining = smallest_first(segments);
        let mut merges = Vec::new();
        while excess > 0 && remaining.len() >= 2 {
            let width = (excess + 1).min(max_merge_at_once.max(2)).min(remaining.len());
            merges.push(remaining.drain(..width).collect());
            excess -= width - 1;
        }
        merges
    }

    /// One rewrite per segment carrying deletions.
    pub(crate) fn find_forced_deletes_merges(&self, segments: &[SegmentState]) -> Vec<Vec<usize>> {
        if self.is_no_merge() {
            return Vec::new();
        }
        segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.has_deletions())
            .map(|(i, _)| vec![i])
            .collect()
    }
}

/// Segment indices ordered by live doc count, ties by position.
fn smallest_first(segments: &[SegmentState]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..segments.len()).collect();
    order.sort_by_key(|&i| (segments[i].live_count(), i));
    order
}

// ============================================================================
// OneMerge
// ============================================================================

/// A planned merge: sources are point-in-time clones.
pub(crate) struct OneMerge {
    pub(crate) segment_id: u64,
    pub(crate) codec: String,
    pub(crate) sources: Vec<SegmentState>,
}

impl OneMerge {
    /// Combine the live documents of every source into one segment.
    ///
    /// Deleted documents are dropped and doc-value updates become stored
    /// values. Sequence numbers are kept so buffered deletes still resolve.
    fn run(self, info_stream: &dyn InfoStream) -> Segment {
        emit(info_stream, TEST_POINT_COMPONENT, || {
            format!("mergeMiddle start segment={}", self.segment_id)
        });
        let mut docs = Vec::new();
        let mut seqs = Vec::new();
        for source in &self.sources {
            for (seq, doc) in source.live_documents() {
                seqs.push(seq);
                docs.push(doc);
            }
        }
        let merged = Segment::new(self.segment_id, &self.codec, docs, seqs);
        emit(info_stream, TEST_POINT_COMPONENT, || {
            format!("mergeMiddle end segment={}", self.segment_id)
        });
        merged
    }

    fn describe(&self) -> String {
        let ids: Vec<String> = self.sources.iter().map(|s| s.id().to_string()).collect();
        format!("merge [{}] -> {}", ids.join(", "), self.segment_id)
    }
}

// ============================================================================
// MergeScheduler
// ============================================================================

/// Where merges execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeScheduler {
    /// Run merges one after another on the calling thread.
    Serial,
    /// Run up to `max_threads` merges at once on worker threads.
    Concurrent {
        /// Worker threads per batch
        max_threads: usize,
    },
}

impl Default for MergeScheduler {
    fn default() -> Self {
        MergeScheduler::Concurrent { max_threads: 2 }
    }
}

impl MergeScheduler {
    /// Execute `merges`, returning the merged segments in input order.
    ///
    /// A panic on a worker thread is resumed on the caller.
    pub(crate) fn run(
        &self,
        merges: Vec<OneMerge>,
        info_stream: &dyn InfoStream,
    ) -> StrataResult<Vec<Segment>> {
        for merge in &merges {
            emit(info_stream, MERGE_COMPONENT, || merge.describe());
        }
        match *self {
            MergeScheduler::Serial => Ok(merges.into_iter().map(|m| m.run(info_stream)).collect()),
            MergeScheduler::Concurrent { max_threads } => {
                let mut merged = Vec::with_capacity(merges.len());
                let mut pending = merges.into_iter().peekable();
                while pending.peek().is_some() {
                    let batch: Vec<OneMerge> = pending.by_ref().take(max_threads.max(1)).collect();
                    merged.extend(run_batch(batch, info_stream)?);
                }
                Ok(merged)
            }
        }
    }
}

fn run_batch(batch: Vec<OneMerge>, info_stream: &dyn InfoStream) -> StrataResult<Vec<Segment>> {
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(batch.len());
        for (i, merge) in batch.into_iter().enumerate() {
            let handle = std::thread::Builder::new()
                .name(format!("strata-merge-{}", i))
                .spawn_scoped(scope, move || merge.run(info_stream))
                .map_err(|e| {
                    StrataError::Io(io::Error::new(
                        e.kind(),
                        format!("failed to spawn merge thread: {}", e),
                    ))
                })?;
            handles.push(handle);
        }
        let mut merged = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.join() {
                Ok(segment) => merged.push(segment),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        Ok(merged)
    })
}
