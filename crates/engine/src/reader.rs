//! Point-in-time readers
//!
//! A [`DirectoryReader`] is a list of segment states frozen at the moment it
//! was opened. Document ids are global: segment `i` covers
//! `bases[i]..bases[i] + max_doc(i)`.

use strata_core::{Document, IndexReader, Query, StrataError, StrataResult};

use crate::directory::Directory;
use crate::segment::SegmentState;

/// Read-only view over a fixed set of segments.
#[derive(Debug, Clone)]
pub struct DirectoryReader {
    segments: Vec<SegmentState>,
    bases: Vec<u32>,
    max_doc: usize,
    generation: Option<u64>,
}

impl DirectoryReader {
    pub(crate) fn new(segments: Vec<SegmentState>, generation: Option<u64>) -> Self {
        let mut bases = Vec::with_capacity(segments.len());
        let mut max_doc = 0usize;
        for segment in &segments {
            bases.push(max_doc as u32);
            max_doc += segment.max_doc();
        }
        DirectoryReader {
            segments,
            bases,
            max_doc,
            generation,
        }
    }

    /// Open the latest commit in `directory`, loading segments on up to
    /// `threads` threads.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::IndexNotFound`] if nothing was committed yet.
    pub fn open(directory: &Directory, threads: usize) -> StrataResult<Self> {
        match directory.read_commit(threads)? {
            Some(commit) => Ok(DirectoryReader::new(
                commit.segments,
                Some(commit.generation),
            )),
            None => Err(StrataError::IndexNotFound(format!(
                "no commit in {:?}",
                directory
            ))),
        }
    }

    /// Commit generation this reader was opened from; `None` for
    /// near-real-time readers.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub(crate) fn segments(&self) -> &[SegmentState] {
        &self.segments
    }

    /// Map a global doc id to (segment index, local id).
    fn locate(&self, doc: u32) -> Option<(usize, u32)> {
        if doc as usize >= self.max_doc {
            return None;
        }
        let idx = match self.bases.binary_search(&doc) {
            Ok(i) => {
                // Empty segments share a base with their successor
                let mut i = i;
                while i + 1 < self.bases.len() && self.bases[i + 1] == doc {
                    i += 1;
                }
                i
            }
            Err(i) => i - 1,
        };
        Some((idx, doc - self.bases[idx]))
    }
}

impl IndexReader for DirectoryReader {
    fn num_docs(&self) -> usize {
        self.segments.iter().map(SegmentState::live_count).sum()
    }

    fn max_doc(&self) -> usize {
        self.max_doc
    }

    fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn is_deleted(&self, doc: u32) -> bool {
        match self.locate(doc) {
            Some((idx, local)) => self.segments[idx].is_deleted(local),
            None => true,
        }
    }

    fn document(&self, doc: u32) -> Option<Document> {
        let (idx, local) = self.locate(doc)?;
        self.segments[idx].document(local)
    }

    fn search(&self, query: &Query) -> Vec<u32> {
        self.segments
            .iter()
            .zip(&self.bases)
            .flat_map(|(segment, base)| segment.search(query).into_iter().map(move |d| base + d))
            .collect()
    }

    fn numeric_value(&self, doc: u32, field: &str) -> Option<i64> {
        let (idx, local) = self.locate(doc)?;
        self.segments[idx].numeric_value(local, field)
    }

    fn binary_value(&self, doc: u32, field: &str) -> Option<Vec<u8>> {
        let (idx, local) = self.locate(doc)?;
        self.segments[idx].binary_value(local, field)
    }
}
