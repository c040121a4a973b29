//! Immutable segments and the per-writer state layered over them
//!
//! A [`Segment`] holds stored documents, the sequence number each document
//! was added with, and a term → doc postings map. Segments never change once
//! built. Deletions and doc-value updates live in [`SegmentState`], which
//! wraps the segment in copy-on-write `Arc`s so that readers taking a clone
//! keep a stable point-in-time view while the writer keeps mutating.
//!
//! ## File Format (`seg_<id>.sseg`)
//!
//! ```text
//! magic "SSEG"     4B
//! version          u32 LE
//! crc32(payload)   u32 LE
//! payload          MessagePack(SegmentData)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::{DocValueUpdate, Document, FieldValue, Query, StrataError, StrataResult, Term};

use crate::tokenizer::field_terms;

/// Magic bytes for segment files
const SEGMENT_MAGIC: &[u8; 4] = b"SSEG";
/// Current segment file version
const SEGMENT_VERSION: u32 = 1;
/// Header size in bytes
const HEADER_SIZE: usize = 12;

/// Serializable part of a segment; postings are rebuilt on load.
#[derive(Serialize, Deserialize)]
struct SegmentData {
    id: u64,
    codec: String,
    docs: Vec<Document>,
    seqs: Vec<u64>,
}

// ============================================================================
// Segment
// ============================================================================

/// An immutable unit of the index.
#[derive(Debug)]
pub struct Segment {
    id: u64,
    codec: String,
    docs: Vec<Document>,
    /// Sequence number each doc was added with; deletes only reach lower seqs
    seqs: Vec<u64>,
    postings: BTreeMap<Term, Vec<u32>>,
}

impl Segment {
    /// Build a segment, indexing every keyword and text field.
    pub(crate) fn new(id: u64, codec: &str, docs: Vec<Document>, seqs: Vec<u64>) -> Self {
        debug_assert_eq!(docs.len(), seqs.len());
        let mut postings: BTreeMap<Term, Vec<u32>> = BTreeMap::new();
        for (doc_id, doc) in docs.iter().enumerate() {
            for term in index_terms(doc) {
                let list = postings.entry(term).or_default();
                // Docs are visited in order, so a repeat can only be the tail
                if list.last() != Some(&(doc_id as u32)) {
                    list.push(doc_id as u32);
                }
            }
        }
        Segment {
            id,
            codec: codec.to_string(),
            docs,
            seqs,
            postings,
        }
    }

    /// Segment ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Codec the segment was written with
    pub fn codec(&self) -> &str {
        &self.codec
    }

    /// Number of documents in this segment (including deleted)
    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Stored fields as written, without doc-value updates.
    pub(crate) fn raw_document(&self, doc: u32) -> Option<&Document> {
        self.docs.get(doc as usize)
    }

    pub(crate) fn seq(&self, doc: u32) -> u64 {
        self.seqs[doc as usize]
    }

    /// Highest sequence number in the segment, if any.
    pub(crate) fn max_seq(&self) -> Option<u64> {
        self.seqs.iter().copied().max()
    }

    fn postings(&self, term: &Term) -> &[u32] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Encode to the `.sseg` file format.
    pub(crate) fn to_bytes(&self) -> StrataResult<Vec<u8>> {
        let data = SegmentData {
            id: self.id,
            codec: self.codec.clone(),
            docs: self.docs.clone(),
            seqs: self.seqs.clone(),
        };
        let payload = rmp_serde::to_vec(&data)?;
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(SEGMENT_MAGIC);
        buf.extend_from_slice(&SEGMENT_VERSION.to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode from the `.sseg` file format.
    pub(crate) fn from_bytes(bytes: &[u8]) -> StrataResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StrataError::corruption("segment too small"));
        }
        if &bytes[0..4] != SEGMENT_MAGIC {
            return Err(StrataError::corruption("bad SSEG magic"));
        }
        let version = read_u32(&bytes[4..8]);
        if version != SEGMENT_VERSION {
            return Err(StrataError::corruption(format!(
                "unsupported SSEG version {}",
                version
            )));
        }
        let expected_crc = read_u32(&bytes[8..12]);
        let payload = &bytes[HEADER_SIZE..];
        if crc32fast::hash(payload) != expected_crc {
            return Err(StrataError::corruption("segment checksum mismatch"));
        }
        let data: SegmentData = rmp_serde::from_slice(payload)?;
        if data.docs.len() != data.seqs.len() {
            return Err(StrataError::corruption(format!(
                "segment {} has {} docs but {} sequence numbers",
                data.id,
                data.docs.len(),
                data.seqs.len()
            )));
        }
        Ok(Segment::new(data.id, &data.codec, data.docs, data.seqs))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

/// Terms a document is indexed under.
fn index_terms(doc: &Document) -> Vec<Term> {
    let mut terms = Vec::new();
    for field in doc.fields() {
        match &field.value {
            FieldValue::Keyword(value) => terms.push(Term::new(&field.name, value)),
            FieldValue::Text(text) => terms.extend(field_terms(&field.name, text)),
            FieldValue::Numeric(_) | FieldValue::Binary(_) => {}
        }
    }
    terms
}

/// True if a standalone document matches `query`.
///
/// Used for buffered documents that have no postings yet.
pub(crate) fn document_matches(doc: &Document, query: &Query) -> bool {
    match query {
        Query::Term(term) => index_terms(doc).contains(term),
        Query::All(parts) => parts.iter().all(|q| document_matches(doc, q)),
        Query::Any(parts) => parts.iter().any(|q| document_matches(doc, q)),
        Query::NumericRange { field, min, max } => doc.fields().iter().any(|f| {
            f.name == *field && matches!(f.value, FieldValue::Numeric(v) if v >= *min && v <= *max)
        }),
        Query::MatchAll => true,
    }
}

// ============================================================================
// SegmentState
// ============================================================================

/// Doc-value updates applied on top of a segment, keyed by (doc, field).
#[derive(Debug, Clone, Default)]
pub(crate) struct DocValueOverlay {
    pub(crate) numeric: BTreeMap<(u32, String), Option<i64>>,
    pub(crate) binary: BTreeMap<(u32, String), Option<Vec<u8>>>,
}

impl DocValueOverlay {
    fn is_empty(&self) -> bool {
        self.numeric.is_empty() && self.binary.is_empty()
    }
}

/// A segment plus its deletions and doc-value updates.
///
/// Cloning is cheap; mutation copies the affected map only if a reader
/// still shares it.
#[derive(Debug, Clone)]
pub(crate) struct SegmentState {
    pub(crate) core: Arc<Segment>,
    pub(crate) deleted: Arc<BTreeSet<u32>>,
    pub(crate) overlay: Arc<DocValueOverlay>,
}

impl SegmentState {
    pub(crate) fn new(core: Segment) -> Self {
        SegmentState {
            core: Arc::new(core),
            deleted: Arc::new(BTreeSet::new()),
            overlay: Arc::new(DocValueOverlay::default()),
        }
    }

    pub(crate) fn with_state(
        core: Arc<Segment>,
        deleted: BTreeSet<u32>,
        overlay: DocValueOverlay,
    ) -> Self {
        SegmentState {
            core,
            deleted: Arc::new(deleted),
            overlay: Arc::new(overlay),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.core.id()
    }

    pub(crate) fn max_doc(&self) -> usize {
        self.core.doc_count()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.core.doc_count() - self.deleted.len()
    }

    pub(crate) fn has_deletions(&self) -> bool {
        !self.deleted.is_empty()
    }

    pub(crate) fn is_deleted(&self, doc: u32) -> bool {
        doc as usize >= self.core.doc_count() || self.deleted.contains(&doc)
    }

    /// Mark a doc deleted; returns true if it was live.
    pub(crate) fn delete(&mut self, doc: u32) -> bool {
        if self.is_deleted(doc) {
            return false;
        }
        Arc::make_mut(&mut self.deleted).insert(doc)
    }

    pub(crate) fn update_doc_value(&mut self, doc: u32, field: &str, update: &DocValueUpdate) {
        let overlay = Arc::make_mut(&mut self.overlay);
        match update {
            DocValueUpdate::Numeric(v) => {
                overlay.numeric.insert((doc, field.to_string()), *v);
            }
            DocValueUpdate::Binary(v) => {
                overlay.binary.insert((doc, field.to_string()), v.clone());
            }
        }
    }

    /// Stored fields with doc-value updates folded in, live docs only.
    pub(crate) fn document(&self, doc: u32) -> Option<Document> {
        if self.is_deleted(doc) {
            return None;
        }
        let mut document = self.core.raw_document(doc)?.clone();
        if self.overlay.is_empty() {
            return Some(document);
        }
        for ((d, field), value) in self.overlay.numeric.range((doc, String::new())..) {
            if *d != doc {
                break;
            }
            document.apply_doc_value(field, &DocValueUpdate::Numeric(*value));
        }
        for ((d, field), value) in self.overlay.binary.range((doc, String::new())..) {
            if *d != doc {
                break;
            }
            document.apply_doc_value(field, &DocValueUpdate::Binary(value.clone()));
        }
        Some(document)
    }

    pub(crate) fn numeric_value(&self, doc: u32, field: &str) -> Option<i64> {
        if self.is_deleted(doc) {
            return None;
        }
        if let Some(updated) = self.overlay.numeric.get(&(doc, field.to_string())) {
            return *updated;
        }
        self.core
            .raw_document(doc)?
            .fields()
            .iter()
            .find_map(|f| match f.value {
                FieldValue::Numeric(v) if f.name == field => Some(v),
                _ => None,
            })
    }

    pub(crate) fn binary_value(&self, doc: u32, field: &str) -> Option<Vec<u8>> {
        if self.is_deleted(doc) {
            return None;
        }
        if let Some(updated) = self.overlay.binary.get(&(doc, field.to_string())) {
            return updated.clone();
        }
        self.core
            .raw_document(doc)?
            .fields()
            .iter()
            .find_map(|f| match &f.value {
                FieldValue::Binary(v) if f.name == field => Some(v.clone()),
                _ => None,
            })
    }

    /// Doc ids matching `query`, deleted ones included, ascending.
    pub(crate) fn matching(&self, query: &Query) -> BTreeSet<u32> {
        match query {
            Query::Term(term) => self.core.postings(term).iter().copied().collect(),
            Query::All(parts) => {
                let mut iter = parts.iter();
                let Some(first) = iter.next() else {
                    return self.all_docs();
                };
                let mut acc = self.matching(first);
                for part in iter {
                    if acc.is_empty() {
                        break;
                    }
                    let next = self.matching(part);
                    acc.retain(|d| next.contains(d));
                }
                acc
            }
            Query::Any(parts) => parts.iter().flat_map(|q| self.matching(q)).collect(),
            Query::NumericRange { field, min, max } => (0..self.core.doc_count() as u32)
                .filter(|&d| {
                    self.raw_numeric(d, field)
                        .map_or(false, |v| v >= *min && v <= *max)
                })
                .collect(),
            Query::MatchAll => self.all_docs(),
        }
    }

    /// Live doc ids matching `query`, ascending.
    pub(crate) fn search(&self, query: &Query) -> Vec<u32> {
        self.matching(query)
            .into_iter()
            .filter(|d| !self.deleted.contains(d))
            .collect()
    }

    fn all_docs(&self) -> BTreeSet<u32> {
        (0..self.core.doc_count() as u32).collect()
    }

    /// Numeric value ignoring deletion, for range matching.
    fn raw_numeric(&self, doc: u32, field: &str) -> Option<i64> {
        if let Some(updated) = self.overlay.numeric.get(&(doc, field.to_string())) {
            return *updated;
        }
        self.core
            .raw_document(doc)?
            .fields()
            .iter()
            .find_map(|f| match f.value {
                FieldValue::Numeric(v) if f.name == field => Some(v),
                _ => None,
            })
    }

    /// Live documents with updates folded in, paired with their seqs.
    pub(crate) fn live_documents(&self) -> Vec<(u64, Document)> {
        (0..self.core.doc_count() as u32)
            .filter_map(|d| self.document(d).map(|doc| (self.core.seq(d), doc)))
            .collect()
    }
}
