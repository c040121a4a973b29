//! Backing storage for commits
//!
//! A [`Directory`] holds the latest commit point of an index:
//! - **Ram**: the commit point lives in shared memory; clones of the
//!   directory see the same commits.
//! - **Fs**: each segment is written once to `seg_<id>.sseg`, and the
//!   commit manifest (`commit.manifest`) lists the segments together with
//!   their deletions and doc-value updates.
//!
//! The manifest is written atomically via temp + fsync + rename, so a reader
//! either sees the previous commit or the new one. Segment files no longer
//! referenced by the new manifest are removed afterwards.
//!
//! ## Manifest Format
//!
//! ```text
//! magic "SCMT"     4B
//! version          u32 LE
//! payload          MessagePack(ManifestData)
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strata_core::{StrataError, StrataResult};

use crate::segment::{DocValueOverlay, Segment, SegmentState};

/// Magic bytes for the commit manifest
const MANIFEST_MAGIC: &[u8; 4] = b"SCMT";
/// Current manifest version
const MANIFEST_VERSION: u32 = 1;
/// Manifest file name inside an fs directory
const MANIFEST_FILE: &str = "commit.manifest";
/// Write lock file name inside an fs directory
const LOCK_FILE: &str = "write.lock";
/// Segment file extension
const SEGMENT_EXT: &str = "sseg";

// ============================================================================
// CommitPoint
// ============================================================================

/// A durable snapshot of the index.
#[derive(Debug, Clone)]
pub(crate) struct CommitPoint {
    pub(crate) generation: u64,
    pub(crate) segments: Vec<SegmentState>,
}

// ============================================================================
// Manifest Data (serializable)
// ============================================================================

#[derive(Serialize, Deserialize)]
struct ManifestData {
    version: u32,
    generation: u64,
    segments: Vec<SegmentManifestEntry>,
}

#[derive(Serialize, Deserialize)]
struct SegmentManifestEntry {
    segment_id: u64,
    doc_count: u64,
    deleted: Vec<u32>,
    numeric_updates: Vec<(u32, String, Option<i64>)>,
    binary_updates: Vec<(u32, String, Option<Vec<u8>>)>,
}

impl SegmentManifestEntry {
    fn from_state(state: &SegmentState) -> Self {
        SegmentManifestEntry {
            segment_id: state.id(),
            doc_count: state.max_doc() as u64,
            deleted: state.deleted.iter().copied().collect(),
            numeric_updates: state
                .overlay
                .numeric
                .iter()
                .map(|((doc, field), v)| (*doc, field.clone(), *v))
                .collect(),
            binary_updates: state
                .overlay
                .binary
                .iter()
                .map(|((doc, field), v)| (*doc, field.clone(), v.clone()))
                .collect(),
        }
    }

    fn into_state(self, segment: Segment) -> StrataResult<SegmentState> {
        if segment.id() != self.segment_id || segment.doc_count() as u64 != self.doc_count {
            return Err(StrataError::corruption(format!(
                "segment file {} ({} docs) does not match manifest entry {} ({} docs)",
                segment.id(),
                segment.doc_count(),
                self.segment_id,
                self.doc_count
            )));
        }
        let deleted: BTreeSet<u32> = self.deleted.into_iter().collect();
        let mut overlay = DocValueOverlay::default();
        for (doc, field, v) in self.numeric_updates {
            overlay.numeric.insert((doc, field), v);
        }
        for (doc, field, v) in self.binary_updates {
            overlay.binary.insert((doc, field), v);
        }
        Ok(SegmentState::with_state(Arc::new(segment), deleted, overlay))
    }
}

// ============================================================================
// Directory
// ============================================================================

#[derive(Default)]
struct RamInner {
    latest: RwLock<Option<CommitPoint>>,
    locked: AtomicBool,
}

/// In-memory directory; clones share state.
#[derive(Clone, Default)]
pub struct RamDirectory {
    inner: Arc<RamInner>,
}

/// Directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    path: PathBuf,
}

/// Where an index keeps its commits.
#[derive(Clone)]
pub enum Directory {
    /// Shared in-memory storage
    Ram(RamDirectory),
    /// Files under a local path
    Fs(FsDirectory),
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directory::Ram(_) => write!(f, "RamDirectory"),
            Directory::Fs(fs) => write!(f, "FsDirectory({})", fs.path.display()),
        }
    }
}

impl Directory {
    /// Create an empty in-memory directory
    pub fn ram() -> Self {
        Directory::Ram(RamDirectory::default())
    }

    /// Open (creating if needed) a filesystem directory.
    pub fn open_fs(path: impl Into<PathBuf>) -> StrataResult<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        Ok(Directory::Fs(FsDirectory { path }))
    }

    /// Filesystem path, for fs directories.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Directory::Ram(_) => None,
            Directory::Fs(fs) => Some(&fs.path),
        }
    }

    /// Generation of the latest commit, or `None` if nothing was committed.
    pub fn latest_generation(&self) -> StrataResult<Option<u64>> {
        match self {
            Directory::Ram(ram) => Ok(ram.inner.latest.read().as_ref().map(|c| c.generation)),
            Directory::Fs(fs) => {
                let path = fs.path.join(MANIFEST_FILE);
                if !path.exists() {
                    return Ok(None);
                }
                Ok(Some(load_manifest(&path)?.generation))
            }
        }
    }

    /// Take the single-writer lock.
    pub(crate) fn obtain_lock(&self) -> StrataResult<DirectoryLock> {
        match self {
            Directory::Ram(ram) => {
                if ram
                    .inner
                    .locked
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return Err(StrataError::LockObtainFailed(
                        "ram directory already has a writer".to_string(),
                    ));
                }
                Ok(DirectoryLock::Ram(Arc::clone(&ram.inner)))
            }
            Directory::Fs(fs) => {
                let path = fs.path.join(LOCK_FILE);
                let file = OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&path)?;
                file.try_lock_exclusive()
                    .map_err(|_| StrataError::LockObtainFailed(path.display().to_string()))?;
                Ok(DirectoryLock::Fs(file))
            }
        }
    }

    /// Persist `commit` as the latest commit point.
    pub(crate) fn write_commit(&self, commit: &CommitPoint) -> StrataResult<()> {
        match self {
            Directory::Ram(ram) => {
                *ram.inner.latest.write() = Some(commit.clone());
                Ok(())
            }
            Directory::Fs(fs) => fs.write_commit(commit),
        }
    }

    /// Load the latest commit point, using up to `threads` threads.
    pub(crate) fn read_commit(&self, threads: usize) -> StrataResult<Option<CommitPoint>> {
        match self {
            Directory::Ram(ram) => Ok(ram.inner.latest.read().clone()),
            Directory::Fs(fs) => fs.read_commit(threads),
        }
    }
}

impl FsDirectory {
    fn segment_path(&self, segment_id: u64) -> PathBuf {
        self.path
            .join(format!("seg_{:010}.{}", segment_id, SEGMENT_EXT))
    }

    fn write_commit(&self, commit: &CommitPoint) -> StrataResult<()> {
        for state in &commit.segments {
            let path = self.segment_path(state.id());
            if !path.exists() {
                write_atomic(&path, &state.core.to_bytes()?)?;
            }
        }

        let data = ManifestData {
            version: MANIFEST_VERSION,
            generation: commit.generation,
            segments: commit
                .segments
                .iter()
                .map(SegmentManifestEntry::from_state)
                .collect(),
        };
        write_manifest(&self.path.join(MANIFEST_FILE), &data)?;

        let live: HashSet<PathBuf> = commit
            .segments
            .iter()
            .map(|s| self.segment_path(s.id()))
            .collect();
        for entry in std::fs::read_dir(&self.path)? {
            let path = entry?.path();
            let is_segment = path.extension().map_or(false, |ext| ext == SEGMENT_EXT);
            if is_segment && !live.contains(&path) {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(
                        target: "strata::engine",
                        path = %path.display(),
                        error = %e,
                        "failed to remove unreferenced segment file"
                    );
                }
            }
        }
        Ok(())
    }

    fn read_commit(&self, threads: usize) -> StrataResult<Option<CommitPoint>> {
        let manifest_path = self.path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Ok(None);
        }
        let manifest = load_manifest(&manifest_path)?;
        let generation = manifest.generation;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("strata-load-{}", i))
            .build()
            .map_err(|e| StrataError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
        let segments = pool.install(|| {
            manifest
                .segments
                .into_par_iter()
                .map(|entry| {
                    let bytes = std::fs::read(self.segment_path(entry.segment_id))?;
                    entry.into_state(Segment::from_bytes(&bytes)?)
                })
                .collect::<StrataResult<Vec<_>>>()
        })?;

        tracing::debug!(
            target: "strata::engine",
            generation,
            segments = segments.len(),
            threads,
            "loaded commit"
        );
        Ok(Some(CommitPoint {
            generation,
            segments,
        }))
    }
}

/// Write `bytes` to `path` atomically (temp + fsync + rename).
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)
}

fn write_manifest(path: &Path, data: &ManifestData) -> StrataResult<()> {
    let payload = rmp_serde::to_vec(data)?;
    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.extend_from_slice(MANIFEST_MAGIC);
    buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
    buf.extend_from_slice(&payload);
    write_atomic(path, &buf)?;
    Ok(())
}

fn load_manifest(path: &Path) -> StrataResult<ManifestData> {
    let buf = std::fs::read(path)?;
    if buf.len() < 8 {
        return Err(StrataError::corruption("manifest too small"));
    }
    if &buf[0..4] != MANIFEST_MAGIC {
        return Err(StrataError::corruption("bad manifest magic"));
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[4..8]);
    let version = u32::from_le_bytes(raw);
    if version != MANIFEST_VERSION {
        return Err(StrataError::corruption(format!(
            "unsupported manifest version {}",
            version
        )));
    }
    Ok(rmp_serde::from_slice(&buf[8..])?)
}

// ============================================================================
// DirectoryLock
// ============================================================================

/// Held by a writer for its whole lifetime; released on drop.
pub(crate) enum DirectoryLock {
    Ram(Arc<RamInner>),
    Fs(File),
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        match self {
            DirectoryLock::Ram(inner) => inner.locked.store(false, Ordering::Release),
            DirectoryLock::Fs(file) => {
                let _ = file.unlock();
            }
        }
    }
}
