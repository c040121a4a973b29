//! Index writer configuration

use std::fmt;
use std::sync::Arc;

use strata_core::{EngineConfig, InfoStream, StrataError, StrataResult};

use crate::merge::{MergePolicy, MergeScheduler};

/// Current segment codec.
pub const DEFAULT_CODEC: &str = "Strata10";

/// Legacy segment codec, still readable and writable.
pub const LEGACY_CODEC: &str = "Strata3x";

/// Codecs this engine can write.
pub const KNOWN_CODECS: &[&str] = &[DEFAULT_CODEC, LEGACY_CODEC];

/// Configuration for [`IndexWriter`](crate::IndexWriter).
#[derive(Clone)]
pub struct IndexWriterConfig {
    /// Codec name recorded in every segment
    pub codec: String,
    /// Buffered documents that trigger an automatic flush
    pub max_buffered_docs: usize,
    /// Which segments get merged
    pub merge_policy: MergePolicy,
    /// Where merges run
    pub merge_scheduler: MergeScheduler,
    /// Commit pending changes when the writer is closed
    pub commit_on_close: bool,
    info_stream: Option<Arc<dyn InfoStream>>,
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        IndexWriterConfig {
            codec: DEFAULT_CODEC.to_string(),
            max_buffered_docs: 10,
            merge_policy: MergePolicy::default(),
            merge_scheduler: MergeScheduler::default(),
            commit_on_close: true,
            info_stream: None,
        }
    }
}

impl fmt::Debug for IndexWriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexWriterConfig")
            .field("codec", &self.codec)
            .field("max_buffered_docs", &self.max_buffered_docs)
            .field("merge_policy", &self.merge_policy)
            .field("merge_scheduler", &self.merge_scheduler)
            .field("commit_on_close", &self.commit_on_close)
            .field("info_stream", &self.info_stream.is_some())
            .finish()
    }
}

impl IndexWriterConfig {
    /// Create config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set codec
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    /// Set the automatic flush threshold
    pub fn with_max_buffered_docs(mut self, max: usize) -> Self {
        self.max_buffered_docs = max;
        self
    }

    /// Set merge policy
    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Set merge scheduler
    pub fn with_merge_scheduler(mut self, scheduler: MergeScheduler) -> Self {
        self.merge_scheduler = scheduler;
        self
    }

    /// Set commit-on-close
    pub fn with_commit_on_close(mut self, commit: bool) -> Self {
        self.commit_on_close = commit;
        self
    }

    /// Set diagnostic sink
    pub fn with_info_stream(mut self, stream: Arc<dyn InfoStream>) -> Self {
        self.info_stream = Some(stream);
        self
    }

    /// Check settings before a writer opens.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Config`] for an unknown codec or a zero flush
    /// threshold.
    pub fn validate(&self) -> StrataResult<()> {
        if !KNOWN_CODECS.contains(&self.codec.as_str()) {
            return Err(StrataError::config(format!(
                "unknown codec '{}', expected one of {:?}",
                self.codec, KNOWN_CODECS
            )));
        }
        if self.max_buffered_docs == 0 {
            return Err(StrataError::config("max_buffered_docs must be at least 1"));
        }
        Ok(())
    }
}

impl EngineConfig for IndexWriterConfig {
    fn info_stream(&self) -> Option<Arc<dyn InfoStream>> {
        self.info_stream.clone()
    }

    fn set_info_stream(&mut self, stream: Arc<dyn InfoStream>) {
        self.info_stream = Some(stream);
    }

    fn codec_name(&self) -> &str {
        &self.codec
    }

    fn is_no_merge(&self) -> bool {
        self.merge_policy.is_no_merge()
    }
}
