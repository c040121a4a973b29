//! Diagnostic message sink
//!
//! Engines report what they are doing as `(component, message)` pairs.
//! Producers must check [`InfoStream::is_enabled`] before formatting a
//! message; consumers decide per component whether they care.

/// Component name for writer lifecycle messages (flush, commit, close).
pub const WRITER_COMPONENT: &str = "IW";

/// Component name for merge scheduling messages.
pub const MERGE_COMPONENT: &str = "MS";

/// Component name reserved for test points: places in the engine where test
/// harnesses may perturb thread interleavings.
pub const TEST_POINT_COMPONENT: &str = "TP";

/// A diagnostic message consumer.
///
/// Implementations are called from whichever engine thread emits the
/// message, so they must be cheap and must never block on engine locks.
pub trait InfoStream: Send + Sync {
    /// Consume a message for `component`.
    fn message(&self, component: &str, message: &str);

    /// True if messages for `component` should be produced at all.
    fn is_enabled(&self, component: &str) -> bool;
}

/// Sink that is never enabled and drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInfoStream;

impl InfoStream for NullInfoStream {
    fn message(&self, _component: &str, _message: &str) {}

    fn is_enabled(&self, _component: &str) -> bool {
        false
    }
}
