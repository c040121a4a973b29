//! Engine-side diagnostics helpers
//!
//! [`emit`] is how engine code produces messages: the formatting closure only
//! runs when the sink is enabled for the component. [`TracingInfoStream`]
//! forwards engine messages into `tracing`.

use std::collections::HashSet;

use strata_core::{InfoStream, TEST_POINT_COMPONENT};

/// Send a lazily formatted message to `stream` if it wants `component`.
pub(crate) fn emit(stream: &dyn InfoStream, component: &str, message: impl FnOnce() -> String) {
    if stream.is_enabled(component) {
        stream.message(component, &message());
    }
}

/// Forwards engine diagnostics to `tracing` at debug level.
///
/// Test-point messages are excluded unless explicitly requested; they fire
/// on every document and drown everything else.
#[derive(Debug, Clone, Default)]
pub struct TracingInfoStream {
    /// `None` means every component except test points
    components: Option<HashSet<String>>,
}

impl TracingInfoStream {
    /// Forward every component except test points.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward only the listed components.
    pub fn for_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TracingInfoStream {
            components: Some(components.into_iter().map(Into::into).collect()),
        }
    }
}

impl InfoStream for TracingInfoStream {
    fn message(&self, component: &str, message: &str) {
        tracing::debug!(target: "strata::engine", component, "{}", message);
    }

    fn is_enabled(&self, component: &str) -> bool {
        let wanted = match &self.components {
            Some(set) => set.contains(component),
            None => component != TEST_POINT_COMPONENT,
        };
        wanted && tracing::enabled!(target: "strata::engine", tracing::Level::DEBUG)
    }
}
