//! Test-point interception
//!
//! The engine announces interesting moments ("flush start", "mergeMiddle
//! start", ...) on the reserved `"TP"` info-stream channel, often from its
//! own merge threads. [`TestPointInfoStream`] sits in front of the
//! configured sink and calls a [`TestPoint`] synchronously on the emitting
//! thread, which lets [`RandomYield`] shuffle thread interleavings.
//!
//! Test points run inside engine internals: implementations must not block,
//! take locks, or do I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::RngCore;
use strata_core::{InfoStream, NullInfoStream, TEST_POINT_COMPONENT};

/// Callback invoked on every test-point message.
pub trait TestPoint: Send + Sync {
    /// Called on the thread that emitted the message.
    fn apply(&self, message: &str);
}

/// Yields the current thread with probability `1/one_in`.
///
/// Uses a lock-free splitmix64 stream, so concurrent callers never contend
/// on a mutex.
#[derive(Debug)]
pub struct RandomYield {
    state: AtomicU64,
    one_in: u64,
}

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

impl RandomYield {
    /// Default yield odds
    pub const DEFAULT_ONE_IN: u64 = 4;

    /// Create from an explicit seed.
    pub fn new(seed: u64, one_in: u64) -> Self {
        RandomYield {
            state: AtomicU64::new(seed),
            one_in: one_in.max(1),
        }
    }

    /// Seed from a caller-owned generator.
    pub fn substream<R: RngCore + ?Sized>(parent: &mut R, one_in: u64) -> Self {
        Self::new(parent.next_u64(), one_in)
    }

    // splitmix64 over an atomic counter: an `StdRng` would need a mutex,
    // and test points run where the engine may already hold its own locks.
    fn next(&self) -> u64 {
        let mut z = self
            .state
            .fetch_add(GOLDEN_GAMMA, Ordering::Relaxed)
            .wrapping_add(GOLDEN_GAMMA);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Draw the next decision; true means "yield".
    pub fn should_yield(&self) -> bool {
        self.next() % self.one_in == 0
    }
}

impl TestPoint for RandomYield {
    fn apply(&self, _message: &str) {
        if self.should_yield() {
            std::thread::yield_now();
        }
    }
}

/// Info stream that runs a [`TestPoint`] on `"TP"` messages and forwards
/// everything the wrapped sink wants.
pub struct TestPointInfoStream {
    delegate: Arc<dyn InfoStream>,
    test_point: Arc<dyn TestPoint>,
}

impl TestPointInfoStream {
    /// Wrap `delegate`, or a [`NullInfoStream`] if `None`.
    pub fn new(delegate: Option<Arc<dyn InfoStream>>, test_point: Arc<dyn TestPoint>) -> Self {
        TestPointInfoStream {
            delegate: delegate.unwrap_or_else(|| Arc::new(NullInfoStream) as Arc<dyn InfoStream>),
            test_point,
        }
    }

    /// The wrapped sink
    pub fn delegate(&self) -> &Arc<dyn InfoStream> {
        &self.delegate
    }
}

impl std::fmt::Debug for TestPointInfoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestPointInfoStream").finish_non_exhaustive()
    }
}

impl InfoStream for TestPointInfoStream {
    fn message(&self, component: &str, message: &str) {
        if component == TEST_POINT_COMPONENT {
            self.test_point.apply(message);
        }
        if self.delegate.is_enabled(component) {
            self.delegate.message(component, message);
        }
    }

    fn is_enabled(&self, component: &str) -> bool {
        component == TEST_POINT_COMPONENT || self.delegate.is_enabled(component)
    }
}
