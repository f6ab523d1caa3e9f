//! Thread-safe host abort flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clonable flag raised by the host to stop a run at the next batch boundary.
///
/// Clones share the same flag, so one can be handed to another thread
/// (e.g. a signal handler) while the runtime keeps its own.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    raised: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Creates a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn trigger(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Returns `true` while the flag is raised.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Lowers the flag and returns whether it was raised.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::SeqCst)
    }
}
