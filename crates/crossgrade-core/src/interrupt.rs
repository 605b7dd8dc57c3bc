use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Operator-requested abort, shared between the signal handler, the runner
/// and anything that waits on external processes.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        if !self.raised.swap(true, Ordering::SeqCst) {
            tracing::warn!("Interrupt requested, no further actions will be started");
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}
