use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Batch-level abort flag, checked before every stage and while waiting on the predictor.
///
/// The `kira-segqc` binary never sets it; an interrupt ends the process and leaves
/// unfinished subjects at `Pending`. Library callers cancel through [`CancelToken::cancel`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
