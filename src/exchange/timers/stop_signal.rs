use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancels the paired timer task when dropped.
pub(super) struct CancelOnDrop {
    cancelled: Arc<AtomicBool>,
}

pub(super) struct CancelCheck {
    cancelled: Arc<AtomicBool>,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl CancelCheck {
    pub(super) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

pub(super) fn new() -> (CancelOnDrop, CancelCheck) {
    let cancelled = Arc::new(AtomicBool::new(false));

    (
        CancelOnDrop {
            cancelled: cancelled.clone(),
        },
        CancelCheck { cancelled },
    )
}
