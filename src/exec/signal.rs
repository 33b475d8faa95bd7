//! Cross-thread signals between the worker and the UI loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Coalescing "please repaint" flag.
///
/// Any number of `request` calls between two `take` calls produce a single
/// pending repaint.
#[derive(Clone, Default)]
pub struct RedrawSignal {
    inner: Arc<RedrawInner>,
}

#[derive(Default)]
struct RedrawInner {
    pending: AtomicBool,
    notify: Notify,
}

impl RedrawSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a repaint. Returns `false` when one was already pending.
    pub fn request(&self) -> bool {
        let newly_set = !self.inner.pending.swap(true, Ordering::AcqRel);
        if newly_set {
            self.inner.notify.notify_one();
        }
        newly_set
    }

    /// Consume the pending repaint, if any.
    pub fn take(&self) -> bool {
        self.inner.pending.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Wait until a repaint is requested.
    pub async fn notified(&self) {
        if self.is_pending() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

impl std::fmt::Debug for RedrawSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedrawSignal")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Application termination request, callable from any context.
#[derive(Debug, Clone, Default)]
pub struct ExitSignal {
    token: CancellationToken,
}

impl ExitSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_exit(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}
