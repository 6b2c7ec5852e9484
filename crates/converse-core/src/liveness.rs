//! Foreground liveness control
//!
//! The host process must stay in the foreground while a call is live or a
//! registration attempt is in flight. Each such activity holds a
//! [`LivenessGuard`]; the controller moves the host into the foreground when
//! the first guard is taken and back out when the last one is dropped.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// The host process hook that keeps the app alive in the background
pub trait ForegroundHost: Send + Sync {
    fn enter_foreground(&self);
    fn exit_foreground(&self);
}

/// What a guard is keeping alive, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessReason {
    Call,
    Registration,
}

struct LivenessInner {
    count: Mutex<usize>,
    host: Arc<dyn ForegroundHost>,
}

impl LivenessInner {
    fn decrement(&self, reason: LivenessReason) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        debug!("Liveness released ({:?}), count = {}", reason, *count);
        if *count == 0 {
            info!("No calls or registrations in flight, leaving foreground");
            self.host.exit_foreground();
        }
    }
}

/// Reference-counts in-flight calls and registration attempts
#[derive(Clone)]
pub struct LivenessController {
    inner: Arc<LivenessInner>,
}

impl LivenessController {
    pub fn new(host: Arc<dyn ForegroundHost>) -> Self {
        Self {
            inner: Arc::new(LivenessInner {
                count: Mutex::new(0),
                host,
            }),
        }
    }

    /// Take a liveness token. The host enters the foreground on 0 -> 1.
    pub fn acquire(&self, reason: LivenessReason) -> LivenessGuard {
        let mut count = self.inner.count.lock();
        *count += 1;
        debug!("Liveness acquired ({:?}), count = {}", reason, *count);
        if *count == 1 {
            info!("Entering foreground for {:?}", reason);
            self.inner.host.enter_foreground();
        }
        LivenessGuard {
            inner: Some(self.inner.clone()),
            reason,
        }
    }

    pub fn count(&self) -> usize {
        *self.inner.count.lock()
    }

    pub fn is_foreground(&self) -> bool {
        self.count() > 0
    }
}

/// RAII liveness token; decrements exactly once
pub struct LivenessGuard {
    inner: Option<Arc<LivenessInner>>,
    reason: LivenessReason,
}

impl LivenessGuard {
    /// Release now instead of at drop. Further releases are no-ops.
    pub fn release(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.decrement(self.reason);
        }
    }
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for LivenessGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessGuard")
            .field("reason", &self.reason)
            .field("held", &self.inner.is_some())
            .finish()
    }
}
