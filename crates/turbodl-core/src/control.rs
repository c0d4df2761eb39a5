//! Cancellation for a download session.
//!
//! A [`CancelToken`] is a shared flag. The coordinator owns one per session and
//! is the only component that sets it; fetchers poll it from libcurl's progress
//! callback and between retry attempts. Callers may pass their own token
//! (e.g. wired to Ctrl-C) which the coordinator watches and forwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of cancellable sleeps.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sleeps for `d` unless `token` is cancelled first.
/// Returns `false` when the sleep was cut short by cancellation.
pub fn sleep_unless_cancelled(d: Duration, token: &CancelToken) -> bool {
    let deadline = Instant::now() + d;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(POLL_INTERVAL));
    }
}
