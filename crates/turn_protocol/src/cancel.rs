//! Cooperative cancellation shared by every suspension point in the runtime.
//!
//! Timeouts are implemented by arming the same signal on a deadline, so an
//! expired deadline and an explicit abort are indistinguishable to callers.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared cancellation flag threaded through transports, credential calls,
/// listeners, and queued waits.
pub type CancelSignal = Arc<AtomicBool>;

/// Granularity at which in-flight futures observe cancellation.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[must_use]
pub fn new_cancel_signal() -> CancelSignal {
    Arc::new(AtomicBool::new(false))
}

#[must_use]
pub fn is_cancelled(signal: &CancelSignal) -> bool {
    signal.load(Ordering::Acquire)
}

pub fn request_cancel(signal: &CancelSignal) {
    signal.store(true, Ordering::Release);
}

/// Awaits `future` while observing `signal`, returning `None` once the
/// signal is set. The future is dropped on cancellation, which closes any
/// connection it holds.
pub async fn await_or_cancel<F>(future: F, signal: &CancelSignal) -> Option<F::Output>
where
    F: Future,
{
    let mut future = Box::pin(future);

    loop {
        if is_cancelled(signal) {
            return None;
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(signal) {
                return None;
            }
            return Some(output);
        }
    }
}
