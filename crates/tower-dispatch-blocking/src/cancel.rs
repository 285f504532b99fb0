//! Cooperative cancellation for blocking calls.
//!
//! A blocking call cannot be preempted. Instead, the adapter raises a
//! [`CancellationFlag`] when the caller gives up, and the call can check it
//! between steps via [`is_cancelled`] from the worker thread.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Option<CancellationFlag>> = const { RefCell::new(None) };
}

/// Shared flag raised when the caller of a blocking call goes away.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    /// Creates a flag that is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once the flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns the flag of the blocking call running on this thread, if any.
    pub fn current() -> Option<CancellationFlag> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Makes this flag current on this thread until the guard drops.
    pub(crate) fn enter(&self) -> EnterGuard {
        let previous = CURRENT.with(|current| current.replace(Some(self.clone())));
        EnterGuard { previous }
    }
}

/// Restores the previously current flag, including during unwinding.
pub(crate) struct EnterGuard {
    previous: Option<CancellationFlag>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Returns true if the blocking call running on this thread was cancelled.
///
/// Always false outside a call made through
/// [`BlockingChannelAdapter`](crate::BlockingChannelAdapter).
pub fn is_cancelled() -> bool {
    CancellationFlag::current().is_some_and(|flag| flag.is_cancelled())
}
