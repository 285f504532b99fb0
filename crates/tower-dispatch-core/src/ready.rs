//! Readiness signalling between limited channels and their callers.
//!
//! Signals are edge-triggered hints: a receiver must retry with
//! [`LimitedChannel::maybe_execute`](crate::LimitedChannel::maybe_execute)
//! and tolerate both duplicate and spurious notifications.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Listener told that a limited channel may have capacity again.
pub trait ChannelReadySignal: Send + Sync {
    /// Invoked when requests may succeed. There is no guarantee that they will.
    fn on_channel_ready(&self);
}

/// Weakly-held set of [`ChannelReadySignal`] listeners.
///
/// Holding listeners weakly lets a queue register with the channel it owns
/// without creating a reference cycle. Dead listeners are pruned on notify.
#[derive(Default)]
pub struct ReadyListeners {
    listeners: Mutex<Vec<Weak<dyn ChannelReadySignal>>>,
}

impl ReadyListeners {
    /// Creates an empty listener set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn add(&self, listener: Weak<dyn ChannelReadySignal>) {
        self.listeners.lock().push(listener);
    }

    /// Notifies every live listener.
    ///
    /// The internal lock is released before listeners run, so a listener may
    /// re-enter the channel that notified it. Panicking listeners are isolated.
    pub fn notify(&self) {
        let live: Vec<Arc<dyn ChannelReadySignal>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|listener| listener.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_channel_ready();
            }));
        }
    }

    /// Returns the number of registered listeners that are still alive.
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|listener| listener.strong_count() > 0)
            .count()
    }

    /// Returns true if no live listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChannelReadySignal for ReadyListeners {
    fn on_channel_ready(&self) {
        self.notify();
    }
}

impl fmt::Debug for ReadyListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyListeners")
            .field("len", &self.len())
            .finish()
    }
}
