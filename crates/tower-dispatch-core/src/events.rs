//! Event system for dispatch channels.
//!
//! Queues and limiters emit typed events through [`EventListeners`], letting
//! applications observe admission decisions without depending on a metrics
//! backend. Every event names the channel it came from; events about a
//! single node also name that node.
//!
//! Events are emitted on the request path, so channels build them with
//! [`EventListeners::emit_with`] and pay nothing when no listener is
//! registered.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by dispatch channels.
pub trait DispatchEvent: Send + Sync + fmt::Debug {
    /// Returns the type of event (e.g., "request_queued", "limit_changed").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the channel that emitted this event.
    fn channel_name(&self) -> &str;

    /// Returns the node the event concerns, if it concerns a single node.
    fn node(&self) -> Option<&str> {
        None
    }
}

/// Trait for listening to dispatch events.
pub trait EventListener<E: DispatchEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Type alias for boxed event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: DispatchEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: DispatchEvent> EventListeners<E> {
    /// Creates a new empty event listener collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Adds a listener to the collection.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Builds an event with `make` and emits it, unless there are no
    /// listeners, in which case `make` is never called.
    pub fn emit_with(&self, make: impl FnOnce() -> E) {
        if !self.listeners.is_empty() {
            self.emit(&make());
        }
    }

    /// Emits an event to all registered listeners.
    ///
    /// Listener panics are caught; the remaining listeners still run and the
    /// emitting channel is unaffected.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if outcome.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    channel = event.channel_name(),
                    node = event.node().unwrap_or_default(),
                    event = event.event_type(),
                    "event listener panicked"
                );
            }
        }
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: DispatchEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DispatchEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Creates a new function-based listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: DispatchEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
