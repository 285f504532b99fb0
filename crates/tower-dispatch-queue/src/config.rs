//! Configuration for queued channels.

use crate::events::QueueEvent;
use crate::layer::QueuedChannelLayer;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tower_dispatch_core::events::{EventListeners, FnListener};
use tower_dispatch_core::Executor;

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Configuration for a [`QueuedChannel`](crate::QueuedChannel).
#[derive(Clone)]
pub struct QueuedChannelConfig {
    /// Name of this channel, used as the `channel` metric label.
    pub(crate) name: String,
    /// Maximum number of waiting requests.
    pub(crate) max_queue_size: usize,
    /// Where admitted requests are driven. `None` means the runtime current
    /// when the channel is created.
    pub(crate) executor: Option<Arc<dyn Executor>>,
    /// Event listeners.
    pub(crate) event_listeners: EventListeners<QueueEvent>,
}

impl QueuedChannelConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> QueuedChannelConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_gauge!(
                    "dispatch_requests_queued",
                    "Requests waiting in the queue for delegate capacity"
                );
                describe_gauge!(
                    "dispatch_requests_running",
                    "Requests delegated and not yet resolved"
                );
                describe_counter!(
                    "dispatch_requests_rejected_total",
                    "Requests answered with 429 because the queue was full"
                );
                describe_counter!(
                    "dispatch_requests_cancelled_total",
                    "Requests abandoned by their caller before completion"
                );
            });
        }
        QueuedChannelConfigBuilder::new()
    }

    /// Returns the channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the maximum queue size.
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }
}

impl Default for QueuedChannelConfig {
    fn default() -> Self {
        Self {
            name: "queued-channel".to_string(),
            max_queue_size: usize::MAX,
            executor: None,
            event_listeners: EventListeners::new(),
        }
    }
}

impl fmt::Debug for QueuedChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedChannelConfig")
            .field("name", &self.name)
            .field("max_queue_size", &self.max_queue_size)
            .field("executor", &self.executor.is_some())
            .field("event_listeners", &self.event_listeners)
            .finish()
    }
}

/// Builder for queued channel configuration.
pub struct QueuedChannelConfigBuilder {
    config: QueuedChannelConfig,
}

impl QueuedChannelConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: QueuedChannelConfig::default(),
        }
    }

    /// Sets the name of this channel.
    ///
    /// Default: "queued-channel"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the maximum number of requests allowed to wait.
    ///
    /// Requests arriving at a full queue resolve immediately with a 429
    /// response. Default: unbounded
    pub fn max_queue_size(mut self, max: usize) -> Self {
        self.config.max_queue_size = max;
        self
    }

    /// Drives admitted requests on the given runtime.
    ///
    /// Default: the runtime current when the channel is created
    pub fn runtime(self, handle: Handle) -> Self {
        self.executor(handle)
    }

    /// Drives admitted requests on a custom executor.
    pub fn executor<E: Executor>(mut self, executor: E) -> Self {
        self.config.executor = Some(Arc::new(executor));
        self
    }

    /// Registers a callback when a request is queued.
    ///
    /// # Callback Signature
    /// `Fn(usize)` - Called with the queue depth including the new request.
    ///
    /// # Example
    /// ```rust
    /// use tower_dispatch_queue::QueuedChannelConfig;
    ///
    /// let layer = QueuedChannelConfig::builder()
    ///     .max_queue_size(100)
    ///     .on_request_queued(|depth| {
    ///         if depth > 80 {
    ///             println!("queue nearly full: {}", depth);
    ///         }
    ///     })
    ///     .build();
    /// ```
    pub fn on_request_queued<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.config
            .event_listeners
            .add(FnListener::new(move |event| {
                if let QueueEvent::RequestQueued { queue_depth, .. } = event {
                    f(*queue_depth);
                }
            }));
        self
    }

    /// Registers a callback when a request is rejected by a full queue.
    ///
    /// # Callback Signature
    /// `Fn(usize)` - Called with the configured maximum queue size.
    pub fn on_request_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.config
            .event_listeners
            .add(FnListener::new(move |event| {
                if let QueueEvent::RequestRejected { max_queue_size, .. } = event {
                    f(*max_queue_size);
                }
            }));
        self
    }

    /// Registers a callback when a request is handed to the delegate.
    ///
    /// # Callback Signature
    /// `Fn(Duration)` - Called with the time the request spent queued.
    pub fn on_request_delegated<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.config
            .event_listeners
            .add(FnListener::new(move |event| {
                if let QueueEvent::RequestDelegated { waited, .. } = event {
                    f(*waited);
                }
            }));
        self
    }

    /// Registers a callback when a caller abandons its request.
    pub fn on_request_cancelled<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config
            .event_listeners
            .add(FnListener::new(move |event| {
                if let QueueEvent::RequestCancelled { .. } = event {
                    f();
                }
            }));
        self
    }

    /// Builds the configuration and returns a [`QueuedChannelLayer`].
    pub fn build(self) -> QueuedChannelLayer {
        QueuedChannelLayer::new(self.config)
    }

    /// Builds the configuration without wrapping it in a layer.
    pub fn build_config(self) -> QueuedChannelConfig {
        self.config
    }
}

impl Default for QueuedChannelConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
