//! Tower layer implementation for queued channels.

use crate::config::QueuedChannelConfig;
use crate::service::QueuedChannel;
use tower_dispatch_core::LimitedChannel;
use tower_layer::Layer;

/// Layer that puts a FIFO queue in front of a [`LimitedChannel`].
#[derive(Clone, Debug)]
pub struct QueuedChannelLayer {
    config: QueuedChannelConfig,
}

impl QueuedChannelLayer {
    /// Creates a new layer with the given configuration.
    pub fn new(config: QueuedChannelConfig) -> Self {
        Self { config }
    }

    /// Creates a new builder for configuring a queued channel layer.
    ///
    /// # Examples
    ///
    /// ```
    /// use tower_dispatch_queue::QueuedChannelLayer;
    ///
    /// let layer = QueuedChannelLayer::builder()
    ///     .name("catalog")
    ///     .max_queue_size(1_000)
    ///     .build();
    /// ```
    pub fn builder() -> crate::QueuedChannelConfigBuilder {
        QueuedChannelConfig::builder()
    }

    /// Returns the configuration applied by this layer.
    pub fn config(&self) -> &QueuedChannelConfig {
        &self.config
    }
}

impl<C: LimitedChannel> Layer<C> for QueuedChannelLayer {
    type Service = QueuedChannel<C>;

    /// # Panics
    ///
    /// Panics if no executor was configured and this is called outside a
    /// Tokio runtime.
    fn layer(&self, delegate: C) -> Self::Service {
        QueuedChannel::with_config(delegate, self.config.clone())
    }
}
