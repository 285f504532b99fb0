//! Configuration for concurrency-limited channels.

use crate::channel::ConcurrencyLimitedChannel;
use crate::events::LimiterEvent;
use std::sync::Arc;
use tower_dispatch_core::aimd::{AimdConfig, Outcome};
use tower_dispatch_core::events::{EventListeners, FnListener};
use tower_dispatch_core::{Channel, DispatchError};

#[cfg(feature = "metrics")]
use metrics::describe_gauge;
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Configuration for a [`ConcurrencyLimitedChannel`].
#[derive(Clone, Debug)]
pub struct ConcurrencyLimitedChannelConfig {
    /// Name of the owning channel, used as a metric label.
    pub(crate) name: String,
    /// Node identifier, used as a metric label.
    pub(crate) node: String,
    /// Limiter parameters.
    pub(crate) limiter: AimdConfig,
    /// Event listeners.
    pub(crate) event_listeners: EventListeners<LimiterEvent>,
}

impl ConcurrencyLimitedChannelConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ConcurrencyLimitedChannelConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_gauge!(
                    "dispatch_node_concurrency_limit",
                    "Current AIMD concurrency limit of a node"
                );
                describe_gauge!(
                    "dispatch_node_requests_in_flight",
                    "Requests currently holding a permit for a node"
                );
            });
        }
        ConcurrencyLimitedChannelConfigBuilder::new()
    }

    /// Returns the channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the node identifier.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Returns the limiter parameters.
    pub fn limiter(&self) -> &AimdConfig {
        &self.limiter
    }
}

/// Builder for [`ConcurrencyLimitedChannelConfig`].
pub struct ConcurrencyLimitedChannelConfigBuilder {
    name: String,
    node: String,
    limiter: AimdConfig,
    event_listeners: EventListeners<LimiterEvent>,
}

impl ConcurrencyLimitedChannelConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: "limited-channel".to_string(),
            node: String::new(),
            limiter: AimdConfig::default(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the name of the owning channel.
    ///
    /// Default: "limited-channel"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the node identifier reported in metrics and events.
    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    /// Sets the AIMD parameters for this node's limiter.
    ///
    /// Default: [`AimdConfig::default`]
    pub fn limiter(mut self, limiter: AimdConfig) -> Self {
        self.limiter = limiter;
        self
    }

    /// Registers a callback when a request is refused for lack of capacity.
    ///
    /// # Callback Signature
    /// `Fn(usize)` - Called with the concurrency limit that was reached.
    pub fn on_permit_refused<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let LimiterEvent::PermitRefused { limit, .. } = event {
                f(*limit);
            }
        }));
        self
    }

    /// Registers a callback when the concurrency limit moves.
    ///
    /// # Callback Signature
    /// `Fn(usize, usize, Outcome)` - Called with the previous limit, the new
    /// limit and the permit outcome that caused the change.
    ///
    /// # Example
    /// ```rust
    /// use tower_dispatch_limiter::ConcurrencyLimitedChannelConfig;
    ///
    /// let config = ConcurrencyLimitedChannelConfig::builder()
    ///     .node("https://node-1.internal:8443")
    ///     .on_limit_changed(|previous, limit, outcome| {
    ///         println!("limit {previous} -> {limit} after {outcome:?}");
    ///     })
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.node(), "https://node-1.internal:8443");
    /// ```
    pub fn on_limit_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize, Outcome) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let LimiterEvent::LimitChanged {
                previous,
                limit,
                outcome,
                ..
            } = event
            {
                f(*previous, *limit, *outcome);
            }
        }));
        self
    }

    /// Registers a callback when the transport panics starting a request.
    pub fn on_transport_panicked<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let LimiterEvent::TransportPanicked { .. } = event {
                f();
            }
        }));
        self
    }

    /// Builds the configuration, validating the limiter parameters.
    pub fn build(self) -> Result<ConcurrencyLimitedChannelConfig, DispatchError> {
        self.limiter.validate()?;
        Ok(ConcurrencyLimitedChannelConfig {
            name: self.name,
            node: self.node,
            limiter: self.limiter,
            event_listeners: self.event_listeners,
        })
    }

    /// Builds the configuration and wraps `transport` with it.
    pub fn build_channel(
        self,
        transport: Arc<dyn Channel>,
    ) -> Result<ConcurrencyLimitedChannel, DispatchError> {
        Ok(ConcurrencyLimitedChannel::with_config(self.build()?, transport))
    }
}

impl Default for ConcurrencyLimitedChannelConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
