//! The dispatcher and its builder.

use crate::router::{ChannelFactory, NodeLimit, NodeRouter};
use crate::selector::SelectionStrategy;
use http::Uri;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tower_dispatch_core::{AimdConfig, Channel, DispatchError, Endpoint, Request, ResponseFuture};
use tower_dispatch_queue::{QueuedChannel, QueuedChannelConfig};

#[cfg(feature = "metrics")]
use metrics::describe_gauge;
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Dispatches requests across a live-reloadable set of nodes.
///
/// Every request first goes through a FIFO queue; the queue offers it to
/// the nodes in the order chosen by the selection strategy, and each node
/// admits it only while its AIMD limiter has a free permit. Cloning is cheap
/// and clones share all state.
///
/// Requests submitted while no node is configured wait in the queue and are
/// released, in submission order, once [`update_nodes`](Self::update_nodes)
/// provides capacity.
#[derive(Clone)]
pub struct Dispatcher {
    queue: QueuedChannel<NodeRouter>,
}

impl Dispatcher {
    /// Creates a new builder.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Submits a request.
    ///
    /// Never fails synchronously. The returned future resolves with the
    /// node's response, a synthetic 429 response if the queue is full, or an
    /// error if the transport failed or panicked.
    pub fn execute(&self, endpoint: Endpoint, request: Request) -> ResponseFuture {
        self.queue.execute(endpoint, request)
    }

    /// Replaces the node list.
    ///
    /// All identifiers must be URIs with a scheme and an authority. On error
    /// the previous list stays active. Duplicates are collapsed keeping
    /// their first position. Nodes kept across the update keep their
    /// limiter state; requests already running on removed nodes complete
    /// normally.
    pub fn update_nodes<I, S>(&self, nodes: I) -> Result<(), DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.router().update_nodes(nodes)
    }

    /// Returns the current node list.
    pub fn nodes(&self) -> Vec<Uri> {
        self.router().nodes()
    }

    /// Returns the limit and in-flight count of every current node.
    pub fn node_limits(&self) -> Vec<NodeLimit> {
        self.router().node_limits()
    }

    /// Number of requests waiting for capacity.
    pub fn queued(&self) -> usize {
        self.queue.queued()
    }

    /// Number of requests currently running on a node.
    pub fn running(&self) -> usize {
        self.queue.running()
    }

    /// Returns the channel name.
    pub fn name(&self) -> &str {
        self.queue.name()
    }

    fn router(&self) -> &NodeRouter {
        self.queue.delegate()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", self.router())
            .field("queued", &self.queued())
            .field("running", &self.running())
            .finish()
    }
}

/// Builder for [`Dispatcher`].
///
/// `channel_name` and `channel_factory` are required.
pub struct DispatcherBuilder {
    channel_name: Option<String>,
    nodes: Vec<String>,
    channel_factory: Option<ChannelFactory>,
    selection_strategy: SelectionStrategy,
    max_queue_size: usize,
    limiter_config: AimdConfig,
    runtime: Option<Handle>,
}

impl DispatcherBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_gauge!("dispatch_nodes", "Number of nodes currently configured");
            });
        }

        Self {
            channel_name: None,
            nodes: Vec::new(),
            channel_factory: None,
            selection_strategy: SelectionStrategy::default(),
            max_queue_size: usize::MAX,
            limiter_config: AimdConfig::default(),
            runtime: None,
        }
    }

    /// Sets the name used to label metrics, events and logs.
    pub fn channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = Some(name.into());
        self
    }

    /// Sets the initial node list.
    ///
    /// Defaults to no nodes; requests queue until nodes are provided.
    pub fn nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the function that creates the transport for a node.
    ///
    /// Called once per node when it is first added.
    pub fn channel_factory<F, C>(mut self, factory: F) -> Self
    where
        F: Fn(&Uri) -> C + Send + Sync + 'static,
        C: Channel,
    {
        self.channel_factory = Some(Arc::new(move |uri: &Uri| -> Arc<dyn Channel> {
            Arc::new(factory(uri))
        }));
        self
    }

    /// Sets the node selection strategy.
    ///
    /// Default: round robin.
    pub fn selection_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.selection_strategy = strategy;
        self
    }

    /// Sets how many requests may wait for capacity.
    ///
    /// Requests beyond this receive a synthetic 429 response.
    ///
    /// Default: unbounded
    pub fn max_queue_size(mut self, max: usize) -> Self {
        self.max_queue_size = max;
        self
    }

    /// Sets the limiter parameters used for every newly added node.
    pub fn limiter_config(mut self, config: AimdConfig) -> Self {
        self.limiter_config = config;
        self
    }

    /// Sets the runtime that drives admitted requests.
    ///
    /// Default: the runtime current when [`build`](Self::build) is called.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Builds the dispatcher.
    ///
    /// Fails if a required field is missing, the limiter configuration is
    /// invalid, a node identifier is malformed, or no runtime is available.
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let name = self
            .channel_name
            .ok_or_else(|| DispatchError::Config("channel_name is required".to_string()))?;
        let factory = self
            .channel_factory
            .ok_or_else(|| DispatchError::Config("channel_factory is required".to_string()))?;
        self.limiter_config.validate()?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| {
                DispatchError::Config(
                    "no runtime configured and not called from a Tokio runtime".to_string(),
                )
            })?,
        };

        let router = NodeRouter::new(
            name.clone(),
            factory,
            self.limiter_config,
            self.selection_strategy,
        );
        router.update_nodes(&self.nodes)?;

        let config = QueuedChannelConfig::builder()
            .name(name)
            .max_queue_size(self.max_queue_size)
            .runtime(runtime)
            .build_config();

        Ok(Dispatcher {
            queue: QueuedChannel::with_config(router, config),
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("channel_name", &self.channel_name)
            .field("nodes", &self.nodes)
            .field("channel_factory", &self.channel_factory.is_some())
            .field("selection_strategy", &self.selection_strategy)
            .field("max_queue_size", &self.max_queue_size)
            .field("limiter_config", &self.limiter_config)
            .finish()
    }
}
