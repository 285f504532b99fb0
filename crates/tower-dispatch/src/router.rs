//! Routing across a live-reloadable set of nodes.

use crate::selector::{NodeSelector, SelectionStrategy, StrategySelector};
use arc_swap::ArcSwap;
use http::Uri;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tower_dispatch_core::{
    AimdConfig, Channel, ChannelReadySignal, DispatchError, Endpoint, LimitedChannel,
    ReadyListeners, Request, ResponseFuture,
};
use tower_dispatch_limiter::{ConcurrencyLimitedChannel, ConcurrencyLimitedChannelConfig};

#[cfg(feature = "metrics")]
use metrics::gauge;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Creates the transport for a node.
pub type ChannelFactory = Arc<dyn Fn(&Uri) -> Arc<dyn Channel> + Send + Sync>;

/// Limit diagnostics for one configured node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLimit {
    /// The node.
    pub uri: Uri,
    /// Its current AIMD concurrency limit.
    pub limit: usize,
    /// Requests currently holding one of its permits.
    pub in_flight: usize,
}

#[derive(Default)]
struct NodeSet {
    uris: Vec<Uri>,
    channels: Vec<ConcurrencyLimitedChannel>,
}

impl NodeSet {
    fn position(&self, uri: &Uri) -> Option<usize> {
        self.uris.iter().position(|existing| existing == uri)
    }
}

/// A [`LimitedChannel`] that offers each request to the nodes of the current
/// snapshot, in the order chosen by its [`SelectionStrategy`].
///
/// With no nodes configured every request is refused. Readiness signals from
/// any node's channel are forwarded to this router's listeners.
pub struct NodeRouter {
    name: String,
    factory: ChannelFactory,
    limiter: AimdConfig,
    selector: StrategySelector,
    nodes: ArcSwap<NodeSet>,
    ready: Arc<ReadyListeners>,
    update_lock: Mutex<()>,
}

impl NodeRouter {
    pub(crate) fn new(
        name: String,
        factory: ChannelFactory,
        limiter: AimdConfig,
        strategy: SelectionStrategy,
    ) -> Self {
        Self {
            name,
            factory,
            limiter,
            selector: StrategySelector::new(strategy),
            nodes: ArcSwap::from_pointee(NodeSet::default()),
            ready: Arc::new(ReadyListeners::new()),
            update_lock: Mutex::new(()),
        }
    }

    /// Returns the channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the selection strategy.
    pub fn selection_strategy(&self) -> &SelectionStrategy {
        self.selector.strategy()
    }

    /// Returns the current node list.
    pub fn nodes(&self) -> Vec<Uri> {
        self.nodes.load().uris.clone()
    }

    /// Returns the limit and in-flight count of every current node.
    pub fn node_limits(&self) -> Vec<NodeLimit> {
        let snapshot = self.nodes.load();
        snapshot
            .uris
            .iter()
            .zip(&snapshot.channels)
            .map(|(uri, channel)| NodeLimit {
                uri: uri.clone(),
                limit: channel.limit(),
                in_flight: channel.in_flight(),
            })
            .collect()
    }

    /// Replaces the node list.
    ///
    /// Every identifier is validated before anything changes, so an error
    /// leaves the previous list in place. Nodes present before and after keep
    /// their channel and limiter state; new nodes start with a fresh limiter.
    /// Listeners are signalled once the new list is visible.
    pub fn update_nodes<I, S>(&self, nodes: I) -> Result<(), DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut uris: Vec<Uri> = Vec::new();
        for node in nodes {
            let uri = parse_node(node.as_ref())?;
            if !uris.contains(&uri) {
                uris.push(uri);
            }
        }

        let guard = self.update_lock.lock();
        let current = self.nodes.load_full();
        let mut channels = Vec::with_capacity(uris.len());
        for uri in &uris {
            let channel = match current.position(uri) {
                Some(index) => current.channels[index].clone(),
                None => self.new_channel(uri)?,
            };
            channels.push(channel);
        }

        #[cfg(feature = "tracing")]
        {
            let added = uris.iter().filter(|u| current.position(u).is_none()).count();
            let removed = current.uris.iter().filter(|u| !uris.contains(u)).count();
            debug!(
                channel = %self.name,
                nodes = uris.len(),
                added,
                removed,
                "updated dispatcher nodes"
            );
        }

        #[cfg(feature = "metrics")]
        gauge!("dispatch_nodes", "channel" => self.name.clone()).set(uris.len() as f64);

        let removed: Vec<ConcurrencyLimitedChannel> = current
            .uris
            .iter()
            .zip(&current.channels)
            .filter(|(uri, _)| !uris.contains(uri))
            .map(|(_, channel)| channel.clone())
            .collect();

        self.nodes.store(Arc::new(NodeSet { uris, channels }));
        for channel in &removed {
            channel.retire();
        }
        drop(guard);

        self.ready.notify();
        Ok(())
    }

    fn new_channel(&self, uri: &Uri) -> Result<ConcurrencyLimitedChannel, DispatchError> {
        let transport = panic::catch_unwind(AssertUnwindSafe(|| (self.factory)(uri)))
            .map_err(DispatchError::from_panic)?;
        let channel = ConcurrencyLimitedChannelConfig::builder()
            .name(self.name.clone())
            .node(uri.to_string())
            .limiter(self.limiter.clone())
            .build_channel(transport)?;

        let listener: Weak<ReadyListeners> = Arc::downgrade(&self.ready);
        channel.add_ready_listener(listener);
        Ok(channel)
    }
}

impl LimitedChannel for NodeRouter {
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture> {
        let snapshot = self.nodes.load();
        if snapshot.uris.is_empty() {
            return None;
        }

        for index in self.selector.candidates(&snapshot.uris, endpoint) {
            let Some(channel) = snapshot.channels.get(index) else {
                continue;
            };
            if let Some(response) = channel.maybe_execute(endpoint, request) {
                return Some(response);
            }
        }
        None
    }

    fn add_ready_listener(&self, listener: Weak<dyn ChannelReadySignal>) {
        self.ready.add(listener);
    }
}

impl fmt::Debug for NodeRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRouter")
            .field("name", &self.name)
            .field("nodes", &self.nodes.load().uris)
            .field("strategy", self.selector.strategy())
            .finish()
    }
}

/// Parses a node identifier, requiring a scheme and an authority.
pub(crate) fn parse_node(node: &str) -> Result<Uri, DispatchError> {
    let invalid = |reason: String| DispatchError::InvalidNode {
        uri: node.to_string(),
        reason,
    };

    let uri: Uri = node.parse().map_err(|err: http::uri::InvalidUri| invalid(err.to_string()))?;
    if uri.scheme().is_none() {
        return Err(invalid("missing scheme".to_string()));
    }
    if uri.authority().is_none() {
        return Err(invalid("missing authority".to_string()));
    }
    Ok(uri)
}
