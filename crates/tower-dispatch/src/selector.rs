//! Node selection strategies.
//!
//! A selector does not pick a single node. It returns the order in which the
//! router should offer a request to the nodes of the current snapshot; the
//! router walks that order until a node's limiter admits the request.

use http::Uri;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower_dispatch_core::Endpoint;

/// Trait for implementing custom selection strategies.
///
/// Returned indices refer to `nodes`. Indices out of range are skipped and an
/// empty order refuses the request, which leaves it queued.
///
/// # Examples
///
/// ```rust
/// use tower_dispatch::NodeSelector;
/// use tower_dispatch_core::Endpoint;
/// use http::Uri;
///
/// /// Prefers nodes in the local zone, falling back to the rest.
/// struct LocalFirst;
///
/// impl NodeSelector for LocalFirst {
///     fn candidates(&self, nodes: &[Uri], _endpoint: &Endpoint) -> Vec<usize> {
///         let (mut local, remote): (Vec<usize>, Vec<usize>) = (0..nodes.len())
///             .partition(|&i| nodes[i].host().is_some_and(|h| h.ends_with(".local")));
///         local.extend(remote);
///         local
///     }
/// }
/// ```
pub trait NodeSelector: Send + Sync {
    /// Returns the candidate order for a request to `endpoint`.
    fn candidates(&self, nodes: &[Uri], endpoint: &Endpoint) -> Vec<usize>;
}

// Blanket impl for closures
impl<F> NodeSelector for F
where
    F: Fn(&[Uri], &Endpoint) -> Vec<usize> + Send + Sync,
{
    fn candidates(&self, nodes: &[Uri], endpoint: &Endpoint) -> Vec<usize> {
        self(nodes, endpoint)
    }
}

/// Built-in selection strategies.
#[derive(Clone, Default)]
pub enum SelectionStrategy {
    /// Rotate the starting node on every request, then try the others in order.
    /// Best for: spreading load evenly across equivalent nodes.
    #[default]
    RoundRobin,

    /// Always try nodes in configured order.
    /// Best for: primary/secondary failover.
    FirstAvailable,

    /// Start at a random node, then try the others in order.
    /// Best for: many clients sharing a fleet without synchronised rotation.
    #[cfg(feature = "random")]
    Random,

    /// Use a custom selector implementation.
    Custom(Arc<dyn NodeSelector>),
}

impl SelectionStrategy {
    /// Wraps a custom selector.
    pub fn custom<S>(selector: S) -> Self
    where
        S: NodeSelector + 'static,
    {
        SelectionStrategy::Custom(Arc::new(selector))
    }
}

impl fmt::Debug for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionStrategy::RoundRobin => f.write_str("RoundRobin"),
            SelectionStrategy::FirstAvailable => f.write_str("FirstAvailable"),
            #[cfg(feature = "random")]
            SelectionStrategy::Random => f.write_str("Random"),
            SelectionStrategy::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// A strategy together with the state it needs across requests.
pub(crate) struct StrategySelector {
    strategy: SelectionStrategy,
    round_robin_counter: AtomicUsize,
}

impl StrategySelector {
    pub(crate) fn new(strategy: SelectionStrategy) -> Self {
        Self {
            strategy,
            round_robin_counter: AtomicUsize::new(0),
        }
    }

    pub(crate) fn strategy(&self) -> &SelectionStrategy {
        &self.strategy
    }
}

impl NodeSelector for StrategySelector {
    fn candidates(&self, nodes: &[Uri], endpoint: &Endpoint) -> Vec<usize> {
        let len = nodes.len();
        if len == 0 {
            return Vec::new();
        }

        match &self.strategy {
            SelectionStrategy::RoundRobin => {
                let start = self.round_robin_counter.fetch_add(1, Ordering::Relaxed);
                rotated(start % len, len)
            }

            SelectionStrategy::FirstAvailable => (0..len).collect(),

            #[cfg(feature = "random")]
            SelectionStrategy::Random => {
                use rand::Rng;
                let start = rand::rng().random_range(0..len);
                rotated(start, len)
            }

            SelectionStrategy::Custom(selector) => selector.candidates(nodes, endpoint),
        }
    }
}

fn rotated(start: usize, len: usize) -> Vec<usize> {
    (0..len).map(|offset| (start + offset) % len).collect()
}
