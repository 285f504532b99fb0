//! Client-side request dispatch for a fleet of interchangeable nodes.
//!
//! `tower-dispatch` decides when an outbound request may be sent, how many
//! requests each node may have in flight, and what happens when no node has
//! room. It composes three layers:
//!
//! 1. a per-node [`ConcurrencyLimitedChannel`] whose AIMD limiter learns a
//!    safe concurrency ceiling from response status codes and I/O failures;
//! 2. a [`NodeRouter`] that offers each request to the nodes of a
//!    live-reloadable snapshot, in the order chosen by a [`SelectionStrategy`];
//! 3. a [`QueuedChannel`] in front of the router that holds refused requests
//!    in FIFO order and releases them as capacity frees up.
//!
//! [`Dispatcher`] wires these together.
//!
//! # Example
//!
//! ```rust
//! use tower_dispatch::{Dispatcher, SelectionStrategy};
//! use tower_dispatch_core::channel::channel_fn;
//! use tower_dispatch_core::{AimdConfig, Endpoint, Request, Response, ResponseFuture};
//! use http::{Method, StatusCode, Uri};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::builder()
//!     .channel_name("catalog")
//!     .channel_factory(|_node: &Uri| {
//!         // The real transport for this node goes here.
//!         channel_fn(|_endpoint, _request| ResponseFuture::response(Response::new(StatusCode::OK)))
//!     })
//!     .nodes(["https://catalog-1:8443", "https://catalog-2:8443"])
//!     .selection_strategy(SelectionStrategy::RoundRobin)
//!     .limiter_config(AimdConfig::default().with_initial_limit(20))
//!     .max_queue_size(1_000)
//!     .build()?;
//!
//! let endpoint = Endpoint::new("catalog", "getItem", Method::GET);
//! let response = dispatcher.execute(endpoint, Request::new()).await?;
//! assert_eq!(response.code(), 200);
//!
//! // Swap the node list while requests are in flight.
//! dispatcher.update_nodes(["https://catalog-2:8443", "https://catalog-3:8443"])?;
//! # Ok(())
//! # }
//! ```
//!
//! # Overload
//!
//! A full queue answers with a synthetic 429 response with no headers and no
//! body, not with an error. Callers that already handle non-2xx responses
//! need no extra code path.
//!
//! # Ordering
//!
//! Queued requests are released strictly in submission order. A request that
//! finds free capacity on arrival is sent immediately, even if older requests
//! are still waiting.
//!
//! # Failure isolation
//!
//! [`Dispatcher::execute`] always returns a future. A transport that panics
//! while starting a request produces a failed future with
//! [`DispatchError::Panicked`](tower_dispatch_core::DispatchError::Panicked),
//! and the panic is treated as carrying no load signal.
//!
//! # Feature Flags
//!
//! - `random`: the [`SelectionStrategy::Random`] strategy
//! - `tracing`: debug logging in every layer
//! - `metrics`: queue, node and limiter gauges and counters

mod dispatcher;
mod router;
mod selector;
mod service;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use router::{ChannelFactory, NodeLimit, NodeRouter};
pub use selector::{NodeSelector, SelectionStrategy};
pub use service::ServiceChannel;

pub use tower_dispatch_blocking::{BlockingChannel, BlockingChannelAdapter, CancellationFlag};
pub use tower_dispatch_limiter::ConcurrencyLimitedChannel;
pub use tower_dispatch_queue::QueuedChannel;

// Re-export the layer crates
pub use tower_dispatch_blocking as blocking;
pub use tower_dispatch_core as core;
pub use tower_dispatch_limiter as limiter;
pub use tower_dispatch_queue as queue;
