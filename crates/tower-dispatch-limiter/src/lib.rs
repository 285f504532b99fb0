//! Per-node concurrency limiting for tower-dispatch.
//!
//! A [`ConcurrencyLimitedChannel`] sits between a dispatcher and one node's
//! transport. Every request must first acquire a permit from the node's AIMD
//! limiter; when none is available the request is refused and stays with the
//! caller (typically a queue) instead of piling onto an overloaded server.
//!
//! The limiter learns from responses:
//! - QoS responses (308, 429, 503), other 5xx responses and I/O failures shrink
//!   the limit multiplicatively
//! - other responses grow it by one, provided the node was at least half busy
//! - cancellations and panics leave it unchanged
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use http::{Method, StatusCode};
//! use tower_dispatch_core::channel::channel_fn;
//! use tower_dispatch_core::{AimdConfig, Endpoint, LimitedChannel, Request, Response, ResponseFuture};
//! use tower_dispatch_limiter::ConcurrencyLimitedChannelConfig;
//!
//! # async fn example() {
//! let transport = Arc::new(channel_fn(|_endpoint, _request| {
//!     ResponseFuture::response(Response::new(StatusCode::OK))
//! }));
//!
//! let node = ConcurrencyLimitedChannelConfig::builder()
//!     .name("catalog")
//!     .node("https://catalog-1.internal:8443")
//!     .limiter(AimdConfig::new().with_initial_limit(10))
//!     .build_channel(transport)
//!     .unwrap();
//!
//! let endpoint = Endpoint::new("catalog", "getItem", Method::GET);
//! match node.maybe_execute(&endpoint, &Request::new()) {
//!     Some(response) => println!("status {}", response.await.unwrap().code()),
//!     None => println!("node is saturated"),
//! }
//! # }
//! ```
//!
//! # Metrics
//!
//! With the `metrics` feature enabled each node reports two gauges, labelled
//! with `channel` and `node`:
//! - `dispatch_node_concurrency_limit`
//! - `dispatch_node_requests_in_flight`

pub mod channel;
pub mod config;
pub mod events;

pub use channel::ConcurrencyLimitedChannel;
pub use config::{ConcurrencyLimitedChannelConfig, ConcurrencyLimitedChannelConfigBuilder};
pub use events::LimiterEvent;
