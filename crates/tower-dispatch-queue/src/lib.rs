//! FIFO backpressure queue for tower-dispatch.
//!
//! A [`QueuedChannel`] turns a [`LimitedChannel`](tower_dispatch_core::LimitedChannel),
//! which may refuse requests, into a [`Channel`](tower_dispatch_core::Channel),
//! which never does. Refused requests wait in a FIFO queue and are handed to
//! the delegate as soon as capacity frees up: when a delegated request
//! completes or the delegate signals readiness.
//!
//! # Basic Example
//!
//! ```rust
//! use std::sync::Arc;
//! use http::{Method, StatusCode};
//! use tower_dispatch_core::channel::channel_fn;
//! use tower_dispatch_core::{Endpoint, Request, Response, ResponseFuture};
//! use tower_dispatch_limiter::ConcurrencyLimitedChannel;
//! use tower_dispatch_queue::QueuedChannelConfig;
//! use tower_layer::Layer;
//!
//! # async fn example() {
//! let node = ConcurrencyLimitedChannel::new(
//!     "https://catalog-1.internal:8443",
//!     Arc::new(channel_fn(|_, _| ResponseFuture::response(Response::new(StatusCode::OK)))),
//! );
//!
//! let channel = QueuedChannelConfig::builder()
//!     .name("catalog")
//!     .max_queue_size(1_000)
//!     .build()
//!     .layer(node);
//!
//! let response = channel
//!     .execute(Endpoint::new("catalog", "getItem", Method::GET), Request::new())
//!     .await
//!     .unwrap();
//! assert_eq!(response.code(), 200);
//! # }
//! ```
//!
//! # Overload
//!
//! When the queue is full, `execute` resolves immediately with a synthetic
//! `429 Too Many Requests` response with no headers and no body. It is not an
//! error: callers that already handle non-2xx responses handle it uniformly.
//!
//! # Ordering
//!
//! Waiting requests are released strictly in submission order; a refused
//! head blocks the ones behind it. Requests admitted on their first attempt
//! never wait and may overtake requests already in the queue.
//!
//! # Cancellation
//!
//! Dropping a response future removes a waiting request from the queue, or
//! drops the delegate's future for a request already running. Either way the
//! request is counted once as cancelled.
//!
//! # Metrics
//!
//! With the `metrics` feature enabled, labelled with `channel`:
//! - `dispatch_requests_queued` (gauge)
//! - `dispatch_requests_running` (gauge)
//! - `dispatch_requests_rejected_total` (counter)
//! - `dispatch_requests_cancelled_total` (counter)

pub mod config;
pub mod events;
mod future;
pub mod layer;
mod queue;
pub mod service;

pub use config::{QueuedChannelConfig, QueuedChannelConfigBuilder};
pub use events::QueueEvent;
pub use layer::QueuedChannelLayer;
pub use service::QueuedChannel;
