//! Blocking transports for tower-dispatch.
//!
//! Some transports only offer a blocking API. [`BlockingChannelAdapter`]
//! runs such a [`BlockingChannel`] on Tokio's blocking thread pool and
//! exposes it as an asynchronous [`Channel`](tower_dispatch_core::Channel),
//! so it can sit underneath a limiter and queue like any other transport.
//!
//! # Example
//!
//! ```rust
//! use tower_dispatch_blocking::BlockingChannelAdapter;
//! use tower_dispatch_core::{Channel, Endpoint, Request, Response};
//! use http::{Method, StatusCode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = BlockingChannelAdapter::new(|_endpoint: &Endpoint, _request: Request| -> std::io::Result<Response> {
//!     // A synchronous client call goes here.
//!     Ok(Response::new(StatusCode::OK))
//! });
//!
//! let endpoint = Endpoint::new("catalog", "getItem", Method::GET);
//! let response = adapter.execute(endpoint, Request::new()).await?;
//! assert_eq!(response.code(), 200);
//! # Ok(())
//! # }
//! ```
//!
//! # Cancellation
//!
//! A running blocking call cannot be interrupted. When the caller drops the
//! response future, the adapter raises the call's [`CancellationFlag`].
//! Transports that loop or wait can check [`is_cancelled`] and give up early.
//! Whatever the call returns after cancellation is dropped on the worker
//! thread, so pooled connections and buffers are released.
//!
//! # Errors
//!
//! | Outcome of the blocking call      | Future resolves to               |
//! |-----------------------------------|----------------------------------|
//! | `Ok(response)`                    | `Ok(response)`                   |
//! | `Err(io_error)`                   | `DispatchError::Transport`       |
//! | panic                             | `DispatchError::Panicked`        |
//! | no runtime available              | `DispatchError::Config`          |

mod adapter;
mod cancel;
mod channel;

pub use adapter::BlockingChannelAdapter;
pub use cancel::{is_cancelled, CancellationFlag};
pub use channel::BlockingChannel;
