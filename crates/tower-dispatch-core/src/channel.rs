//! Channel capabilities.
//!
//! A [`Channel`] is a transport: it always accepts a request and returns a
//! [`ResponseFuture`]. A [`LimitedChannel`] may refuse instead, which is how
//! concurrency limits push back on callers without blocking them.

use crate::error::DispatchError;
use crate::message::{Endpoint, Request, Response};
use crate::ready::ChannelReadySignal;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

/// Future resolving to the outcome of one dispatched request.
pub struct ResponseFuture {
    inner: BoxFuture<'static, Result<Response, DispatchError>>,
}

impl ResponseFuture {
    /// Wraps an arbitrary future.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Response, DispatchError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(future),
        }
    }

    /// A future that is already resolved with `result`.
    pub fn ready(result: Result<Response, DispatchError>) -> Self {
        Self::new(futures::future::ready(result))
    }

    /// A future that is already resolved with `response`.
    pub fn response(response: Response) -> Self {
        Self::ready(Ok(response))
    }

    /// A future that is already failed with `error`.
    pub fn failed(error: DispatchError) -> Self {
        Self::ready(Err(error))
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture").finish_non_exhaustive()
    }
}

/// A transport that puts requests on the wire for a single node.
///
/// Implementations must not block; long-running work belongs inside the
/// returned future.
pub trait Channel: Send + Sync + 'static {
    /// Executes `request` against `endpoint`.
    fn execute(&self, endpoint: Endpoint, request: Request) -> ResponseFuture;
}

impl<C: Channel + ?Sized> Channel for Arc<C> {
    fn execute(&self, endpoint: Endpoint, request: Request) -> ResponseFuture {
        (**self).execute(endpoint, request)
    }
}

/// A channel backed by a closure. Created with [`channel_fn`].
#[derive(Clone)]
pub struct ChannelFn<F> {
    f: F,
}

/// Returns a [`Channel`] that calls `f` for every request.
///
/// # Example
///
/// ```rust
/// use tower_dispatch_core::channel::{channel_fn, Channel};
/// use tower_dispatch_core::{Response, ResponseFuture};
/// use http::StatusCode;
///
/// let channel = channel_fn(|_endpoint, _request| {
///     ResponseFuture::response(Response::new(StatusCode::OK))
/// });
/// # let _ = channel;
/// ```
pub fn channel_fn<F>(f: F) -> ChannelFn<F>
where
    F: Fn(Endpoint, Request) -> ResponseFuture + Send + Sync + 'static,
{
    ChannelFn { f }
}

impl<F> Channel for ChannelFn<F>
where
    F: Fn(Endpoint, Request) -> ResponseFuture + Send + Sync + 'static,
{
    fn execute(&self, endpoint: Endpoint, request: Request) -> ResponseFuture {
        (self.f)(endpoint, request)
    }
}

impl<F> fmt::Debug for ChannelFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelFn").finish_non_exhaustive()
    }
}

/// A channel that may decline to execute a request right now.
pub trait LimitedChannel: Send + Sync + 'static {
    /// Attempts to admit `request`.
    ///
    /// Returns `None` without side effects if there is no capacity. Never
    /// blocks. An admitted request's future resolves independently of the
    /// caller.
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture>;

    /// Registers a listener to be told when capacity may have freed up.
    ///
    /// Implementations whose capacity is only ever released by completing
    /// requests may ignore this; callers already observe completions.
    fn add_ready_listener(&self, _listener: Weak<dyn ChannelReadySignal>) {}
}

impl<L: LimitedChannel + ?Sized> LimitedChannel for Arc<L> {
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture> {
        (**self).maybe_execute(endpoint, request)
    }

    fn add_ready_listener(&self, listener: Weak<dyn ChannelReadySignal>) {
        (**self).add_ready_listener(listener)
    }
}
