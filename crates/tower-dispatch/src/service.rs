//! Tower integration.

use crate::dispatcher::Dispatcher;
use futures::future::poll_fn;
use std::fmt;
use std::task::{Context, Poll};
use tower_dispatch_core::error::BoxError;
use tower_dispatch_core::{Channel, DispatchError, Endpoint, Request, Response, ResponseFuture};
use tower_service::Service;

/// Uses a Tower [`Service`] as the transport for a node.
///
/// Each request runs on a clone of the service, after waiting for it to
/// become ready. Service errors that are I/O errors count as transport
/// failures for the node's limiter; any other error is passed through as
/// [`DispatchError::Service`].
///
/// # Example
///
/// ```rust
/// use tower_dispatch::{Dispatcher, ServiceChannel};
/// use tower_dispatch_core::{Endpoint, Request, Response};
/// use http::{StatusCode, Uri};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let dispatcher = Dispatcher::builder()
///     .channel_name("catalog")
///     .channel_factory(|_uri: &Uri| {
///         ServiceChannel::new(tower::service_fn(|(_endpoint, _request): (Endpoint, Request)| async {
///             Ok::<_, std::io::Error>(Response::new(StatusCode::OK))
///         }))
///     })
///     .nodes(["http://catalog-1:8080"])
///     .build()?;
/// # let _ = dispatcher;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ServiceChannel<S> {
    service: S,
}

impl<S> ServiceChannel<S> {
    /// Wraps `service`.
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Returns the wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.service
    }

    /// Consumes the channel, returning the wrapped service.
    pub fn into_inner(self) -> S {
        self.service
    }
}

impl<S> fmt::Debug for ServiceChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceChannel").finish_non_exhaustive()
    }
}

impl<S> Channel for ServiceChannel<S>
where
    S: Service<(Endpoint, Request), Response = Response> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    fn execute(&self, endpoint: Endpoint, request: Request) -> ResponseFuture {
        let mut service = self.service.clone();
        ResponseFuture::new(async move {
            poll_fn(|cx| service.poll_ready(cx))
                .await
                .map_err(DispatchError::service)?;
            service
                .call((endpoint, request))
                .await
                .map_err(DispatchError::service)
        })
    }
}

impl Service<(Endpoint, Request)> for Dispatcher {
    type Response = Response;
    type Error = DispatchError;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Backpressure is expressed through the queue and 429 responses
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, (endpoint, request): (Endpoint, Request)) -> Self::Future {
        self.execute(endpoint, request)
    }
}
