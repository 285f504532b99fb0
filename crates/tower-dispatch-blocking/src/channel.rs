//! The blocking transport capability.

use std::io;
use tower_dispatch_core::{Endpoint, Request, Response};

/// A transport whose calls block the calling thread until a response is
/// available.
///
/// Implementations may poll [`is_cancelled`](crate::is_cancelled) to stop
/// early once the caller has gone away.
pub trait BlockingChannel: Send + Sync + 'static {
    /// Executes `request` against `endpoint`, blocking until it completes.
    fn execute(&self, endpoint: &Endpoint, request: Request) -> io::Result<Response>;
}

impl<F> BlockingChannel for F
where
    F: Fn(&Endpoint, Request) -> io::Result<Response> + Send + Sync + 'static,
{
    fn execute(&self, endpoint: &Endpoint, request: Request) -> io::Result<Response> {
        self(endpoint, request)
    }
}
