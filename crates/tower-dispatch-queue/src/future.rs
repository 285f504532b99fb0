//! Response future handed to callers of a queued channel.

use crate::queue::QueueState;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tower_dispatch_core::{DispatchError, Response};

/// Identifies a request that may still be waiting in the queue.
pub(crate) struct Ticket {
    pub(crate) id: u64,
    pub(crate) state: Weak<QueueState>,
}

pin_project! {
    /// Future returned by [`QueuedChannel::execute`](crate::QueuedChannel::execute).
    ///
    /// Dropping it before it resolves cancels the request: a waiting request
    /// is removed from the queue, a delegated one has its delegate future
    /// dropped by the task driving it.
    pub(crate) struct QueuedResponse {
        #[pin]
        rx: oneshot::Receiver<Result<Response, DispatchError>>,
        ticket: Option<Ticket>,
    }

    impl PinnedDrop for QueuedResponse {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(ticket) = this.ticket.take() {
                // Close first so a drainer that misses the entry below sees
                // the closed channel when it tries to requeue it.
                this.rx.get_mut().close();
                if let Some(state) = ticket.state.upgrade() {
                    state.remove(ticket.id);
                }
            }
        }
    }
}

impl QueuedResponse {
    /// A request that was delegated immediately.
    pub(crate) fn running(rx: oneshot::Receiver<Result<Response, DispatchError>>) -> Self {
        Self { rx, ticket: None }
    }

    /// A request that is waiting in the queue.
    pub(crate) fn queued(
        rx: oneshot::Receiver<Result<Response, DispatchError>>,
        ticket: Ticket,
    ) -> Self {
        Self {
            rx,
            ticket: Some(ticket),
        }
    }
}

impl Future for QueuedResponse {
    type Output = Result<Response, DispatchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.rx.poll(cx) {
            Poll::Ready(result) => {
                this.ticket.take();
                Poll::Ready(result.unwrap_or(Err(DispatchError::Cancelled)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
