//! Adapter running a [`BlockingChannel`] on Tokio's blocking pool.

use crate::cancel::CancellationFlag;
use crate::channel::BlockingChannel;
use pin_project_lite::pin_project;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tower_dispatch_core::{Channel, DispatchError, Endpoint, Request, Response, ResponseFuture};

#[cfg(feature = "tracing")]
use tracing::debug;

/// Turns a [`BlockingChannel`] into an asynchronous [`Channel`].
///
/// Each call runs on the runtime's blocking thread pool. Dropping the
/// returned future raises the call's [`CancellationFlag`]; a response that
/// arrives after that is discarded.
pub struct BlockingChannelAdapter<B> {
    channel: Arc<B>,
    handle: Option<Handle>,
}

impl<B: BlockingChannel> BlockingChannelAdapter<B> {
    /// Creates an adapter that spawns onto the runtime current at each call.
    pub fn new(channel: B) -> Self {
        Self {
            channel: Arc::new(channel),
            handle: None,
        }
    }

    /// Creates an adapter that always spawns onto `handle`.
    pub fn with_handle(channel: B, handle: Handle) -> Self {
        Self {
            channel: Arc::new(channel),
            handle: Some(handle),
        }
    }

    /// Returns the wrapped blocking channel.
    pub fn get_ref(&self) -> &B {
        &self.channel
    }

    fn handle(&self) -> Result<Handle, DispatchError> {
        match &self.handle {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| {
                DispatchError::Config(
                    "BlockingChannelAdapter used outside a Tokio runtime".to_string(),
                )
            }),
        }
    }
}

impl<B> Clone for BlockingChannelAdapter<B> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            handle: self.handle.clone(),
        }
    }
}

impl<B> fmt::Debug for BlockingChannelAdapter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingChannelAdapter")
            .field("handle", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl<B: BlockingChannel> Channel for BlockingChannelAdapter<B> {
    fn execute(&self, endpoint: Endpoint, request: Request) -> ResponseFuture {
        let handle = match self.handle() {
            Ok(handle) => handle,
            Err(err) => return ResponseFuture::failed(err),
        };

        let flag = CancellationFlag::new();
        let channel = Arc::clone(&self.channel);
        let worker_flag = flag.clone();
        let join = handle.spawn_blocking(move || {
            if worker_flag.is_cancelled() {
                return None;
            }
            let result = {
                let _entered = worker_flag.enter();
                channel.execute(&endpoint, request)
            };
            if worker_flag.is_cancelled() {
                #[cfg(feature = "tracing")]
                debug!(endpoint = %endpoint, "discarding result of cancelled blocking call");
                // Closing the response releases whatever the transport holds.
                drop(result);
                return None;
            }
            Some(result)
        });

        ResponseFuture::new(BlockingResponse {
            join,
            cancel: CancelOnDrop { flag: Some(flag) },
        })
    }
}

struct CancelOnDrop {
    flag: Option<CancellationFlag>,
}

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.flag = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(flag) = self.flag.take() {
            flag.cancel();
        }
    }
}

pin_project! {
    /// Future for a call running on the blocking pool.
    struct BlockingResponse {
        #[pin]
        join: JoinHandle<Option<io::Result<Response>>>,
        cancel: CancelOnDrop,
    }
}

impl Future for BlockingResponse {
    type Output = Result<Response, DispatchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let joined = ready!(this.join.poll(cx));
        this.cancel.disarm();
        Poll::Ready(map_joined(joined))
    }
}

fn map_joined(joined: Result<Option<io::Result<Response>>, JoinError>) -> Result<Response, DispatchError> {
    match joined {
        Ok(Some(Ok(response))) => Ok(response),
        Ok(Some(Err(err))) => Err(DispatchError::Transport(err)),
        Ok(None) => Err(DispatchError::Cancelled),
        Err(err) if err.is_panic() => Err(DispatchError::from_panic(err.into_panic())),
        Err(_) => Err(DispatchError::Cancelled),
    }
}
