//! Queued channel implementation.

use crate::config::QueuedChannelConfig;
use crate::future::{QueuedResponse, Ticket};
use crate::queue::{QueueState, ResultSender};
use futures::future::{self, Either};
use futures::FutureExt;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tower_dispatch_core::{
    Channel, ChannelReadySignal, DispatchError, Endpoint, Executor, LimitedChannel, Request,
    Response, ResponseFuture,
};
use tower_service::Service;

#[cfg(feature = "tracing")]
use tracing::{trace, warn};

/// A [`Channel`] that queues requests its [`LimitedChannel`] delegate refuses.
///
/// Every submission is first offered to the delegate. Refused requests wait in a
/// FIFO queue and are retried, head first, whenever a delegated request
/// completes or the delegate signals readiness. A refused head stops the
/// drain, so waiting requests are released strictly in submission order.
///
/// Requests admitted on their first attempt may overtake requests that are
/// already waiting. Waiting requests never hold back capacity that a fresh
/// request can use.
///
/// Cloning is cheap; clones share the queue.
pub struct QueuedChannel<C> {
    shared: Arc<Shared<C>>,
}

struct Shared<C> {
    this: Weak<Shared<C>>,
    delegate: C,
    state: Arc<QueueState>,
    executor: Arc<dyn Executor>,
    /// Number of drain triggers not yet served; non-zero while a drainer runs.
    drain_requests: AtomicUsize,
    /// Bumped on every completion and readiness signal.
    epoch: AtomicU64,
}

impl<C: LimitedChannel> QueuedChannel<C> {
    /// Wraps `delegate` with default settings: unbounded queue, driven on
    /// the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(delegate: C) -> Self {
        Self::with_config(delegate, QueuedChannelConfig::default())
    }

    /// Wraps `delegate` with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if no executor was configured and this is called outside a
    /// Tokio runtime.
    pub fn with_config(delegate: C, config: QueuedChannelConfig) -> Self {
        let executor = config
            .executor
            .clone()
            .unwrap_or_else(|| Arc::new(tokio::runtime::Handle::current()));
        let shared = Arc::new_cyclic(|this| Shared {
            this: this.clone(),
            delegate,
            state: Arc::new(QueueState::new(config)),
            executor,
            drain_requests: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
        });

        let listener: Weak<dyn ChannelReadySignal> = shared.this.clone();
        shared.delegate.add_ready_listener(listener);
        Self { shared }
    }

    /// Submits a request.
    ///
    /// Never fails synchronously. The returned future resolves with the
    /// delegate's response, a synthetic 429 response if the queue is full,
    /// or [`DispatchError::Panicked`] if the delegate panicked.
    pub fn execute(&self, endpoint: Endpoint, request: Request) -> ResponseFuture {
        self.shared.execute(endpoint, request)
    }

    /// Number of requests waiting for capacity.
    pub fn queued(&self) -> usize {
        self.shared.state.queued()
    }

    /// Number of delegated requests that have not resolved yet.
    pub fn running(&self) -> usize {
        self.shared.state.running()
    }

    /// Returns the channel name.
    pub fn name(&self) -> &str {
        self.shared.state.config().name()
    }

    /// Returns the configured queue capacity.
    pub fn max_queue_size(&self) -> usize {
        self.shared.state.config().max_queue_size()
    }

    /// Returns the wrapped delegate.
    pub fn delegate(&self) -> &C {
        &self.shared.delegate
    }

    /// Attempts to move waiting requests to the delegate.
    ///
    /// Drains also happen automatically on completions and readiness signals;
    /// this is for delegates whose capacity changes by other means.
    pub fn drain(&self) {
        self.shared.signal();
    }
}

impl<C> Clone for QueuedChannel<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C> fmt::Debug for QueuedChannel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedChannel")
            .field("name", &self.shared.state.config().name())
            .field("queued", &self.shared.state.queued())
            .field("running", &self.shared.state.running())
            .finish()
    }
}

impl<C: LimitedChannel> Channel for QueuedChannel<C> {
    fn execute(&self, endpoint: Endpoint, request: Request) -> ResponseFuture {
        self.shared.execute(endpoint, request)
    }
}

impl<C: LimitedChannel> Service<(Endpoint, Request)> for QueuedChannel<C> {
    type Response = Response;
    type Error = DispatchError;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Backpressure is expressed through the queue and 429 responses
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, (endpoint, request): (Endpoint, Request)) -> Self::Future {
        self.shared.execute(endpoint, request)
    }
}

impl<C: LimitedChannel> ChannelReadySignal for Shared<C> {
    fn on_channel_ready(&self) {
        self.signal();
    }
}

impl<C: LimitedChannel> Shared<C> {
    fn execute(&self, endpoint: Endpoint, request: Request) -> ResponseFuture {
        let epoch = self.epoch.load(Ordering::SeqCst);

        match self.try_delegate(&endpoint, &request) {
            Ok(Some(future)) => {
                let (tx, rx) = oneshot::channel();
                self.run(future, tx, None);
                // Admission proves there is spare capacity for waiting requests
                if self.state.has_waiting() {
                    self.drain();
                }
                return ResponseFuture::new(QueuedResponse::running(rx));
            }
            Ok(None) => {}
            Err(error) => return ResponseFuture::failed(error),
        }

        let (tx, rx) = oneshot::channel();
        let Some(id) = self.state.enqueue(endpoint, request, tx) else {
            return ResponseFuture::response(Response::too_many_requests());
        };

        // Capacity freed between our attempt and the enqueue would otherwise
        // never be offered to this request.
        if self.epoch.load(Ordering::SeqCst) != epoch {
            self.drain();
        }

        ResponseFuture::new(QueuedResponse::queued(
            rx,
            Ticket {
                id,
                state: Arc::downgrade(&self.state),
            },
        ))
    }

    fn try_delegate(
        &self,
        endpoint: &Endpoint,
        request: &Request,
    ) -> Result<Option<ResponseFuture>, DispatchError> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.delegate.maybe_execute(endpoint, request)
        }))
        .map_err(|payload| {
            let error = DispatchError::from_panic(payload);

            #[cfg(feature = "tracing")]
            warn!(
                channel = %self.state.config().name(),
                %endpoint,
                error = %error,
                "delegate panicked in maybe_execute"
            );

            error
        })
    }

    /// Capacity may have changed: record it and drain.
    fn signal(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.drain();
    }

    /// Runs drain passes until no trigger arrived during the last one.
    ///
    /// Only one thread drains at a time. A trigger that arrives while another
    /// thread is draining is folded into that drainer's next pass.
    fn drain(&self) {
        if self.drain_requests.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        loop {
            let observed = self.drain_requests.load(Ordering::Acquire);
            self.drain_pass();
            if self
                .drain_requests
                .compare_exchange(observed, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
    }

    fn drain_pass(&self) {
        while let Some(entry) = self.state.pop_front() {
            if entry.is_abandoned() {
                self.state.abandoned();
                continue;
            }

            match self.try_delegate(&entry.endpoint, &entry.request) {
                Ok(Some(future)) => {
                    let waited = entry.enqueued_at.elapsed();
                    self.run(future, entry.tx, Some(waited));
                }
                Ok(None) => {
                    #[cfg(feature = "tracing")]
                    trace!(
                        channel = %self.state.config().name(),
                        queued = self.state.queued(),
                        "delegate refused queue head"
                    );

                    self.state.requeue(entry);
                    return;
                }
                Err(error) => {
                    self.state.dequeued();
                    let _ = entry.tx.send(Err(error));
                }
            }
        }
    }

    /// Drives an admitted request on the executor.
    ///
    /// Completion bookkeeping happens before the caller is woken, so the
    /// caller observes the gauges and any drained successors already updated.
    fn run(&self, response: ResponseFuture, mut tx: ResultSender, waited: Option<Duration>) {
        self.state.started(waited);

        let Some(shared) = self.this.upgrade() else {
            // Callers always reach us through a live Arc
            self.state.finished();
            let _ = tx.send(Err(DispatchError::Cancelled));
            return;
        };

        self.executor.spawn_detached(Box::pin(async move {
            let outcome = {
                let call = AssertUnwindSafe(response).catch_unwind();
                let closed = tx.closed();
                futures::pin_mut!(closed);
                match future::select(call, closed).await {
                    Either::Left((result, _)) => Some(result.unwrap_or_else(|payload| {
                        Err(DispatchError::from_panic(payload))
                    })),
                    // Dropping the delegate future here cancels the call
                    Either::Right(_) => None,
                }
            };

            shared.state.finished();
            if outcome.is_none() {
                shared.state.cancelled();
            }

            #[cfg(feature = "tracing")]
            trace!(
                channel = %shared.state.config().name(),
                cancelled = outcome.is_none(),
                "delegated request finished"
            );

            shared.signal();
            if let Some(result) = outcome {
                let _ = tx.send(result);
            }
        }));
    }
}
