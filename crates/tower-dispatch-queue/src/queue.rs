//! Waiting-request storage and the counters behind the queue gauges.

use crate::config::QueuedChannelConfig;
use crate::events::QueueEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tower_dispatch_core::{DispatchError, Endpoint, Request, Response};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

pub(crate) type ResultSender = oneshot::Sender<Result<Response, DispatchError>>;

/// One request waiting for delegate capacity.
pub(crate) struct Entry {
    pub(crate) id: u64,
    pub(crate) endpoint: Endpoint,
    pub(crate) request: Request,
    pub(crate) tx: ResultSender,
    pub(crate) enqueued_at: Instant,
}

impl Entry {
    /// True once the caller has dropped its response future.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// FIFO of waiting requests plus the `queued`/`running` counters.
///
/// The mutex only guards push and pop. `queued` counts requests that are
/// logically waiting, including one the drainer has popped to retry, so the
/// gauge only moves when a request is delegated, cancelled or added.
pub(crate) struct QueueState {
    config: QueuedChannelConfig,
    entries: Mutex<VecDeque<Entry>>,
    queued: AtomicUsize,
    running: AtomicUsize,
    next_id: AtomicU64,
    /// Serializes gauge publication so the last write reflects the latest
    /// counters.
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    gauges: Mutex<()>,
}

impl QueueState {
    pub(crate) fn new(config: QueuedChannelConfig) -> Self {
        let state = Self {
            config,
            entries: Mutex::new(VecDeque::new()),
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            gauges: Mutex::new(()),
        };
        state.record_gauges();
        state
    }

    pub(crate) fn config(&self) -> &QueuedChannelConfig {
        &self.config
    }

    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Appends a request, returning its id, or `None` if the queue is full.
    pub(crate) fn enqueue(
        &self,
        endpoint: Endpoint,
        request: Request,
        tx: ResultSender,
    ) -> Option<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let depth = {
            let mut entries = self.entries.lock();
            if self.queued.load(Ordering::Acquire) >= self.config.max_queue_size {
                None
            } else {
                entries.push_back(Entry {
                    id,
                    endpoint,
                    request,
                    tx,
                    enqueued_at: Instant::now(),
                });
                Some(self.queued.fetch_add(1, Ordering::AcqRel) + 1)
            }
        };

        let Some(depth) = depth else {
            self.rejected();
            return None;
        };

        #[cfg(feature = "tracing")]
        trace!(channel = %self.config.name, depth, "request queued");

        self.record_gauges();
        self.config.event_listeners.emit_with(|| QueueEvent::RequestQueued {
            channel_name: self.config.name.clone(),
            timestamp: Instant::now(),
            queue_depth: depth,
        });
        Some(id)
    }

    pub(crate) fn pop_front(&self) -> Option<Entry> {
        self.entries.lock().pop_front()
    }

    /// Returns a refused entry to the head of the queue.
    ///
    /// An entry whose caller has gone away in the meantime is discarded
    /// instead. The check happens under the lock so that it cannot race with
    /// [`remove`](Self::remove).
    pub(crate) fn requeue(&self, entry: Entry) {
        let abandoned = {
            let mut entries = self.entries.lock();
            if entry.is_abandoned() {
                Some(entry)
            } else {
                entries.push_front(entry);
                None
            }
        };
        if abandoned.is_some() {
            self.abandoned();
        }
    }

    /// Removes a waiting entry by id. Returns false if it is not waiting,
    /// because it was already delegated or is being retried by the drainer.
    pub(crate) fn remove(&self, id: u64) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            entries
                .iter()
                .position(|entry| entry.id == id)
                .and_then(|index| entries.remove(index))
        };
        match removed {
            Some(_) => {
                self.abandoned();
                true
            }
            None => false,
        }
    }

    /// Returns true if any request is waiting.
    pub(crate) fn has_waiting(&self) -> bool {
        self.queued() > 0
    }

    /// A waiting entry was discarded because its caller went away.
    pub(crate) fn abandoned(&self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
        self.cancelled();
    }

    /// A waiting entry left the queue without reaching the delegate.
    pub(crate) fn dequeued(&self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
        self.record_gauges();
    }

    /// A request was handed to the delegate after waiting for `waited`.
    pub(crate) fn started(&self, waited: Option<Duration>) {
        if waited.is_some() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
        }
        self.running.fetch_add(1, Ordering::AcqRel);
        self.record_gauges();

        let waited = waited.unwrap_or_default();

        #[cfg(feature = "tracing")]
        trace!(channel = %self.config.name, ?waited, "request delegated");

        self.config.event_listeners.emit_with(|| QueueEvent::RequestDelegated {
            channel_name: self.config.name.clone(),
            timestamp: Instant::now(),
            waited,
        });
    }

    /// A delegated request resolved or was cancelled.
    pub(crate) fn finished(&self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
        self.record_gauges();
    }

    /// A caller abandoned its request.
    pub(crate) fn cancelled(&self) {
        #[cfg(feature = "tracing")]
        trace!(channel = %self.config.name, "request cancelled by caller");

        #[cfg(feature = "metrics")]
        counter!("dispatch_requests_cancelled_total", "channel" => self.config.name.clone())
            .increment(1);

        self.record_gauges();
        self.config.event_listeners.emit_with(|| QueueEvent::RequestCancelled {
            channel_name: self.config.name.clone(),
            timestamp: Instant::now(),
        });
    }

    fn rejected(&self) {
        #[cfg(feature = "tracing")]
        debug!(
            channel = %self.config.name,
            max_queue_size = self.config.max_queue_size,
            "queue full, rejecting request"
        );

        #[cfg(feature = "metrics")]
        counter!("dispatch_requests_rejected_total", "channel" => self.config.name.clone())
            .increment(1);

        self.config.event_listeners.emit_with(|| QueueEvent::RequestRejected {
            channel_name: self.config.name.clone(),
            timestamp: Instant::now(),
            max_queue_size: self.config.max_queue_size,
        });
    }

    pub(crate) fn record_gauges(&self) {
        #[cfg(feature = "metrics")]
        {
            let _publishing = self.gauges.lock();
            gauge!("dispatch_requests_queued", "channel" => self.config.name.clone())
                .set(self.queued() as f64);
            gauge!("dispatch_requests_running", "channel" => self.config.name.clone())
                .set(self.running() as f64);
        }
    }
}
