//! The per-node limited channel.

use crate::config::ConcurrencyLimitedChannelConfig;
use crate::events::LimiterEvent;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tower_dispatch_core::aimd::{AimdConcurrencyLimiter, Outcome, Permit};
use tower_dispatch_core::{
    Channel, ChannelReadySignal, DispatchError, Endpoint, LimitedChannel, ReadyListeners, Request,
    Response, ResponseFuture,
};

#[cfg(feature = "metrics")]
use metrics::gauge;

#[cfg(feature = "tracing")]
use tracing::{debug, trace, warn};

/// A [`LimitedChannel`] that guards one node's transport with an AIMD limiter.
///
/// Admission is a non-blocking permit acquisition. The transport is only
/// invoked once a permit is held, and the permit is resolved from the
/// response the transport eventually produces. Cloning is cheap and clones
/// share the same limiter.
#[derive(Clone)]
pub struct ConcurrencyLimitedChannel {
    shared: Arc<Shared>,
}

struct Shared {
    config: ConcurrencyLimitedChannelConfig,
    transport: Arc<dyn Channel>,
    limiter: AimdConcurrencyLimiter,
    ready: ReadyListeners,
    /// Set once the node has been removed from its dispatcher.
    retired: AtomicBool,
    /// Serializes gauge publication so the last write reflects the latest state.
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    gauges: Mutex<()>,
}

impl ConcurrencyLimitedChannel {
    /// Wraps `transport` for `node` with default limiter settings.
    pub fn new(node: impl Into<String>, transport: Arc<dyn Channel>) -> Self {
        let config = ConcurrencyLimitedChannelConfig {
            name: "limited-channel".to_string(),
            node: node.into(),
            limiter: Default::default(),
            event_listeners: Default::default(),
        };
        Self::with_config(config, transport)
    }

    /// Wraps `transport` using a prepared configuration.
    pub fn with_config(
        config: ConcurrencyLimitedChannelConfig,
        transport: Arc<dyn Channel>,
    ) -> Self {
        let limiter = AimdConcurrencyLimiter::new(config.limiter.clone());
        let shared = Arc::new(Shared {
            config,
            transport,
            limiter,
            ready: ReadyListeners::new(),
            retired: AtomicBool::new(false),
            gauges: Mutex::new(()),
        });
        shared.record_gauges();
        Self { shared }
    }

    /// Returns the owning channel's name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Returns the node identifier.
    pub fn node(&self) -> &str {
        &self.shared.config.node
    }

    /// Returns the current concurrency limit.
    pub fn limit(&self) -> usize {
        self.shared.limiter.limit()
    }

    /// Returns the number of requests currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.shared.limiter.in_flight()
    }

    /// Returns the underlying limiter.
    pub fn limiter(&self) -> &AimdConcurrencyLimiter {
        &self.shared.limiter
    }

    /// Marks the node as no longer configured.
    ///
    /// The channel keeps serving requests already admitted, but both node
    /// gauges drop to zero and stop tracking it, so a later channel for the
    /// same node owns the series alone.
    pub fn retire(&self) {
        if self.shared.retired.swap(true, Ordering::AcqRel) {
            return;
        }

        #[cfg(feature = "tracing")]
        debug!(
            channel = %self.shared.config.name,
            node = %self.shared.config.node,
            in_flight = self.in_flight(),
            "node retired"
        );

        #[cfg(feature = "metrics")]
        {
            let _publishing = self.shared.gauges.lock();
            self.shared.set_gauges(0, 0);
        }
    }

    /// Returns true once [`retire`](Self::retire) has been called.
    pub fn is_retired(&self) -> bool {
        self.shared.retired.load(Ordering::Acquire)
    }
}

impl LimitedChannel for ConcurrencyLimitedChannel {
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture> {
        let shared = &self.shared;
        let Some(permit) = shared.limiter.acquire() else {
            shared.refused();
            return None;
        };
        shared.record_gauges();

        let mut guard = PermitGuard {
            permit: Some(permit),
            shared: Arc::clone(shared),
        };
        let call = panic::catch_unwind(AssertUnwindSafe(|| {
            shared.transport.execute(endpoint.clone(), request.clone())
        }));

        match call {
            Ok(future) => Some(ResponseFuture::new(async move {
                let result = future.await;
                guard.complete(&result);
                result
            })),
            Err(payload) => {
                let error = DispatchError::from_panic(payload);

                #[cfg(feature = "tracing")]
                warn!(
                    channel = %shared.config.name,
                    node = %shared.config.node,
                    %endpoint,
                    error = %error,
                    "transport panicked while starting request"
                );

                shared.config.event_listeners.emit_with(|| LimiterEvent::TransportPanicked {
                    channel_name: shared.config.name.clone(),
                    node: shared.config.node.clone(),
                    timestamp: Instant::now(),
                });
                drop(guard);
                Some(ResponseFuture::failed(error))
            }
        }
    }

    fn add_ready_listener(&self, listener: Weak<dyn ChannelReadySignal>) {
        self.shared.ready.add(listener);
    }
}

impl fmt::Debug for ConcurrencyLimitedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyLimitedChannel")
            .field("name", &self.shared.config.name)
            .field("node", &self.shared.config.node)
            .field("limiter", &self.shared.limiter)
            .finish()
    }
}

impl Shared {
    fn refused(&self) {
        let limit = self.limiter.limit();

        #[cfg(feature = "tracing")]
        trace!(
            channel = %self.config.name,
            node = %self.config.node,
            limit,
            "node at concurrency limit"
        );

        self.config.event_listeners.emit_with(|| LimiterEvent::PermitRefused {
            channel_name: self.config.name.clone(),
            node: self.config.node.clone(),
            timestamp: Instant::now(),
            limit,
        });
    }

    fn released(&self, previous: usize, outcome: Outcome) {
        let limit = self.limiter.limit();
        if limit != previous {
            #[cfg(feature = "tracing")]
            debug!(
                channel = %self.config.name,
                node = %self.config.node,
                previous,
                limit,
                ?outcome,
                "concurrency limit changed"
            );

            self.config.event_listeners.emit_with(|| LimiterEvent::LimitChanged {
                channel_name: self.config.name.clone(),
                node: self.config.node.clone(),
                timestamp: Instant::now(),
                previous,
                limit,
                outcome,
            });
        }
        self.record_gauges();
        self.ready.notify();
    }

    fn record_gauges(&self) {
        #[cfg(feature = "metrics")]
        {
            let _publishing = self.gauges.lock();
            if !self.retired.load(Ordering::Acquire) {
                self.set_gauges(self.limiter.limit(), self.limiter.in_flight());
            }
        }
    }

    #[cfg(feature = "metrics")]
    fn set_gauges(&self, limit: usize, in_flight: usize) {
        gauge!(
            "dispatch_node_concurrency_limit",
            "channel" => self.config.name.clone(),
            "node" => self.config.node.clone()
        )
        .set(limit as f64);
        gauge!(
            "dispatch_node_requests_in_flight",
            "channel" => self.config.name.clone(),
            "node" => self.config.node.clone()
        )
        .set(in_flight as f64);
    }
}

/// Owns a permit for the lifetime of one admitted request.
///
/// Dropping the guard before `complete` (cancellation, or a panic while the
/// transport future is polled) resolves the permit as ignored.
struct PermitGuard {
    permit: Option<Permit>,
    shared: Arc<Shared>,
}

impl PermitGuard {
    fn complete(&mut self, result: &Result<Response, DispatchError>) {
        if let Some(permit) = self.permit.take() {
            let previous = self.shared.limiter.limit();
            let outcome = permit.on_result(result);
            self.shared.released(previous, outcome);
        }
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            let previous = self.shared.limiter.limit();
            permit.ignore();
            self.shared.released(previous, Outcome::Ignored);
        }
    }
}
