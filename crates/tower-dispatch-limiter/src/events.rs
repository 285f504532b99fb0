//! Event types for concurrency-limited channels.

use std::time::Instant;
use tower_dispatch_core::aimd::Outcome;
use tower_dispatch_core::events::DispatchEvent;

/// Events emitted by a [`ConcurrencyLimitedChannel`](crate::ConcurrencyLimitedChannel).
#[derive(Debug, Clone)]
pub enum LimiterEvent {
    /// A request was refused because the node was at its concurrency limit.
    PermitRefused {
        /// Name of the owning channel.
        channel_name: String,
        /// The node this limiter guards.
        node: String,
        /// When the event occurred.
        timestamp: Instant,
        /// The limit at the time of refusal.
        limit: usize,
    },
    /// Resolving a permit moved the concurrency limit.
    LimitChanged {
        /// Name of the owning channel.
        channel_name: String,
        /// The node this limiter guards.
        node: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Limit before the permit was resolved.
        previous: usize,
        /// Limit after the permit was resolved.
        limit: usize,
        /// How the permit was resolved.
        outcome: Outcome,
    },
    /// The transport panicked while starting a request.
    TransportPanicked {
        /// Name of the owning channel.
        channel_name: String,
        /// The node this limiter guards.
        node: String,
        /// When the event occurred.
        timestamp: Instant,
    },
}

impl DispatchEvent for LimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LimiterEvent::PermitRefused { .. } => "permit_refused",
            LimiterEvent::LimitChanged { .. } => "limit_changed",
            LimiterEvent::TransportPanicked { .. } => "transport_panicked",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            LimiterEvent::PermitRefused { timestamp, .. }
            | LimiterEvent::LimitChanged { timestamp, .. }
            | LimiterEvent::TransportPanicked { timestamp, .. } => *timestamp,
        }
    }

    fn channel_name(&self) -> &str {
        match self {
            LimiterEvent::PermitRefused { channel_name, .. }
            | LimiterEvent::LimitChanged { channel_name, .. }
            | LimiterEvent::TransportPanicked { channel_name, .. } => channel_name,
        }
    }

    fn node(&self) -> Option<&str> {
        match self {
            LimiterEvent::PermitRefused { node, .. }
            | LimiterEvent::LimitChanged { node, .. }
            | LimiterEvent::TransportPanicked { node, .. } => Some(node),
        }
    }
}
