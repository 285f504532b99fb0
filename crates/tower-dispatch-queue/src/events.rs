//! Event types for queued channels.

use std::time::{Duration, Instant};
use tower_dispatch_core::events::DispatchEvent;

/// Events emitted by a [`QueuedChannel`](crate::QueuedChannel).
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A request was refused by the delegate and appended to the queue.
    RequestQueued {
        /// Name of the channel.
        channel_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Queue depth after this request was added.
        queue_depth: usize,
    },
    /// A request was answered with 429 because the queue was full.
    RequestRejected {
        /// Name of the channel.
        channel_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Configured queue capacity.
        max_queue_size: usize,
    },
    /// A request was handed to the delegate.
    RequestDelegated {
        /// Name of the channel.
        channel_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Time spent in the queue; zero for immediately admitted requests.
        waited: Duration,
    },
    /// The caller dropped its response future before a response arrived.
    RequestCancelled {
        /// Name of the channel.
        channel_name: String,
        /// When the event occurred.
        timestamp: Instant,
    },
}

impl DispatchEvent for QueueEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::RequestQueued { .. } => "request_queued",
            QueueEvent::RequestRejected { .. } => "request_rejected",
            QueueEvent::RequestDelegated { .. } => "request_delegated",
            QueueEvent::RequestCancelled { .. } => "request_cancelled",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            QueueEvent::RequestQueued { timestamp, .. }
            | QueueEvent::RequestRejected { timestamp, .. }
            | QueueEvent::RequestDelegated { timestamp, .. }
            | QueueEvent::RequestCancelled { timestamp, .. } => *timestamp,
        }
    }

    fn channel_name(&self) -> &str {
        match self {
            QueueEvent::RequestQueued { channel_name, .. }
            | QueueEvent::RequestRejected { channel_name, .. }
            | QueueEvent::RequestDelegated { channel_name, .. }
            | QueueEvent::RequestCancelled { channel_name, .. } => channel_name,
        }
    }
}
