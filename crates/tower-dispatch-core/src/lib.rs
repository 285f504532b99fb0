//! Core infrastructure for tower-dispatch.
//!
//! This crate provides the building blocks shared by every dispatch layer:
//! - Message types ([`Endpoint`], [`Request`], [`Response`])
//! - The [`Channel`] and [`LimitedChannel`] capabilities and [`ResponseFuture`]
//! - Readiness signalling between limited channels and queues
//! - The lock-free AIMD concurrency limiter and its [`Permit`]s
//! - The [`DispatchError`] type and the event system for observability

pub mod aimd;
pub mod channel;
pub mod error;
pub mod events;
pub mod executor;
pub mod message;
pub mod ready;

pub use aimd::{AimdConcurrencyLimiter, AimdConfig, Outcome, Permit};
pub use channel::{Channel, LimitedChannel, ResponseFuture};
pub use error::DispatchError;
pub use events::{DispatchEvent, EventListener, EventListeners, FnListener};
pub use executor::Executor;
pub use message::{Endpoint, Request, Response};
pub use ready::{ChannelReadySignal, ReadyListeners};
