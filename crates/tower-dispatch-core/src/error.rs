//! Error type shared by all dispatch layers.
//!
//! Overload is deliberately *not* an error at this layer: a full queue answers
//! with a synthetic 429 [`Response`](crate::Response). Everything that does
//! reach a caller as an `Err` is one of the variants below, and the variant
//! decides how the AIMD limiter treats the outcome:
//!
//! | Variant                          | Limiter outcome |
//! |----------------------------------|-----------------|
//! | [`DispatchError::Transport`]     | dropped         |
//! | [`DispatchError::Panicked`]      | ignored         |
//! | [`DispatchError::Cancelled`]     | ignored         |
//! | [`DispatchError::Service`]       | ignored         |
//!
//! # Example
//!
//! ```rust
//! use tower_dispatch_core::DispatchError;
//! use std::io;
//!
//! let err = DispatchError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
//! assert!(err.is_transport());
//!
//! let err = DispatchError::Cancelled;
//! assert!(err.is_cancelled());
//! ```

use std::any::Any;
use std::io;

/// Boxed error type accepted from foreign services.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by dispatch channels.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The transport failed at the I/O level.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    /// A channel implementation panicked while handling the request.
    #[error("channel panicked: {0}")]
    Panicked(String),

    /// The request was cancelled before a response was produced.
    #[error("request was cancelled")]
    Cancelled,

    /// A node identifier could not be used.
    #[error("invalid node {uri:?}: {reason}")]
    InvalidNode {
        /// The rejected identifier, as supplied.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A builder was missing required configuration or had conflicting values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A wrapped service failed with an error that is not a transport failure.
    #[error("service error: {0}")]
    Service(BoxError),
}

impl DispatchError {
    /// Converts a panic payload caught with `catch_unwind` into an error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        DispatchError::Panicked(message)
    }

    /// Wraps an arbitrary service error.
    ///
    /// I/O errors are recognised and mapped to [`DispatchError::Transport`] so
    /// that they still count as overload signals.
    pub fn service(err: impl Into<BoxError>) -> Self {
        let err = err.into();
        match err.downcast::<io::Error>() {
            Ok(io) => DispatchError::Transport(*io),
            Err(other) => match other.downcast::<DispatchError>() {
                Ok(dispatch) => *dispatch,
                Err(other) => DispatchError::Service(other),
            },
        }
    }

    /// Returns true if this is an I/O-level transport failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, DispatchError::Transport(_))
    }

    /// Returns true if the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled)
    }

    /// Returns true if a channel implementation panicked.
    pub fn is_panic(&self) -> bool {
        matches!(self, DispatchError::Panicked(_))
    }

    /// Returns true for configuration and node validation errors.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            DispatchError::Config(_) | DispatchError::InvalidNode { .. }
        )
    }
}
