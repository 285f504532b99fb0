//! Lock-free AIMD (Additive Increase Multiplicative Decrease) concurrency limiter.
//!
//! A dispatching request tries to [`acquire`](AimdConcurrencyLimiter::acquire) a
//! [`Permit`] and resolves it once the corresponding response is known:
//!
//! - **Additive increase**: a successful request raises the limit by one, but
//!   only if the permit was issued while at least half of the limit was in
//!   use. Bursts that never approach the ceiling do not inflate it.
//! - **Multiplicative decrease**: a dropped request (QoS status, server error,
//!   I/O failure) multiplies the limit by the backoff ratio, truncating.
//! - **Ignore**: uninformative outcomes (cancellation, client bugs) only free
//!   the slot.
//!
//! Both counters are plain atomics and the limit update is a CAS loop, so the
//! hot path never takes a lock.
//!
//! # Example
//!
//! ```rust
//! use tower_dispatch_core::aimd::{AimdConcurrencyLimiter, AimdConfig};
//!
//! let limiter = AimdConcurrencyLimiter::new(AimdConfig::default().with_initial_limit(2));
//!
//! let first = limiter.acquire().unwrap();
//! let second = limiter.acquire().unwrap();
//! assert!(limiter.acquire().is_none());
//!
//! // Issued at full utilisation, so success grows the limit.
//! second.success();
//! assert_eq!(limiter.limit(), 3);
//!
//! first.dropped();
//! assert_eq!(limiter.limit(), 2); // 3 * 0.9 = 2.7 -> 2
//! assert_eq!(limiter.in_flight(), 0);
//! ```

use crate::error::DispatchError;
use crate::message::Response;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default starting limit for a fresh limiter.
pub const DEFAULT_INITIAL_LIMIT: usize = 20;
/// Default floor for the limit.
pub const DEFAULT_MIN_LIMIT: usize = 1;
/// Default ceiling for the limit; effectively unlimited while leaving headroom
/// against overflow.
pub const DEFAULT_MAX_LIMIT: usize = (i32::MAX / 2) as usize;
/// Default multiplicative decrease applied on a dropped request.
pub const DEFAULT_BACKOFF_RATIO: f64 = 0.9;
/// Default utilisation a permit must have been issued at for success to grow
/// the limit.
pub const DEFAULT_INCREASE_THRESHOLD: f64 = 0.5;

/// Configuration for an [`AimdConcurrencyLimiter`].
#[derive(Debug, Clone)]
pub struct AimdConfig {
    /// Initial limit value.
    pub initial_limit: usize,
    /// Minimum limit (floor).
    pub min_limit: usize,
    /// Maximum limit (ceiling).
    pub max_limit: usize,
    /// Factor to multiply the limit by on a dropped request.
    /// Should be between 0.0 and 1.0.
    pub backoff_ratio: f64,
    /// Fraction of the limit that must have been in flight when a permit was
    /// issued for its success to increase the limit.
    pub increase_threshold: f64,
}

impl Default for AimdConfig {
    fn default() -> Self {
        Self {
            initial_limit: DEFAULT_INITIAL_LIMIT,
            min_limit: DEFAULT_MIN_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            backoff_ratio: DEFAULT_BACKOFF_RATIO,
            increase_threshold: DEFAULT_INCREASE_THRESHOLD,
        }
    }
}

impl AimdConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial limit.
    pub fn with_initial_limit(mut self, limit: usize) -> Self {
        self.initial_limit = limit;
        self
    }

    /// Set the minimum limit (floor).
    pub fn with_min_limit(mut self, limit: usize) -> Self {
        self.min_limit = limit;
        self
    }

    /// Set the maximum limit (ceiling).
    pub fn with_max_limit(mut self, limit: usize) -> Self {
        self.max_limit = limit;
        self
    }

    /// Set the multiplicative decrease ratio.
    ///
    /// Should be between 0.0 and 1.0. For example, 0.9 shrinks the limit by
    /// ten percent on every dropped request.
    pub fn with_backoff_ratio(mut self, ratio: f64) -> Self {
        self.backoff_ratio = ratio;
        self
    }

    /// Set the utilisation gate for additive increase.
    pub fn with_increase_threshold(mut self, threshold: f64) -> Self {
        self.increase_threshold = threshold;
        self
    }

    /// Checks that the configuration describes a usable limiter.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.min_limit == 0 {
            return Err(DispatchError::Config("min_limit must be at least 1".into()));
        }
        if self.min_limit > self.max_limit {
            return Err(DispatchError::Config(format!(
                "min_limit ({}) exceeds max_limit ({})",
                self.min_limit, self.max_limit
            )));
        }
        if !(self.backoff_ratio > 0.0 && self.backoff_ratio < 1.0) {
            return Err(DispatchError::Config(format!(
                "backoff_ratio must be in (0, 1), got {}",
                self.backoff_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.increase_threshold) {
            return Err(DispatchError::Config(format!(
                "increase_threshold must be in [0, 1], got {}",
                self.increase_threshold
            )));
        }
        Ok(())
    }

    fn clamped_initial_limit(&self) -> usize {
        self.initial_limit.max(self.min_limit).min(self.max_limit)
    }

    fn increased(&self, original_limit: usize, in_flight_snapshot: usize) -> usize {
        if in_flight_snapshot as f64 >= original_limit as f64 * self.increase_threshold {
            original_limit.saturating_add(1).min(self.max_limit)
        } else {
            original_limit
        }
    }

    fn decreased(&self, original_limit: usize) -> usize {
        let decreased = (original_limit as f64 * self.backoff_ratio) as usize;
        decreased.max(self.min_limit)
    }
}

/// How a resolved permit affected the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Completed without an overload signal; may increase the limit.
    Success,
    /// Completed with an overload signal; decreases the limit.
    Dropped,
    /// Uninformative; only frees the slot.
    Ignored,
}

impl Outcome {
    /// Classifies the result of a response-producing call.
    ///
    /// QoS and server-error responses and transport I/O failures count as
    /// dropped, any other response as success, and any other failure
    /// (cancellation, panics, client errors) is ignored.
    pub fn classify(result: &Result<Response, DispatchError>) -> Self {
        match result {
            Ok(response) if response.is_qos_status() || response.is_server_error() => {
                Outcome::Dropped
            }
            Ok(_) => Outcome::Success,
            Err(DispatchError::Transport(_)) => Outcome::Dropped,
            Err(_) => Outcome::Ignored,
        }
    }
}

struct LimiterState {
    limit: AtomicUsize,
    in_flight: AtomicUsize,
    config: AimdConfig,
}

impl LimiterState {
    fn update_limit(&self, f: impl Fn(usize) -> usize) -> usize {
        match self
            .limit
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = f(current);
                (next != current).then_some(next)
            }) {
            Ok(previous) => f(previous),
            Err(unchanged) => unchanged,
        }
    }
}

/// Thread-safe AIMD concurrency limiter for one destination.
pub struct AimdConcurrencyLimiter {
    state: Arc<LimiterState>,
}

impl AimdConcurrencyLimiter {
    /// Create a new limiter with the given configuration.
    ///
    /// The initial limit is clamped into `[min_limit, max_limit]`.
    pub fn new(config: AimdConfig) -> Self {
        let initial = config.clamped_initial_limit();
        Self {
            state: Arc::new(LimiterState {
                limit: AtomicUsize::new(initial),
                in_flight: AtomicUsize::new(0),
                config,
            }),
        }
    }

    /// Returns a new permit if fewer than [`limit`](Self::limit) permits are
    /// currently in flight.
    ///
    /// Never blocks. The caller must eventually resolve the permit; dropping
    /// it unresolved counts as [`Permit::ignore`].
    pub fn acquire(&self) -> Option<Permit> {
        let current = self.state.in_flight.load(Ordering::Acquire);
        if current >= self.limit() {
            return None;
        }
        let snapshot = self.state.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        Some(Permit {
            state: Arc::clone(&self.state),
            in_flight_snapshot: snapshot,
            resolved: false,
        })
    }

    /// Returns the current concurrency limit.
    pub fn limit(&self) -> usize {
        self.state.limit.load(Ordering::Acquire)
    }

    /// Returns the number of permits acquired but not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::Acquire)
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &AimdConfig {
        &self.state.config
    }
}

impl Default for AimdConcurrencyLimiter {
    fn default() -> Self {
        Self::new(AimdConfig::default())
    }
}

impl fmt::Debug for AimdConcurrencyLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AimdConcurrencyLimiter")
            .field("limit", &self.limit())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// A single-use admission token for one in-flight request.
///
/// Resolving consumes the permit, so a permit can only be resolved once.
/// A permit dropped without being resolved is treated as [`Permit::ignore`].
#[must_use = "dropping a permit immediately releases it as ignored"]
pub struct Permit {
    state: Arc<LimiterState>,
    in_flight_snapshot: usize,
    resolved: bool,
}

impl Permit {
    /// Number of permits in flight (including this one) when it was issued.
    pub fn in_flight_snapshot(&self) -> usize {
        self.in_flight_snapshot
    }

    /// The request completed without an overload signal.
    pub fn success(mut self) {
        self.resolve(Outcome::Success);
    }

    /// The request completed with an overload signal.
    pub fn dropped(mut self) {
        self.resolve(Outcome::Dropped);
    }

    /// The outcome carries no information about server load.
    pub fn ignore(mut self) {
        self.resolve(Outcome::Ignored);
    }

    /// Resolves the permit according to [`Outcome::classify`].
    pub fn on_result(mut self, result: &Result<Response, DispatchError>) -> Outcome {
        let outcome = Outcome::classify(result);
        self.resolve(outcome);
        outcome
    }

    fn resolve(&mut self, outcome: Outcome) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        self.state.in_flight.fetch_sub(1, Ordering::AcqRel);

        let snapshot = self.in_flight_snapshot;
        let config = &self.state.config;
        let _limit = match outcome {
            Outcome::Success => self
                .state
                .update_limit(|original| config.increased(original, snapshot)),
            Outcome::Dropped => self.state.update_limit(|original| config.decreased(original)),
            Outcome::Ignored => return,
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(?outcome, limit = _limit, snapshot, "aimd permit resolved");
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.resolve(Outcome::Ignored);
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("in_flight_snapshot", &self.in_flight_snapshot)
            .finish()
    }
}
