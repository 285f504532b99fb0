//! Stress tests for tower-dispatch
//!
//! ## What We Test
//!
//! - **High volume**: Hundreds of thousands of requests
//! - **High concurrency**: Many submitting tasks on a multi-threaded runtime
//! - **State consistency**: Gauges and limiter counters return to zero
//! - **Live reload**: Node churn while requests are queued and running

pub mod dispatcher;
pub mod limiter;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Utility: Track peak concurrent operations
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn enter(&self) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}
