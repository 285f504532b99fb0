//! Limiter stress tests

use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tower_dispatch_core::{AimdConcurrencyLimiter, AimdConfig};

use super::ConcurrencyTracker;

/// Test: Permit churn from many threads keeps the counters exact
#[test]
#[ignore]
fn stress_permit_churn() {
    let limiter = Arc::new(AimdConcurrencyLimiter::new(
        AimdConfig::default().with_initial_limit(32).with_max_limit(64),
    ));
    let tracker = ConcurrencyTracker::new();
    let threads = 16;
    let iterations = 200_000;

    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let limiter = Arc::clone(&limiter);
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for i in 0..iterations {
                    if let Some(permit) = limiter.acquire() {
                        tracker.enter();
                        tracker.exit();
                        match (t + i) % 10 {
                            0 => permit.dropped(),
                            1 => permit.ignore(),
                            _ => permit.success(),
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    println!(
        "{} acquisitions across {} threads in {:?}",
        threads * iterations,
        threads,
        start.elapsed()
    );
    println!("Final limit: {}", limiter.limit());
    println!("Peak tracked: {}", tracker.peak());

    assert_eq!(limiter.in_flight(), 0);
    assert!((1..=64).contains(&limiter.limit()));
    // Racing acquirers may overshoot by at most one permit each.
    assert!(tracker.peak() <= 64 + threads);
}

/// Test: Sustained drops collapse the limit to its floor and recover
#[test]
#[ignore]
fn stress_collapse_and_recover() {
    let limiter = Arc::new(AimdConcurrencyLimiter::new(
        AimdConfig::default().with_initial_limit(1_000).with_max_limit(1_000),
    ));

    for _ in 0..500 {
        if let Some(permit) = limiter.acquire() {
            permit.dropped();
        }
    }
    assert_eq!(limiter.limit(), 1);

    // Saturate the limiter each round so successes clear the growth gate.
    let mut rounds = 0;
    while limiter.limit() < 100 {
        let permits: Vec<_> = std::iter::from_fn(|| limiter.acquire()).collect();
        assert_eq!(permits.len(), limiter.limit());
        for permit in permits {
            permit.success();
        }
        rounds += 1;
        assert!(rounds < 1_000, "limit stopped growing at {}", limiter.limit());
    }
    println!("Recovered to {} in {} rounds", limiter.limit(), rounds);

    assert_eq!(limiter.in_flight(), 0);
}
