//! Dispatcher stress tests

use http::{Method, StatusCode, Uri};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tower_dispatch::Dispatcher;
use tower_dispatch_core::channel::channel_fn;
use tower_dispatch_core::{AimdConfig, Channel, Endpoint, Request, Response, ResponseFuture};

use super::ConcurrencyTracker;

fn endpoint() -> Endpoint {
    Endpoint::new("stress", "call", Method::GET)
}

/// Transport that sleeps a little and occasionally sheds load.
fn jittery_transport(tracker: Arc<ConcurrencyTracker>, shed_rate: f64) -> Arc<dyn Channel> {
    Arc::new(channel_fn(move |_, _| {
        let tracker = Arc::clone(&tracker);
        let (delay, shed) = {
            let mut rng = rand::rng();
            (rng.random_range(0..3u64), rng.random_bool(shed_rate))
        };
        tracker.enter();
        ResponseFuture::new(async move {
            sleep(Duration::from_millis(delay)).await;
            tracker.exit();
            let status = if shed {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::OK
            };
            Ok(Response::new(status))
        })
    }))
}

/// Test: Many concurrent submitters against a small fleet
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_high_volume() {
    let tracker = ConcurrencyTracker::new();
    let t = Arc::clone(&tracker);
    let dispatcher = Dispatcher::builder()
        .channel_name("stress")
        .channel_factory(move |_: &Uri| jittery_transport(Arc::clone(&t), 0.02))
        .limiter_config(AimdConfig::default().with_initial_limit(16).with_max_limit(32))
        .nodes(["http://a:1", "http://b:1", "http://c:1", "http://d:1"])
        .build()
        .unwrap();

    let submitters = 64;
    let per_submitter = 2_000;
    let completed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let handles: Vec<_> = (0..submitters)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let completed = Arc::clone(&completed);
            tokio::spawn(async move {
                for _ in 0..per_submitter {
                    let response = dispatcher.execute(endpoint(), Request::new()).await.unwrap();
                    assert!(response.code() == 200 || response.code() == 503);
                    completed.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = completed.load(Ordering::Relaxed);
    println!("{} requests in {:?}", total, elapsed);
    println!("Peak transport concurrency: {}", tracker.peak());
    for node in dispatcher.node_limits() {
        println!("{}: limit {}", node.uri, node.limit);
    }

    assert_eq!(total, submitters * per_submitter);
    assert_eq!(tracker.current(), 0);
    assert_eq!(dispatcher.queued(), 0);
    assert_eq!(dispatcher.running(), 0);
    assert!(dispatcher.node_limits().iter().all(|n| n.in_flight == 0));
    // Four nodes at most 32 each, plus racing acquirers.
    assert!(tracker.peak() <= 4 * 32 + 8);
}

/// Test: Bursts far beyond capacity queue and drain completely
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn stress_burst_queue_drain() {
    let tracker = ConcurrencyTracker::new();
    let t = Arc::clone(&tracker);
    let dispatcher = Dispatcher::builder()
        .channel_name("burst")
        .channel_factory(move |_: &Uri| jittery_transport(Arc::clone(&t), 0.0))
        .limiter_config(
            AimdConfig::default()
                .with_initial_limit(8)
                .with_min_limit(8)
                .with_max_limit(8),
        )
        .nodes(["http://a:1", "http://b:1"])
        .build()
        .unwrap();

    for burst in 0..10 {
        let pending: Vec<_> = (0..5_000)
            .map(|_| dispatcher.execute(endpoint(), Request::new()))
            .collect();
        assert!(dispatcher.queued() > 0, "burst {} never queued", burst);

        for future in pending {
            assert_eq!(future.await.unwrap().code(), 200);
        }
        assert_eq!(dispatcher.queued(), 0);
    }

    println!("Peak transport concurrency: {}", tracker.peak());
    assert!(tracker.peak() <= 16 + 4);
}

/// Test: Continuous node churn while traffic flows
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_node_churn() {
    let tracker = ConcurrencyTracker::new();
    let t = Arc::clone(&tracker);
    let dispatcher = Dispatcher::builder()
        .channel_name("churn")
        .channel_factory(move |_: &Uri| jittery_transport(Arc::clone(&t), 0.0))
        .nodes(["http://a:1"])
        .build()
        .unwrap();

    let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let updater = {
        let dispatcher = dispatcher.clone();
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let fleets: [&[&str]; 5] = [
                &["http://a:1", "http://b:1"],
                &["http://b:1", "http://c:1", "http://d:1"],
                &[],
                &["http://a:1"],
                &["http://d:1", "http://a:1"],
            ];
            let mut updates = 0;
            while !done.load(Ordering::Relaxed) {
                dispatcher.update_nodes(fleets[updates % fleets.len()]).unwrap();
                updates += 1;
                sleep(Duration::from_millis(1)).await;
            }
            dispatcher.update_nodes(["http://a:1"]).unwrap();
            updates
        })
    };

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                for _ in 0..1_000 {
                    let response = dispatcher.execute(endpoint(), Request::new());
                    let response = tokio::time::timeout(Duration::from_secs(30), response)
                        .await
                        .expect("request stuck in queue")
                        .unwrap();
                    assert_eq!(response.code(), 200);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    done.store(true, Ordering::Relaxed);
    let updates = updater.await.unwrap();

    println!("{} node updates during traffic", updates);
    assert_eq!(dispatcher.queued(), 0);
    assert_eq!(dispatcher.running(), 0);
    assert_eq!(tracker.current(), 0);
}
