//! Queue metrics regression tests

use super::helpers::*;
use http::{Method, StatusCode};
use serial_test::serial;
use tower_dispatch_core::{Endpoint, LimitedChannel, Request, ResponseFuture};
use tower_dispatch_queue::{QueuedChannel, QueuedChannelConfig};

/// Delegate without capacity, so every request waits.
struct Closed;

impl LimitedChannel for Closed {
    fn maybe_execute(&self, _: &Endpoint, _: &Request) -> Option<ResponseFuture> {
        None
    }
}

#[tokio::test]
#[serial]
async fn queue_metrics_exist() {
    init_recorder();

    let config = QueuedChannelConfig::builder()
        .name("queue_metrics")
        .max_queue_size(2)
        .build_config();
    let queue = QueuedChannel::with_config(Closed, config);

    let endpoint = Endpoint::new("svc", "op", Method::GET);
    let first = queue.execute(endpoint.clone(), Request::new());
    let _second = queue.execute(endpoint.clone(), Request::new());
    let rejected = queue.execute(endpoint, Request::new()).await.unwrap();
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);

    drop(first);

    let snapshot = MetricsSnapshot::take();
    snapshot.assert_gauge_exists("dispatch_requests_queued");
    snapshot.assert_gauge_exists("dispatch_requests_running");
    snapshot.assert_counter_exists("dispatch_requests_rejected_total");
    snapshot.assert_counter_exists("dispatch_requests_cancelled_total");
    snapshot.assert_metric_has_label("dispatch_requests_queued", "channel", "queue_metrics");
    snapshot.assert_metric_has_label(
        "dispatch_requests_rejected_total",
        "channel",
        "queue_metrics",
    );

    // The depth gauge follows cancellations immediately.
    let labels = [("channel", "queue_metrics")];
    assert_eq!(
        snapshot.gauge_value("dispatch_requests_queued", &labels),
        Some(1.0)
    );
    assert_eq!(
        snapshot.gauge_value("dispatch_requests_running", &labels),
        Some(0.0)
    );
}
