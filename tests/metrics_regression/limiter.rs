//! Per-node limiter metrics regression tests

use super::helpers::*;
use http::{Method, StatusCode};
use serial_test::serial;
use std::sync::Arc;
use tower_dispatch_core::channel::channel_fn;
use tower_dispatch_core::{Endpoint, LimitedChannel, Request, Response, ResponseFuture};
use tower_dispatch_limiter::ConcurrencyLimitedChannelConfig;

const NODE: &str = "http://node-1:8080/";

fn shedding_channel(name: &str) -> tower_dispatch_limiter::ConcurrencyLimitedChannel {
    let transport = Arc::new(channel_fn(|_, _| {
        ResponseFuture::response(Response::new(StatusCode::SERVICE_UNAVAILABLE))
    }));
    ConcurrencyLimitedChannelConfig::builder()
        .name(name)
        .node(NODE)
        .build_channel(transport)
        .unwrap()
}

#[tokio::test]
#[serial]
async fn limiter_gauges_exist() {
    init_recorder();

    let channel = shedding_channel("limiter_metrics");
    let endpoint = Endpoint::new("svc", "op", Method::GET);
    let response = channel
        .maybe_execute(&endpoint, &Request::new())
        .expect("limit not reached")
        .await
        .unwrap();
    assert_eq!(response.code(), 503);

    let snapshot = MetricsSnapshot::take();
    snapshot.assert_gauge_exists("dispatch_node_concurrency_limit");
    snapshot.assert_gauge_exists("dispatch_node_requests_in_flight");
    snapshot.assert_metric_has_label("dispatch_node_concurrency_limit", "channel", "limiter_metrics");
    snapshot.assert_metric_has_label("dispatch_node_concurrency_limit", "node", NODE);

    // 20 shrinks to 18 after one 503.
    let labels = [("channel", "limiter_metrics"), ("node", NODE)];
    assert_eq!(
        snapshot.gauge_value("dispatch_node_concurrency_limit", &labels),
        Some(18.0)
    );
    assert_eq!(
        snapshot.gauge_value("dispatch_node_requests_in_flight", &labels),
        Some(0.0)
    );
}

#[tokio::test]
#[serial]
async fn retired_node_gauges_drop_to_zero() {
    init_recorder();

    let channel = shedding_channel("limiter_retired");
    let endpoint = Endpoint::new("svc", "op", Method::GET);
    let pending = channel.maybe_execute(&endpoint, &Request::new()).unwrap();

    channel.retire();
    pending.await.unwrap();

    // Completions after retirement no longer publish.
    let snapshot = MetricsSnapshot::take();
    let labels = [("channel", "limiter_retired"), ("node", NODE)];
    assert_eq!(
        snapshot.gauge_value("dispatch_node_concurrency_limit", &labels),
        Some(0.0)
    );
    assert_eq!(
        snapshot.gauge_value("dispatch_node_requests_in_flight", &labels),
        Some(0.0)
    );
    assert_eq!(channel.limit(), 18);
}
