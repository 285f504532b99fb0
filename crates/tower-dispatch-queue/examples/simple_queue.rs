use http::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tower_dispatch_core::channel::channel_fn;
use tower_dispatch_core::{AimdConfig, Endpoint, Request, Response, ResponseFuture};
use tower_dispatch_limiter::ConcurrencyLimitedChannelConfig;
use tower_dispatch_queue::QueuedChannelConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    println!("Simple Queue Example\n");

    // A slow node that can take two requests at a time
    let transport = Arc::new(channel_fn(|_, _| {
        ResponseFuture::new(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Response::new(StatusCode::OK))
        })
    }));
    let node = ConcurrencyLimitedChannelConfig::builder()
        .name("api-queue")
        .node("http://localhost:8080/")
        .limiter(
            AimdConfig::default()
                .with_initial_limit(2)
                .with_max_limit(2),
        )
        .build_channel(transport)
        .unwrap();

    // Waiting room for at most three requests
    let queue = QueuedChannelConfig::builder()
        .name("api-queue")
        .max_queue_size(3)
        .on_request_rejected(|max| println!("Rejected: queue of {} is full", max))
        .build_config();
    let channel = tower_dispatch_queue::QueuedChannel::with_config(node, queue);

    let endpoint = Endpoint::new("example", "get", Method::GET);
    let pending: Vec<_> = (1..=6)
        .map(|_| channel.execute(endpoint.clone(), Request::new()))
        .collect();
    println!("running: {}, queued: {}", channel.running(), channel.queued());

    for (i, future) in pending.into_iter().enumerate() {
        match future.await {
            Ok(response) => println!("Request {}: {}", i + 1, response.status()),
            Err(e) => println!("Request {}: error {}", i + 1, e),
        }
    }

    println!("\nAll requests completed!");
}
