//! End-to-end admission, queueing and feedback scenarios.

use super::*;
use http::StatusCode;

/// No nodes at startup: everything queues, then drains in order once a node
/// appears.
#[tokio::test]
async fn zero_nodes_queue_until_update() {
    let gate = Gate::new();
    let dispatcher = gate.dispatcher("startup").build().unwrap();

    let pending: Vec<_> = (0..3)
        .map(|id| dispatcher.execute(endpoint(), request(id)))
        .collect();
    assert_eq!(dispatcher.queued(), 3);
    assert_eq!(dispatcher.running(), 0);
    assert_eq!(gate.held(), 0);

    dispatcher.update_nodes(["http://node-1:8080"]).unwrap();
    assert_eq!(dispatcher.queued(), 0);
    assert_eq!(gate.delivered_ids(), vec![0, 1, 2]);

    for _ in 0..3 {
        gate.next().respond(StatusCode::OK);
    }
    for future in pending {
        assert_eq!(resolve(future).await.unwrap().code(), 200);
    }
}

#[tokio::test]
async fn queued_requests_release_in_submission_order() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("fifo")
        .nodes(["http://node-1:8080"])
        .limiter_config(fixed_limit(1))
        .build()
        .unwrap();

    let pending: Vec<_> = (0..5)
        .map(|id| dispatcher.execute(endpoint(), request(id)))
        .collect();
    assert_eq!(dispatcher.running(), 1);
    assert_eq!(dispatcher.queued(), 4);

    for future in pending {
        gate.next().respond(StatusCode::OK);
        resolve(future).await.unwrap();
    }

    assert_eq!(gate.delivered_ids(), vec![0, 1, 2, 3, 4]);
    assert_eq!(dispatcher.queued(), 0);
    assert_eq!(dispatcher.running(), 0);
}

#[tokio::test]
async fn full_queue_answers_too_many_requests() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("bounded")
        .nodes(["http://node-1:8080"])
        .limiter_config(fixed_limit(1))
        .max_queue_size(1)
        .build()
        .unwrap();

    let running = dispatcher.execute(endpoint(), request(0));
    let queued = dispatcher.execute(endpoint(), request(1));
    let rejected = resolve(dispatcher.execute(endpoint(), request(2)))
        .await
        .unwrap();

    assert_eq!(rejected.code(), 429);
    assert!(rejected.body().is_empty());
    assert!(rejected.headers().is_empty());
    assert_eq!(dispatcher.queued(), 1);

    gate.next().respond(StatusCode::OK);
    resolve(running).await.unwrap();
    gate.next().respond(StatusCode::OK);
    resolve(queued).await.unwrap();
    assert_eq!(gate.delivered_ids(), vec![0, 1]);
}

#[tokio::test]
async fn completion_drains_queue_head() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("drain")
        .nodes(["http://node-1:8080"])
        .limiter_config(fixed_limit(1))
        .build()
        .unwrap();

    let a = dispatcher.execute(endpoint(), request(0));
    let b = dispatcher.execute(endpoint(), request(1));
    assert_eq!((dispatcher.queued(), dispatcher.running()), (1, 1));

    gate.next().respond(StatusCode::OK);
    resolve(a).await.unwrap();
    assert_eq!((dispatcher.queued(), dispatcher.running()), (0, 1));

    gate.next().respond(StatusCode::OK);
    resolve(b).await.unwrap();
    assert_eq!((dispatcher.queued(), dispatcher.running()), (0, 0));
}

#[tokio::test]
async fn round_robin_spreads_requests() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("spread")
        .nodes(["http://a:1", "http://b:1", "http://c:1"])
        .build()
        .unwrap();

    let pending: Vec<_> = (0..6)
        .map(|id| dispatcher.execute(endpoint(), request(id)))
        .collect();
    assert_eq!(gate.delivered_nodes(), vec!["a", "b", "c", "a", "b", "c"]);

    while gate.held() > 0 {
        gate.next().respond(StatusCode::OK);
    }
    for future in pending {
        resolve(future).await.unwrap();
    }
}

#[tokio::test]
async fn full_node_overflows_to_next_candidate() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("overflow")
        .nodes(["http://a:1", "http://b:1"])
        .selection_strategy(tower_dispatch::SelectionStrategy::FirstAvailable)
        .limiter_config(fixed_limit(2))
        .build()
        .unwrap();

    let pending: Vec<_> = (0..5)
        .map(|id| dispatcher.execute(endpoint(), request(id)))
        .collect();
    assert_eq!(gate.delivered_nodes(), vec!["a", "a", "b", "b"]);
    assert_eq!(dispatcher.queued(), 1);

    // Freeing a slot on b admits the waiting request there.
    gate.next_on("b").respond(StatusCode::OK);
    wait_until(|| dispatcher.queued() == 0).await;
    assert_eq!(gate.delivered_nodes().last().map(String::as_str), Some("b"));

    while gate.held() > 0 {
        gate.next().respond(StatusCode::OK);
    }
    for future in pending {
        resolve(future).await.unwrap();
    }
}

#[tokio::test]
async fn backoff_status_shrinks_node_limit() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("feedback")
        .nodes(["http://node-1:8080"])
        .build()
        .unwrap();
    assert_eq!(dispatcher.node_limits()[0].limit, 20);

    let future = dispatcher.execute(endpoint(), request(0));
    gate.next().respond(StatusCode::SERVICE_UNAVAILABLE);
    let response = resolve(future).await.unwrap();

    // QoS responses reach the caller unchanged.
    assert_eq!(response.code(), 503);
    assert_eq!(dispatcher.node_limits()[0].limit, 18);
    assert_eq!(dispatcher.node_limits()[0].in_flight, 0);
}

#[tokio::test]
async fn success_under_load_grows_node_limit() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("growth")
        .nodes(["http://node-1:8080"])
        .limiter_config(AimdConfig::default().with_initial_limit(4))
        .build()
        .unwrap();

    let pending: Vec<_> = (0..2)
        .map(|id| dispatcher.execute(endpoint(), request(id)))
        .collect();

    // The second permit was issued with 2 of 4 in flight.
    gate.next().respond(StatusCode::OK);
    gate.next().respond(StatusCode::OK);
    for future in pending {
        resolve(future).await.unwrap();
    }

    assert_eq!(dispatcher.node_limits()[0].limit, 5);
}
