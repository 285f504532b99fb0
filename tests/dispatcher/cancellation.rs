//! Callers giving up on queued and running requests.

use super::*;
use http::StatusCode;

#[tokio::test]
async fn dropping_queued_request_removes_it() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("cancel-queued")
        .nodes(["http://a:1"])
        .limiter_config(fixed_limit(1))
        .build()
        .unwrap();

    let running = dispatcher.execute(endpoint(), request(0));
    let abandoned = dispatcher.execute(endpoint(), request(1));
    let kept = dispatcher.execute(endpoint(), request(2));
    assert_eq!(dispatcher.queued(), 2);

    drop(abandoned);
    assert_eq!(dispatcher.queued(), 1);

    gate.next().respond(StatusCode::OK);
    resolve(running).await.unwrap();
    gate.next().respond(StatusCode::OK);
    resolve(kept).await.unwrap();

    // Request 1 never reached a node.
    assert_eq!(gate.delivered_ids(), vec![0, 2]);
}

#[tokio::test]
async fn dropping_running_request_releases_permit() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("cancel-running")
        .nodes(["http://a:1"])
        .limiter_config(fixed_limit(1))
        .build()
        .unwrap();

    let running = dispatcher.execute(endpoint(), request(0));
    let waiting = dispatcher.execute(endpoint(), request(1));
    assert_eq!(dispatcher.node_limits()[0].in_flight, 1);

    drop(running);

    // The freed permit goes to the waiting request.
    wait_until(|| gate.delivered_ids() == vec![0, 1]).await;
    assert_eq!(dispatcher.node_limits()[0].limit, 1);

    // The cancelled call is still parked in the transport.
    assert_eq!(gate.next().id, 0);
    let held = gate.next();
    assert_eq!(held.id, 1);
    held.respond(StatusCode::OK);
    assert_eq!(resolve(waiting).await.unwrap().code(), 200);

    wait_until(|| dispatcher.running() == 0).await;
    assert_eq!(dispatcher.node_limits()[0].in_flight, 0);
}

#[tokio::test]
async fn cancellation_does_not_shrink_limit() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("cancel-limit")
        .nodes(["http://a:1"])
        .build()
        .unwrap();

    let futures: Vec<_> = (0..5)
        .map(|id| dispatcher.execute(endpoint(), request(id)))
        .collect();
    drop(futures);

    wait_until(|| dispatcher.running() == 0).await;
    let node = &dispatcher.node_limits()[0];
    assert_eq!((node.limit, node.in_flight), (20, 0));
}
