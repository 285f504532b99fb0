//! Node list updates while requests are queued or running.

use super::*;
use http::StatusCode;

#[tokio::test]
async fn removed_node_finishes_in_flight_work() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("reload")
        .nodes(["http://a:1"])
        .build()
        .unwrap();

    let on_a = dispatcher.execute(endpoint(), request(0));
    dispatcher.update_nodes(["http://b:1"]).unwrap();

    let on_b = dispatcher.execute(endpoint(), request(1));
    assert_eq!(gate.delivered_nodes(), vec!["a", "b"]);

    let hosts: Vec<_> = dispatcher
        .nodes()
        .iter()
        .map(|uri| uri.host().unwrap_or_default().to_string())
        .collect();
    assert_eq!(hosts, vec!["b"]);

    gate.next_on("a").respond(StatusCode::OK);
    assert_eq!(resolve(on_a).await.unwrap().code(), 200);
    gate.next_on("b").respond(StatusCode::OK);
    assert_eq!(resolve(on_b).await.unwrap().code(), 200);
}

#[tokio::test]
async fn retained_node_keeps_limiter_state() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("retain")
        .nodes(["http://a:1"])
        .build()
        .unwrap();

    let future = dispatcher.execute(endpoint(), request(0));
    gate.next().respond(StatusCode::TOO_MANY_REQUESTS);
    resolve(future).await.unwrap();
    assert_eq!(dispatcher.node_limits()[0].limit, 18);

    dispatcher
        .update_nodes(["http://a:1", "http://b:1"])
        .unwrap();
    let limits: Vec<_> = dispatcher.node_limits().iter().map(|n| n.limit).collect();
    assert_eq!(limits, vec![18, 20]);
}

#[tokio::test]
async fn readded_node_starts_fresh() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("readd")
        .nodes(["http://a:1"])
        .build()
        .unwrap();

    let future = dispatcher.execute(endpoint(), request(0));
    gate.next().respond(StatusCode::SERVICE_UNAVAILABLE);
    resolve(future).await.unwrap();
    assert_eq!(dispatcher.node_limits()[0].limit, 18);

    dispatcher.update_nodes(["http://b:1"]).unwrap();
    dispatcher.update_nodes(["http://a:1"]).unwrap();
    assert_eq!(dispatcher.node_limits()[0].limit, 20);
}

#[tokio::test]
async fn dropping_to_zero_nodes_queues_new_requests() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("shrink")
        .nodes(["http://a:1"])
        .build()
        .unwrap();

    let running = dispatcher.execute(endpoint(), request(0));
    dispatcher.update_nodes(Vec::<String>::new()).unwrap();
    assert!(dispatcher.nodes().is_empty());

    let waiting = dispatcher.execute(endpoint(), request(1));
    assert_eq!(dispatcher.queued(), 1);

    // The removed node's completion must not resurrect it.
    gate.next().respond(StatusCode::OK);
    resolve(running).await.unwrap();
    assert_eq!(dispatcher.queued(), 1);
    assert_eq!(gate.held(), 0);

    dispatcher.update_nodes(["http://b:1"]).unwrap();
    assert_eq!(dispatcher.queued(), 0);
    gate.next_on("b").respond(StatusCode::OK);
    assert_eq!(resolve(waiting).await.unwrap().code(), 200);
}

#[tokio::test]
async fn malformed_update_keeps_previous_nodes() {
    let gate = Gate::new();
    let dispatcher = gate
        .dispatcher("atomic")
        .nodes(["http://a:1", "http://b:1"])
        .build()
        .unwrap();

    for bad in [
        vec!["http://c:1", "c:1"],
        vec!["/relative"],
        vec!["http://c:1", "not a uri"],
    ] {
        let err = dispatcher.update_nodes(bad).unwrap_err();
        assert!(err.is_config(), "unexpected error: {err}");
        assert_eq!(dispatcher.nodes().len(), 2);
    }
}

#[tokio::test]
async fn concurrent_updates_and_requests_complete() {
    let dispatcher = Dispatcher::builder()
        .channel_name("churn")
        .channel_factory(|_: &Uri| -> Arc<dyn tower_dispatch_core::Channel> {
            Arc::new(channel_fn(|_, _| {
                ResponseFuture::new(async {
                    tokio::task::yield_now().await;
                    Ok(Response::new(StatusCode::OK))
                })
            }))
        })
        .nodes(["http://a:1"])
        .build()
        .unwrap();

    let updater = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let sets: [&[&str]; 4] = [
                &["http://a:1", "http://b:1"],
                &["http://b:1"],
                &[],
                &["http://c:1", "http://a:1"],
            ];
            for round in 0..200 {
                dispatcher.update_nodes(sets[round % sets.len()]).unwrap();
                tokio::task::yield_now().await;
            }
            dispatcher.update_nodes(["http://a:1"]).unwrap();
        })
    };

    let mut pending = Vec::new();
    for id in 0..500 {
        pending.push(dispatcher.execute(endpoint(), request(id)));
        if id % 10 == 0 {
            tokio::task::yield_now().await;
        }
    }

    updater.await.unwrap();
    for future in pending {
        assert_eq!(resolve(future).await.unwrap().code(), 200);
    }
    assert_eq!(dispatcher.queued(), 0);
}
