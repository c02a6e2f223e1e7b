//! End-to-end runtime tests against an in-process WebSocket server.
//!
//! Each test plays the server side of the protocol by hand: accept the
//! connection, read the client's envelopes, feed tagged frames back, and
//! assert what the runtime surfaces to callers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;

use client::{Call, Client, ClientConfig, ConnectionState, MethodSets};

type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

fn methods() -> MethodSets {
    MethodSets::new(["foo.bar", "foo.baz"], ["foo.stream"])
}

fn client_for(url: &str) -> Client {
    let mut config = ClientConfig::new(url);
    config.retry_delay = Duration::from_millis(50);
    Client::new(config, methods())
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!(
        "ws://{}/dev-console/json-rpc-ws",
        listener.local_addr().expect("addr")
    );
    (listener, url)
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("accept timed out")
        .expect("accept");
    tokio_tungstenite::accept_async(stream)
        .await
        .expect("handshake")
}

async fn recv_json(ws: &mut ServerWs) -> Value {
    let deadline = async {
        loop {
            let message = ws.next().await.expect("socket open").expect("read");
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).expect("client sends valid json");
            }
        }
    };
    timeout(WAIT, deadline).await.expect("frame timed out")
}

async fn send_json(ws: &mut ServerWs, value: &Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("server send");
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within deadline");
}

#[tokio::test]
async fn request_round_trip_resolves_with_unwrapped_payload() {
    let (listener, url) = bind().await;
    let client = client_for(&url);

    let Call::Response(pending) = client
        .invoke("foo", "bar", json!({"x": 1}))
        .expect("request")
    else {
        panic!("foo.bar must classify as a request");
    };

    let mut ws = accept(&listener).await;
    let frame = recv_json(&mut ws).await;
    assert_eq!(
        frame,
        json!({"jsonrpc": "2.0", "method": "foo.bar", "params": {"x": 1}, "id": 0})
    );

    send_json(
        &mut ws,
        &json!({"id": 0, "result": {"messageType": "Response", "object": {"y": 2}}}),
    )
    .await;

    let result = timeout(WAIT, pending.wait())
        .await
        .expect("response timed out")
        .expect("server replied ok");
    assert_eq!(result, json!({"y": 2}));
}

#[tokio::test]
async fn subscription_stream_delivers_items_in_order() {
    let (listener, url) = bind().await;
    let client = client_for(&url);

    let Call::Stream(stream) = client.invoke("foo", "stream", json!({})).expect("subscribe")
    else {
        panic!("foo.stream must classify as a subscription");
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    stream.on_next(move |value| sink.lock().expect("lock").push(value));

    let mut ws = accept(&listener).await;
    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["method"], "foo.stream");
    let id = frame["id"].as_u64().expect("numeric id");

    send_json(&mut ws, &json!({"id": id, "result": {"messageType": "Void"}})).await;
    send_json(
        &mut ws,
        &json!({"id": id, "result": {"messageType": "SubscriptionMessage", "object": "a"}}),
    )
    .await;
    send_json(
        &mut ws,
        &json!({"id": id, "result": {"messageType": "SubscriptionMessage", "object": "b"}}),
    )
    .await;

    wait_until(|| seen.lock().expect("lock").len() == 2).await;
    assert_eq!(*seen.lock().expect("lock"), vec![json!("a"), json!("b")]);
}

#[tokio::test]
async fn classification_miss_sends_no_frame() {
    let (listener, url) = bind().await;
    let client = client_for(&url);

    client
        .invoke("foo", "unknown", json!({}))
        .expect_err("classification should miss");

    // The next valid call must be the first frame the server ever sees.
    let Call::Response(_pending) = client.invoke("foo", "bar", json!({})).expect("request")
    else {
        panic!("foo.bar must classify as a request");
    };

    let mut ws = accept(&listener).await;
    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["method"], "foo.bar");
}

#[tokio::test]
async fn frames_invoked_while_disconnected_are_buffered_then_flushed() {
    // Reserve a port, then release it so the first connect attempts fail.
    let (listener, url) = bind().await;
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = client_for(&url);
    let Call::Response(pending) = client.invoke("foo", "bar", json!({"n": 1})).expect("request")
    else {
        panic!("foo.bar must classify as a request");
    };
    let Call::Response(pending_second) =
        client.invoke("foo", "baz", json!({"n": 2})).expect("request")
    else {
        panic!("foo.baz must classify as a request");
    };

    // Let at least one connect attempt fail before the server exists.
    sleep(Duration::from_millis(150)).await;
    let listener = TcpListener::bind(addr).await.expect("rebind");

    let mut ws = accept(&listener).await;
    let first = recv_json(&mut ws).await;
    let second = recv_json(&mut ws).await;
    assert_eq!(first["method"], "foo.bar", "submission order preserved");
    assert_eq!(second["method"], "foo.baz");

    send_json(
        &mut ws,
        &json!({"id": first["id"], "result": {"messageType": "Response", "object": 1}}),
    )
    .await;
    send_json(
        &mut ws,
        &json!({"id": second["id"], "result": {"messageType": "Response", "object": 2}}),
    )
    .await;

    assert_eq!(
        timeout(WAIT, pending.wait()).await.expect("first").expect("ok"),
        json!(1)
    );
    assert_eq!(
        timeout(WAIT, pending_second.wait())
            .await
            .expect("second")
            .expect("ok"),
        json!(2)
    );
}

#[tokio::test]
async fn pending_request_survives_a_reconnect() {
    let (listener, url) = bind().await;
    let client = client_for(&url);

    let Call::Response(pending) = client.invoke("foo", "bar", json!({})).expect("request")
    else {
        panic!("foo.bar must classify as a request");
    };

    // First connection sees the request but dies before answering.
    let mut first_ws = accept(&listener).await;
    let frame = recv_json(&mut first_ws).await;
    drop(first_ws);

    // The runtime reconnects on its own; answer on the new connection.
    let mut second_ws = accept(&listener).await;
    send_json(
        &mut second_ws,
        &json!({"id": frame["id"], "result": {"messageType": "Response", "object": "late"}}),
    )
    .await;

    let result = timeout(WAIT, pending.wait())
        .await
        .expect("response timed out")
        .expect("still resolvable after reconnect");
    assert_eq!(result, json!("late"));
}

#[tokio::test]
async fn orphan_subscription_item_triggers_outbound_unsubscribe() {
    let (listener, url) = bind().await;
    let client = client_for(&url);
    client.ensure_started();

    let mut ws = accept(&listener).await;
    send_json(
        &mut ws,
        &json!({"id": 99, "result": {"messageType": "SubscriptionMessage", "object": "stray"}}),
    )
    .await;

    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["method"], "unsubscribe");
    assert_eq!(frame["id"], 99);
    assert_eq!(frame["params"], json!({}));
}

#[tokio::test]
async fn cancel_sends_one_unsubscribe_and_is_idempotent() {
    let (listener, url) = bind().await;
    let client = client_for(&url);

    let Call::Stream(stream) = client.invoke("foo", "stream", json!({})).expect("subscribe")
    else {
        panic!("foo.stream must classify as a subscription");
    };

    let mut ws = accept(&listener).await;
    let subscribe = recv_json(&mut ws).await;
    assert_eq!(subscribe["method"], "foo.stream");

    stream.cancel();
    let unsubscribe = recv_json(&mut ws).await;
    assert_eq!(unsubscribe["method"], "unsubscribe");
    assert_eq!(unsubscribe["id"], subscribe["id"]);

    stream.cancel();
    let extra = timeout(Duration::from_millis(200), ws.next()).await;
    assert!(extra.is_err(), "second cancel must not produce a frame");
}

#[tokio::test]
async fn cancelled_stream_receives_no_further_items() {
    let (listener, url) = bind().await;
    let client = client_for(&url);

    let Call::Stream(stream) = client.invoke("foo", "stream", json!({})).expect("subscribe")
    else {
        panic!("foo.stream must classify as a subscription");
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    stream.on_next(move |value| sink.lock().expect("lock").push(value));

    let mut ws = accept(&listener).await;
    let subscribe = recv_json(&mut ws).await;
    let id = subscribe["id"].clone();

    send_json(
        &mut ws,
        &json!({"id": id, "result": {"messageType": "SubscriptionMessage", "object": "before"}}),
    )
    .await;
    wait_until(|| seen.lock().expect("lock").len() == 1).await;

    stream.cancel();
    let unsubscribe = recv_json(&mut ws).await;
    assert_eq!(unsubscribe["method"], "unsubscribe");

    // An item raced past the cancel: the client treats it as an orphan and
    // answers with another unsubscribe, not a callback.
    send_json(
        &mut ws,
        &json!({"id": id, "result": {"messageType": "SubscriptionMessage", "object": "after"}}),
    )
    .await;
    let hygiene = recv_json(&mut ws).await;
    assert_eq!(hygiene["method"], "unsubscribe");
    assert_eq!(*seen.lock().expect("lock"), vec![json!("before")]);
}

#[tokio::test]
async fn hot_reload_resolves_pending_and_flips_state() {
    let (listener, url) = bind().await;
    let client = client_for(&url);
    let mut state = client.state();

    let Call::Response(pending) = client.invoke("foo", "bar", json!({})).expect("request")
    else {
        panic!("foo.bar must classify as a request");
    };

    let mut ws = accept(&listener).await;
    let frame = recv_json(&mut ws).await;
    send_json(
        &mut ws,
        &json!({"id": frame["id"], "result": {"messageType": "HotReload", "object": "rebuilt"}}),
    )
    .await;

    let result = timeout(WAIT, pending.wait())
        .await
        .expect("response timed out")
        .expect("hot reload resolves like a response");
    assert_eq!(result, json!("rebuilt"));

    timeout(WAIT, async {
        while *state.borrow() != ConnectionState::Reloaded {
            state.changed().await.expect("watch open");
        }
    })
    .await
    .expect("state should reach Reloaded");
    assert!(state.borrow().is_connected());
}

#[tokio::test]
async fn server_error_rejects_the_caller_with_payload() {
    let (listener, url) = bind().await;
    let client = client_for(&url);

    let Call::Response(pending) = client.invoke("foo", "bar", json!({})).expect("request")
    else {
        panic!("foo.bar must classify as a request");
    };

    let mut ws = accept(&listener).await;
    let frame = recv_json(&mut ws).await;
    send_json(
        &mut ws,
        &json!({"id": frame["id"], "error": {"message": "no such datasource"}}),
    )
    .await;

    let err = timeout(WAIT, pending.wait())
        .await
        .expect("rejection timed out")
        .expect_err("server rejected the call");
    match err {
        client::RpcError::Server(payload) => {
            assert_eq!(payload, json!({"message": "no such datasource"}));
        }
        other => panic!("expected server error, got {other:?}"),
    }
}
