use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use nodo_bridge::event_bus::EventBus;
use nodo_bridge::protocol::Notification;
use nodo_core::types::SyncInfo;
use nodo_daemon::sync_info::{parse_sync_response, SyncError, SyncStatusPoller};
use serde_json::{json, Value};

/// Serve `router` on an ephemeral port and return the JSON-RPC URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/json_rpc")
}

fn poller(url: &str, bus: &EventBus) -> SyncStatusPoller {
    SyncStatusPoller::new(url, Duration::from_secs(2), bus.clone()).unwrap()
}

#[test]
fn parses_height_and_target() {
    let info =
        parse_sync_response(r#"{"id":"0","jsonrpc":"2.0","result":{"height":100,"target_height":400}}"#)
            .unwrap();
    assert_eq!(info, SyncInfo::new(100, 400));
    assert_eq!(info.percentage(), 25);
}

#[test]
fn missing_fields_default_to_zero() {
    let info = parse_sync_response(r#"{"result":{"height":5}}"#).unwrap();
    assert_eq!(info, SyncInfo::new(5, 0));
    assert_eq!(info.percentage(), 100);

    let info = parse_sync_response(r#"{"jsonrpc":"2.0"}"#).unwrap();
    assert_eq!(info, SyncInfo::default());
}

#[test]
fn malformed_body_is_decode_error() {
    assert!(matches!(
        parse_sync_response("<html>busy</html>"),
        Err(SyncError::Decode(_))
    ));
}

#[test]
fn rpc_error_member_is_error() {
    assert!(matches!(
        parse_sync_response(r#"{"error":{"code":-32601,"message":"Method not found"}}"#),
        Err(SyncError::Rpc(_))
    ));
}

#[tokio::test]
async fn poll_stores_info_and_publishes() {
    let router = Router::new().route(
        "/json_rpc",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["method"], "sync_info");
            assert_eq!(body["jsonrpc"], "2.0");
            Json(json!({"id": "0", "jsonrpc": "2.0", "result": {"height": 99, "target_height": 100}}))
        }),
    );
    let url = serve(router).await;
    let bus = EventBus::new();
    let rx = bus.subscribe();
    let poller = poller(&url, &bus);

    let info = poller.poll_once().await;
    assert_eq!(info, Some(SyncInfo::new(99, 100)));
    assert_eq!(poller.sync_percentage(), 99);
    assert_eq!(
        rx.try_recv().unwrap(),
        Notification::SyncStatusReady {
            height: 99,
            target_height: 100,
            percentage: 99,
        }
    );
}

#[tokio::test]
async fn malformed_response_keeps_previous_info() {
    let router = Router::new().route("/json_rpc", post(|| async { "not json" }));
    let url = serve(router).await;
    let bus = EventBus::new();
    let rx = bus.subscribe();
    let poller = poller(&url, &bus);

    poller.complete(poller.next_seq(), Ok(SyncInfo::new(10, 20)));
    let _ = rx.try_recv();

    assert_eq!(poller.poll_once().await, None);
    assert_eq!(poller.sync_info(), SyncInfo::new(10, 20));
    assert!(matches!(
        rx.try_recv().unwrap(),
        Notification::SyncStatusFailed { .. }
    ));
}

#[tokio::test]
async fn unreachable_endpoint_fails_without_panicking() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let bus = EventBus::new();
    let rx = bus.subscribe();
    let poller = poller(&format!("http://{addr}/json_rpc"), &bus);

    assert_eq!(poller.poll_once().await, None);
    assert_eq!(poller.sync_percentage(), 100);
    assert!(matches!(
        rx.try_recv().unwrap(),
        Notification::SyncStatusFailed { .. }
    ));
}

#[tokio::test]
async fn stale_response_is_discarded() {
    let bus = EventBus::new();
    let rx = bus.subscribe();
    let poller = poller("http://127.0.0.1:18081/json_rpc", &bus);

    let older = poller.next_seq();
    let newer = poller.next_seq();

    assert!(poller.complete(newer, Ok(SyncInfo::new(200, 200))).is_some());
    assert!(poller.complete(older, Ok(SyncInfo::new(100, 200))).is_none());

    assert!(poller
        .complete(older, Err(SyncError::Status(503)))
        .is_none());

    assert_eq!(poller.sync_info(), SyncInfo::new(200, 200));
    let kinds: Vec<_> = rx.drain().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec!["sync_status_ready"]);
}

#[tokio::test]
async fn failure_from_current_poll_is_published() {
    let bus = EventBus::new();
    let rx = bus.subscribe();
    let poller = poller("http://127.0.0.1:18081/json_rpc", &bus);

    let first = poller.next_seq();
    poller.complete(first, Ok(SyncInfo::new(10, 20)));
    let second = poller.next_seq();
    assert!(poller
        .complete(second, Err(SyncError::Request("connection refused".into())))
        .is_none());

    assert_eq!(poller.sync_info(), SyncInfo::new(10, 20));
    let kinds: Vec<_> = rx.drain().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec!["sync_status_ready", "sync_status_failed"]);
}

#[tokio::test]
async fn start_update_returns_before_response() {
    let router = Router::new().route(
        "/json_rpc",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Json(json!({"result": {"height": 1, "target_height": 4}}))
        }),
    );
    let url = serve(router).await;
    let bus = EventBus::new();
    let rx = bus.subscribe();
    let poller = poller(&url, &bus);

    poller.start_sync_status_update();
    assert!(rx.is_empty());

    let n = tokio::time::timeout(Duration::from_secs(2), rx.recv_async())
        .await
        .expect("poll should complete")
        .unwrap();
    assert_eq!(
        n,
        Notification::SyncStatusReady {
            height: 1,
            target_height: 4,
            percentage: 25,
        }
    );
}
