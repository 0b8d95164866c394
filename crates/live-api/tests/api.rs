//! API integration tests for live-api routes.
//!
//! Uses Axum's `tower::ServiceExt` to send requests directly to the app
//! without binding a TCP socket.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use live_api::app::build_app;
use live_api::state::AppState;
use live_core::{Channel, ChannelRegistry, Edge, NotificationSink, NotifyError};

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(String, Edge)>>,
    fail: bool,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, name: &str, edge: Edge, _at: DateTime<Utc>) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Http {
                url: "http://hook.invalid".into(),
                status: 502,
            });
        }
        self.sent.lock().unwrap().push((name.to_string(), edge));
        Ok(())
    }
}

/// Writes a snapshot with alice live and bob offline.
fn state() -> (TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("save_data.json");
    ChannelRegistry::save(
        &[Channel::with_live("alice", true), Channel::new("bob")],
        &path,
    )
    .unwrap();
    (dir, AppState::new(path))
}

async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (_dir, state) = state();
    let resp = build_app(state).oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn list_channels_reads_snapshot() {
    let (_dir, state) = state();
    let resp = build_app(state)
        .oneshot(get("/api/v1/channels"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(
        body,
        json!({
            "channels": [
                { "name": "alice", "live": true },
                { "name": "bob", "live": false }
            ],
            "live": 1,
            "total": 2
        })
    );
}

#[tokio::test]
async fn list_channels_without_snapshot_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(AppState::new(dir.path().join("absent.json")));
    let resp = app.oneshot(get("/api/v1/channels")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["total"], 0);
    assert_eq!(body["channels"], json!([]));
}

#[tokio::test]
async fn malformed_snapshot_returns_503() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("save_data.json");
    std::fs::write(&path, "[{\"name\": ").unwrap();
    let resp = build_app(AppState::new(path))
        .oneshot(get("/api/v1/channels"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "unavailable");
}

#[tokio::test]
async fn get_channel_matches_case_insensitively() {
    let (_dir, state) = state();
    let resp = build_app(state)
        .oneshot(get("/api/v1/channels/ALICE"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body, json!({ "name": "alice", "live": true }));
}

#[tokio::test]
async fn get_unknown_channel_returns_404() {
    let (_dir, state) = state();
    let resp = build_app(state)
        .oneshot(get("/api/v1/channels/nobody"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn metrics_returns_openmetrics() {
    let (_dir, state) = state();
    let resp = build_app(state).oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(ct.contains("openmetrics-text"));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("live_alert_channels_live 1"));
    assert!(text.contains("live_alert_snapshot_age_seconds"));
    assert!(text.contains("# EOF"));
}

#[tokio::test]
async fn webhook_trigger_sends_notification() {
    let (_dir, state) = state();
    let sink = Arc::new(RecordingSink::default());
    let app = build_app(state.with_sink(Arc::clone(&sink) as Arc<dyn NotificationSink>));

    let resp = app
        .oneshot(post("/api/v1/webhook?channel_name=alice&status=offline"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["message"], "Webhook sent for alice with status offline");
    assert_eq!(
        *sink.sent.lock().unwrap(),
        vec![("alice".to_string(), Edge::BecameOffline)]
    );
}

#[tokio::test]
async fn webhook_trigger_rejects_unknown_status() {
    let (_dir, state) = state();
    let sink = Arc::new(RecordingSink::default());
    let app = build_app(state.with_sink(Arc::clone(&sink) as Arc<dyn NotificationSink>));

    let resp = app
        .oneshot(post("/api/v1/webhook?channel_name=alice&status=sleeping"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(sink.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn webhook_trigger_without_sink_returns_503() {
    let (_dir, state) = state();
    let resp = build_app(state)
        .oneshot(post("/api/v1/webhook?channel_name=alice&status=live"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn webhook_delivery_failure_returns_500() {
    let (_dir, state) = state();
    let sink = Arc::new(RecordingSink {
        fail: true,
        ..Default::default()
    });
    let resp = build_app(state.with_sink(sink))
        .oneshot(post("/api/v1/webhook?channel_name=alice&status=live"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "internal_error");
}
