//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` over a real
//! camera registry and exercise the /api/v1/* endpoints with
//! `tower::ServiceExt::oneshot()`. The barrier backend is a local axum
//! server on 127.0.0.1:0.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use parkgate::acquisition::{HttpSignaling, ProbePeerFactory, WsTransport};
use parkgate::api::{create_app, ApiState};
use parkgate::storage::DecisionLog;
use parkgate::types::GateState;
use parkgate::{ActuatorClient, CameraRegistry, GateConfig, PipelineDeps};

struct TestApp {
    app: Router,
    registry: CameraRegistry,
}

async fn fake_barrier() -> String {
    let app = Router::new()
        .route(
            "/api/open-barrier",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "success": true,
                    "barrier_opened": true,
                    "message": format!("Welcome {}", body["plate_text"].as_str().unwrap_or("")),
                    "entry_time": "2026-03-01 08:00:00",
                    "customer_type": "regular",
                    "is_subscriber": false
                }))
            }),
        )
        .route(
            "/api/close-barrier",
            post(|| async { Json(json!({"success": true, "is_open": false})) }),
        )
        .route(
            "/api/barrier/status",
            get(|| async { Json(json!({"success": true, "is_open": false, "enabled": true})) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", addr)
}

async fn create_test_app() -> TestApp {
    let barrier = fake_barrier().await;
    let config = GateConfig::from_toml_str(&format!(
        r#"
[[cameras]]
id = "1"
name = "North entry"
direction = "ENTRY"
open_policy = "confirm"
[cameras.actuator]
base_url = "{barrier}"

[[cameras]]
id = "2"
direction = "EXIT"
"#
    ))
    .unwrap();

    let log = DecisionLog::temporary().unwrap();
    let signaling = Arc::new(HttpSignaling::new(Duration::from_secs(2)).unwrap());
    let deps = PipelineDeps {
        actuator: Arc::new(ActuatorClient::new(Duration::from_secs(2)).unwrap()),
        history: Arc::new(log.clone()),
        feed_transport: Arc::new(WsTransport),
        peers: Arc::new(ProbePeerFactory::new(signaling.clone(), Duration::from_secs(10))),
        signaling,
    };
    let mut registry = CameraRegistry::new(deps, CancellationToken::new());
    registry.start_all(&config);

    let app = create_app(ApiState::new(registry.directory(), Some(log)));
    TestApp { app, registry }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// All GET endpoints should return 200 with the envelope.
#[tokio::test]
async fn test_get_endpoints_return_200() {
    let t = create_test_app().await;

    for endpoint in [
        "/api/v1/health",
        "/api/v1/cameras",
        "/api/v1/cameras/1",
        "/api/v1/decisions",
    ] {
        let (status, body) = call(&t.app, "GET", endpoint, None).await;
        assert_eq!(status, StatusCode::OK, "GET {endpoint}");
        assert!(body.get("data").is_some(), "GET {endpoint} missing data");
        assert!(body.get("meta").is_some(), "GET {endpoint} missing meta");
    }

    t.registry.shutdown().await;
}

#[tokio::test]
async fn test_health_counts_cameras() {
    let t = create_test_app().await;
    let (_, body) = call(&t.app, "GET", "/api/v1/health", None).await;
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["cameras"], 2);
    assert_eq!(body["data"]["decision_log"], true);
    t.registry.shutdown().await;
}

#[tokio::test]
async fn test_cameras_list_is_ordered_snapshots() {
    let t = create_test_app().await;
    let (_, body) = call(&t.app, "GET", "/api/v1/cameras", None).await;
    let cameras = body["data"].as_array().unwrap();
    assert_eq!(cameras.len(), 2);
    assert_eq!(cameras[0]["camera_id"], "1");
    assert_eq!(cameras[0]["name"], "North entry");
    assert_eq!(cameras[0]["state"], "IDLE");
    assert_eq!(cameras[1]["direction"], "EXIT");
    assert_eq!(cameras[0]["health"]["video_stats"]["attempts"], 0);
    assert!(cameras[0]["health"]["video_stats"]["last_error"].is_null());
    t.registry.shutdown().await;
}

#[tokio::test]
async fn test_unknown_camera_is_404() {
    let t = create_test_app().await;
    let (status, body) = call(&t.app, "GET", "/api/v1/cameras/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = call(&t.app, "POST", "/api/v1/cameras/99/close", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    t.registry.shutdown().await;
}

#[tokio::test]
async fn test_unknown_route_is_404_envelope() {
    let t = create_test_app().await;
    let (status, body) = call(&t.app, "GET", "/api/v1/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    t.registry.shutdown().await;
}

#[tokio::test]
async fn test_override_validation_and_clear() {
    let t = create_test_app().await;

    let (status, body) = call(
        &t.app,
        "POST",
        "/api/v1/cameras/1/override",
        Some(json!({"plate_text": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = call(
        &t.app,
        "POST",
        "/api/v1/cameras/1/override",
        Some(json!({"plate_text": " 30a12345 "})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["text"], "30A12345");
    assert_eq!(body["data"]["source"], "manual");

    let (_, body) = call(&t.app, "GET", "/api/v1/cameras/1", None).await;
    assert_eq!(body["data"]["overridden"], true);
    assert_eq!(body["data"]["state"], "CANDIDATE");

    let (status, body) = call(&t.app, "DELETE", "/api/v1/cameras/1/override", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], true);

    t.registry.shutdown().await;
}

#[tokio::test]
async fn test_open_without_actuator_is_conflict() {
    let t = create_test_app().await;
    let (status, body) = call(
        &t.app,
        "POST",
        "/api/v1/cameras/2/open",
        Some(json!({"plate_text": "30A12345"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
    t.registry.shutdown().await;
}

#[tokio::test]
async fn test_open_without_plate_is_bad_request() {
    let t = create_test_app().await;
    let (status, _) = call(&t.app, "POST", "/api/v1/cameras/1/open", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    t.registry.shutdown().await;
}

#[tokio::test]
async fn test_manual_open_then_close_is_recorded() {
    let t = create_test_app().await;
    let handle = t.registry.directory().get("1").unwrap();
    let mut snapshots = handle.subscribe();

    let (status, body) = call(
        &t.app,
        "POST",
        "/api/v1/cameras/1/open",
        Some(json!({"plate_text": "30A12345"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["action"], "open");

    let snap = tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|s| s.state == GateState::Open),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert!(snap.barrier.is_open);
    assert_eq!(snap.vehicle_info.unwrap().customer_type.as_deref(), Some("regular"));

    let (status, _) = call(&t.app, "POST", "/api/v1/cameras/1/close", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|s| s.state == GateState::Idle && s.plate.is_none()),
    )
    .await
    .unwrap()
    .unwrap();

    let (status, body) = call(&t.app, "GET", "/api/v1/decisions?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    let decisions = body["data"].as_array().unwrap();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0]["action"], "close");
    assert_eq!(decisions[1]["action"], "open");
    assert_eq!(decisions[1]["plate_text"], "30A12345");
    assert_eq!(decisions[1]["plate_source"], "manual");
    assert_eq!(decisions[1]["trigger"], "manual");
    assert_eq!(decisions[1]["outcome"], "ok");

    let (_, body) = call(&t.app, "GET", "/api/v1/decisions?camera_id=2", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    t.registry.shutdown().await;
}
