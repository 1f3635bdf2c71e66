#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Tests for the operator HTTP surface: auth, the three-attempt
//! kill/restart interlock, overrides, health, config, and metrics.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;

use certgate_gateway::auth;
use certgate_gateway::http::{build_router, AppState};
use certgate_gateway::metrics::{MetricsUpdater, PrometheusReporter};
use certgate_gateway::storage::GatewayStore;

struct TestApp {
    router: axum::Router,
    store: GatewayStore,
    shutdown_tx: watch::Sender<bool>,
}

async fn test_app() -> TestApp {
    let store = GatewayStore::open_in_memory().await.unwrap();

    for (name, key) in [
        ("kill_switch_api_key", "kill-secret"),
        ("kill_restart_api_key", "restart-secret"),
        ("data_key", "data-secret"),
        ("certificate_override_key", "override-secret"),
    ] {
        store
            .set_credential(name, &auth::hash_key(key).unwrap())
            .await
            .unwrap();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reporter = Arc::new(PrometheusReporter::new(&[1]).unwrap());
    let metrics = MetricsUpdater::new(store.clone(), Arc::clone(&reporter))
        .start(shutdown_rx.clone());

    let router = build_router(AppState {
        store: store.clone(),
        metrics,
        reporter,
        shutdown: shutdown_rx,
    });

    TestApp {
        router,
        store,
        shutdown_tx,
    }
}

async fn request(app: &TestApp, method: Method, uri: &str) -> (StatusCode, String) {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&body).into_owned())
}

// =========================================================================
// Kill / restart interlock
// =========================================================================

#[tokio::test]
async fn third_kill_attempt_within_window_flips_the_flag() {
    let app = test_app().await;

    for expected_remaining in [2, 1] {
        let (status, body) = request(&app, Method::POST, "/kill?key=kill-secret").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "attempt recorded");
        assert_eq!(json["attempts_remaining"], expected_remaining);
        // the first and second attempts must not flip the flag
        assert!(app.store.get_scheduler_flag().await.unwrap());
    }

    let (status, body) = request(&app, Method::POST, "/kill?key=kill-secret").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "killing scheduler");
    assert!(!app.store.get_scheduler_flag().await.unwrap());

    // three restarts bring it back
    for _ in 0..2 {
        request(&app, Method::POST, "/restart?key=restart-secret").await;
        assert!(!app.store.get_scheduler_flag().await.unwrap());
    }
    let (status, body) = request(&app, Method::POST, "/restart?key=restart-secret").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "restarting scheduler");
    assert!(app.store.get_scheduler_flag().await.unwrap());
}

#[tokio::test]
async fn wrong_or_missing_key_is_unauthorized_and_not_counted() {
    let app = test_app().await;

    let (status, _) = request(&app, Method::POST, "/kill?key=wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = request(&app, Method::POST, "/kill").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // a rejected attempt must not count toward the interlock
    for _ in 0..2 {
        request(&app, Method::POST, "/kill?key=kill-secret").await;
    }
    assert!(app.store.get_scheduler_flag().await.unwrap());
}

#[tokio::test]
async fn get_is_rejected_on_control_endpoints() {
    let app = test_app().await;

    for uri in ["/kill?key=kill-secret", "/restart?key=restart-secret", "/override?key=override-secret&cert_id=1"] {
        let (status, _) = request(&app, Method::GET, uri).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}

// =========================================================================
// Override
// =========================================================================

#[tokio::test]
async fn override_marks_certificate_processed() {
    let app = test_app().await;
    let id = app
        .store
        .insert_certificate(&[1, 2, 3], "{}", &[9u8; 32])
        .await
        .unwrap();

    let (status, body) = request(
        &app,
        Method::POST,
        &format!("/override?key=override-secret&cert_id={id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "override sent");

    assert!(app.store.list_unprocessed().await.unwrap().is_empty());
}

#[tokio::test]
async fn override_validates_cert_id_before_auth() {
    let app = test_app().await;

    let (status, _) = request(&app, Method::POST, "/override?key=override-secret").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(&app, Method::POST, "/override?key=override-secret&cert_id=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(&app, Method::POST, "/override?cert_id=1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =========================================================================
// Status, config, health, metrics
// =========================================================================

#[tokio::test]
async fn status_page_requires_data_key() {
    let app = test_app().await;

    let (status, _) = request(&app, Method::GET, "/").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = request(&app, Method::GET, "/?key=data-secret").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<!DOCTYPE html>"));
}

#[tokio::test]
async fn status_page_serves_json_when_asked() {
    let app = test_app().await;
    app.store
        .insert_certificate(&[1], r#"{"network_id":1,"height":4}"#, &[7u8; 32])
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/?key=data-secret")
                .header("accept", "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["scheduler_active"], true);
    assert_eq!(json["certificates"][0]["network_id"], 1);
    assert_eq!(json["config"]["delay_seconds"], "172800");
}

#[tokio::test]
async fn config_endpoint_reports_delay() {
    let app = test_app().await;

    let (status, body) = request(&app, Method::GET, "/config").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["delay_seconds"], "172800");
}

#[tokio::test]
async fn health_reflects_shutdown() {
    let app = test_app().await;

    let (status, body) = request(&app, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("ok"));

    app.shutdown_tx.send(true).unwrap();
    let (status, body) = request(&app, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("shutting down"));
}

#[tokio::test]
async fn metrics_endpoint_serves_text_exposition() {
    let app = test_app().await;

    let (status, body) = request(&app, Method::GET, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("certificate_total_count"));
    assert!(body.contains("network_1_total_eth"));
}
