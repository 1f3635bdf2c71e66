//! Operator-facing HTTP surface: status page, control endpoints, health,
//! and the Prometheus scrape endpoint.

pub mod control;
pub mod health;
pub mod status;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tracing::error;

use crate::metrics::{MetricsHandle, PrometheusReporter};
use crate::storage::GatewayStore;

#[derive(Clone)]
pub struct AppState {
    pub store: GatewayStore,
    pub metrics: MetricsHandle,
    pub reporter: Arc<PrometheusReporter>,
    pub shutdown: watch::Receiver<bool>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status::view_certificates))
        .route("/config", get(status::view_config))
        .route("/kill", post(control::kill))
        .route("/restart", post(control::restart))
        .route("/override", post(control::override_certificate))
        .route("/health", get(health::health))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

async fn metrics_text(State(state): State<AppState>) -> Response {
    match state.reporter.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
