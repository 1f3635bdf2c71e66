//! Kill-switch, restart, and override endpoints.
//!
//! All three require an API key in the `key` query parameter, checked
//! against its bcrypt-hashed credential. Kill and restart are guarded by a
//! rate-based confirm: three valid attempts within sixty seconds flip the
//! durable scheduler flag.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::AppState;
use crate::auth;
use crate::storage::GatewayStore;

const ATTEMPT_THRESHOLD: i64 = 3;
const ATTEMPT_WINDOW: Duration = Duration::from_secs(60);
const ATTEMPT_RETENTION: Duration = Duration::from_secs(300);

#[derive(Deserialize)]
pub struct KeyQuery {
    key: Option<String>,
}

#[derive(Deserialize)]
pub struct OverrideQuery {
    key: Option<String>,
    cert_id: Option<String>,
}

pub async fn kill(State(state): State<AppState>, Query(query): Query<KeyQuery>) -> Response {
    toggle_scheduler(&state, query.key.as_deref(), "kill", "kill_switch_api_key", false).await
}

pub async fn restart(State(state): State<AppState>, Query(query): Query<KeyQuery>) -> Response {
    toggle_scheduler(
        &state,
        query.key.as_deref(),
        "restart",
        "kill_restart_api_key",
        true,
    )
    .await
}

pub async fn override_certificate(
    State(state): State<AppState>,
    Query(query): Query<OverrideQuery>,
) -> Response {
    let response = handle_override(&state, &query).await;
    state.metrics.trigger();
    response
}

async fn handle_override(state: &AppState, query: &OverrideQuery) -> Response {
    let Some(cert_id_raw) = query.cert_id.as_deref().filter(|v| !v.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing certificate ID").into_response();
    };
    let Ok(cert_id) = cert_id_raw.parse::<i64>() else {
        return (StatusCode::BAD_REQUEST, "invalid certificate ID").into_response();
    };

    if let Err(response) =
        authorize(&state.store, "certificate_override_key", query.key.as_deref()).await
    {
        return response;
    }

    match state.store.mark_processed(cert_id).await {
        Ok(_) => {
            info!(id = cert_id, "certificate override applied");
            Json(json!({"status": "override sent"})).into_response()
        }
        Err(err) => {
            error!(id = cert_id, error = %err, "failed to apply certificate override");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}

async fn toggle_scheduler(
    state: &AppState,
    key: Option<&str>,
    kind: &str,
    credential: &str,
    target_active: bool,
) -> Response {
    if let Err(response) = authorize(&state.store, credential, key).await {
        return response;
    }

    if let Err(err) = state.store.record_attempt(kind).await {
        error!(kind, error = %err, "failed to record attempt");
    }
    if let Err(err) = state.store.prune_attempts(ATTEMPT_RETENTION).await {
        error!(kind, error = %err, "failed to prune old attempts");
    }

    let count = match state.store.count_recent_attempts(kind, ATTEMPT_WINDOW).await {
        Ok(count) => count,
        Err(err) => {
            error!(kind, error = %err, "failed to count recent attempts");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    };

    if count >= ATTEMPT_THRESHOLD {
        if let Err(err) = state.store.set_scheduler_flag(target_active).await {
            error!(kind, error = %err, "failed to update scheduler flag");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to update scheduler",
            )
                .into_response();
        }

        info!(kind, active = target_active, "scheduler flag updated");
        let (status, message) = if target_active {
            ("restarting scheduler", "Scheduler has been restarted")
        } else {
            ("killing scheduler", "Scheduler has been stopped")
        };
        return Json(json!({"status": status, "message": message})).into_response();
    }

    let remaining = ATTEMPT_THRESHOLD - count;
    let verb = if target_active { "restart" } else { "kill" };
    Json(json!({
        "status": "attempt recorded",
        "attempts": count,
        "attempts_remaining": remaining,
        "message": format!("Need {remaining} more attempts within 1 minute to {verb} scheduler"),
    }))
    .into_response()
}

/// Compare the supplied key against a stored bcrypt credential. The key
/// itself is never logged.
pub(super) async fn authorize(
    store: &GatewayStore,
    credential: &str,
    supplied: Option<&str>,
) -> Result<(), Response> {
    let Some(supplied) = supplied.filter(|key| !key.is_empty()) else {
        warn!(credential, "request missing API key");
        return Err((StatusCode::UNAUTHORIZED, "missing API key").into_response());
    };

    let stored = store.get_credential(credential).await.map_err(|err| {
        error!(credential, error = %err, "failed to load credential");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
    })?;

    if !auth::verify_key(supplied, &stored) {
        warn!(credential, "rejected request with invalid API key");
        return Err((StatusCode::UNAUTHORIZED, "invalid API key").into_response());
    }

    Ok(())
}
