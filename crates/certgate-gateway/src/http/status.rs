//! Status page: the held-certificate queue as HTML for browsers or JSON
//! under `Accept: application/json`.

use std::collections::HashMap;
use std::fmt::Write as _;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::DateTime;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use super::control::authorize;
use super::AppState;
use crate::storage::{unix_timestamp_ms, CertificateRecord};

#[derive(serde::Deserialize)]
pub struct KeyQuery {
    key: Option<String>,
}

#[derive(Serialize)]
pub struct CertificateData {
    config: ConfigView,
    scheduler_active: bool,
    chain_totals: HashMap<u32, ChainInfo>,
    certificates: Vec<CertificateView>,
}

#[derive(Serialize)]
struct ConfigView {
    delay_seconds: String,
    delay: String,
    current_time: String,
}

#[derive(Serialize)]
struct ChainInfo {
    total_amount: String,
    formatted_total: String,
    cert_count: usize,
}

#[derive(Serialize)]
struct CertificateView {
    id: i64,
    network_id: u32,
    height: u64,
    cert_id: String,
    received_at: String,
    will_send_at: String,
    processed: bool,
    bridge_exit_count: usize,
    imported_bridge_exit_count: usize,
    tokens: Vec<TokenExit>,
    metadata: Value,
}

#[derive(Serialize)]
struct TokenExit {
    token_address: String,
    amount: String,
    amount_formatted: String,
}

pub async fn view_certificates(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize(&state.store, "data_key", query.key.as_deref()).await {
        return response;
    }

    let data = match load_certificate_data(&state).await {
        Ok(data) => data,
        Err(err) => {
            error!(error = %err, "failed to load certificate data");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    };

    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));

    if wants_json {
        Json(data).into_response()
    } else {
        Html(render_html(&data)).into_response()
    }
}

pub async fn view_config(State(state): State<AppState>) -> Response {
    match state.store.get_config("delay_seconds").await {
        Ok(delay) => Json(json!({"delay_seconds": delay})).into_response(),
        Err(err) => {
            error!(error = %err, "failed to read delay configuration");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}

async fn load_certificate_data(state: &AppState) -> Result<CertificateData, crate::storage::StoreError> {
    let scheduler_active = state.store.get_scheduler_flag().await.unwrap_or(true);

    let delay_raw = state.store.get_config("delay_seconds").await?;
    let delay_seconds: i64 = delay_raw.parse().unwrap_or_default();

    let records = state.store.list_all_descending().await?;

    let mut chain_totals: HashMap<u32, ChainInfo> = HashMap::new();
    let mut certificates = Vec::with_capacity(records.len());

    for record in records {
        let view = build_view(&record, delay_seconds);

        if record.processed_at.is_none() && view.network_id > 0 {
            let total: BigUint = view
                .tokens
                .iter()
                .filter_map(|t| t.amount.parse::<BigUint>().ok())
                .sum();
            let entry = chain_totals.entry(view.network_id).or_insert(ChainInfo {
                total_amount: "0".into(),
                formatted_total: String::new(),
                cert_count: 0,
            });
            entry.cert_count += 1;
            let mut new_total: BigUint = entry.total_amount.parse().unwrap_or_default();
            new_total += total;
            entry.formatted_total = format_amount(&new_total);
            entry.total_amount = new_total.to_string();
        }

        certificates.push(view);
    }

    Ok(CertificateData {
        config: ConfigView {
            delay_seconds: delay_raw,
            delay: humantime::format_duration(std::time::Duration::from_secs(
                delay_seconds.max(0) as u64,
            ))
            .to_string(),
            current_time: format_ms(unix_timestamp_ms()),
        },
        scheduler_active,
        chain_totals,
        certificates,
    })
}

fn build_view(record: &CertificateRecord, delay_seconds: i64) -> CertificateView {
    let metadata: Value = serde_json::from_str(&record.metadata).unwrap_or(Value::Null);

    let network_id = metadata
        .get("network_id")
        .and_then(Value::as_u64)
        .unwrap_or_default() as u32;
    let height = metadata
        .get("height")
        .and_then(Value::as_u64)
        .unwrap_or_default();

    // per-token totals across both exit directions
    let mut token_totals: HashMap<String, BigUint> = HashMap::new();
    for key in ["bridge_exits", "imported_bridge_exits"] {
        if let Some(exits) = metadata.get(key).and_then(Value::as_array) {
            for exit in exits {
                let token = exit
                    .get("token_address")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if let Some(amount) = exit
                    .get("amount")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    *token_totals.entry(token).or_default() += amount;
                }
            }
        }
    }

    let mut tokens: Vec<TokenExit> = token_totals
        .into_iter()
        .map(|(token_address, amount)| TokenExit {
            amount_formatted: format_amount(&amount),
            amount: amount.to_string(),
            token_address,
        })
        .collect();
    tokens.sort_by(|a, b| a.token_address.cmp(&b.token_address));

    CertificateView {
        id: record.id,
        network_id,
        height,
        cert_id: format!("0x{}", hex::encode(&record.cert_id)),
        received_at: format_ms(record.received_at),
        will_send_at: format_ms(record.received_at + delay_seconds * 1000),
        processed: record.processed_at.is_some(),
        bridge_exit_count: metadata
            .get("bridge_exits_count")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize,
        imported_bridge_exit_count: metadata
            .get("imported_bridge_exits_count")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize,
        tokens,
        metadata,
    }
}

/// Human-readable amount with wei / Gwei / ETH tiers.
fn format_amount(wei: &BigUint) -> String {
    let one_gwei = BigUint::from(1_000_000_000u64);
    let thousand_gwei = BigUint::from(1_000_000_000_000u64);

    if wei < &one_gwei {
        return format!("{wei} wei");
    }
    if wei < &thousand_gwei {
        let gwei = wei.to_f64().unwrap_or(f64::MAX) / 1e9;
        return format!("{gwei:.3} Gwei");
    }
    let eth = wei.to_f64().unwrap_or(f64::MAX) / 1e18;
    format!("{eth:.6} ETH")
}

fn format_ms(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn render_html(data: &CertificateData) -> String {
    let mut page = String::new();
    page.push_str("<!DOCTYPE html><html><head><title>Certificate Gateway</title>");
    page.push_str("<style>body{font-family:sans-serif;margin:2em}table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:4px 8px;text-align:left}</style>");
    page.push_str("</head><body><h1>Certificate Gateway</h1>");

    let _ = write!(
        page,
        "<p>Scheduler active: <strong>{}</strong> &middot; Delay: {} &middot; Current time: {}</p>",
        data.scheduler_active, data.config.delay, data.config.current_time
    );

    page.push_str("<h2>Pending totals by chain</h2><table><tr><th>Network</th><th>Certificates</th><th>Total</th></tr>");
    for (network, info) in &data.chain_totals {
        let _ = write!(
            page,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            network, info.cert_count, info.formatted_total
        );
    }
    page.push_str("</table>");

    page.push_str("<h2>Certificates</h2><table><tr><th>ID</th><th>Network</th><th>Height</th><th>Received</th><th>Will send</th><th>Processed</th><th>Tokens</th></tr>");
    for cert in &data.certificates {
        let tokens = cert
            .tokens
            .iter()
            .map(|t| format!("{} {}", t.token_address, t.amount_formatted))
            .collect::<Vec<_>>()
            .join("<br>");
        let _ = write!(
            page,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            cert.id, cert.network_id, cert.height, cert.received_at, cert.will_send_at,
            cert.processed, tokens
        );
    }
    page.push_str("</table></body></html>");
    page
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn amount_formatting_tiers() {
        assert_eq!(format_amount(&BigUint::from(10u32)), "10 wei");
        assert_eq!(
            format_amount(&BigUint::from(1_500_000_000u64)),
            "1.500 Gwei"
        );
        assert_eq!(
            format_amount(&BigUint::from(2_000_000_000_000_000_000u64)),
            "2.000000 ETH"
        );
    }

    #[test]
    fn view_derives_fields_from_metadata() {
        let record = CertificateRecord {
            id: 4,
            raw_request: vec![],
            metadata: r#"{"network_id":1,"height":9,"bridge_exits_count":1,"bridge_exits":[{"amount":"1000","token_address":"0xaa"}]}"#.to_string(),
            cert_id: vec![0xab; 32],
            received_at: 1_700_000_000_000,
            processed_at: None,
        };

        let view = build_view(&record, 60);
        assert_eq!(view.network_id, 1);
        assert_eq!(view.height, 9);
        assert_eq!(view.bridge_exit_count, 1);
        assert_eq!(view.tokens.len(), 1);
        assert_eq!(view.tokens[0].amount, "1000");
        assert!(!view.processed);
    }
}
