use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use netwatch_common::current_timestamp_millis;
use netwatch_history::Period;
use sha2::{Digest, Sha256};

use crate::state::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Render `body` with a content-hash ETag, honoring `If-None-Match` with a
/// `304` (spec.md §4.10 "`GET /api/status` → ... Cache-Control with a short
/// max-age and an ETag derived from a content hash").
fn etag_response(headers: &HeaderMap, body: &serde_json::Value) -> Response {
    let serialized = serde_json::to_vec(body).unwrap_or_default();
    let hash = Sha256::digest(&serialized);
    let etag = format!("\"{:x}\"", hash);

    if let Some(candidate) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if candidate == etag {
            return (
                StatusCode::NOT_MODIFIED,
                [(header::ETAG, etag)],
            )
                .into_response();
        }
    }

    (
        StatusCode::OK,
        [
            (header::ETAG, etag),
            (header::CACHE_CONTROL, "max-age=5".to_string()),
        ],
        Json(body.clone()),
    )
        .into_response()
}

pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let now = current_timestamp_millis();
    let config = state.config.load().await;
    let statuses =
        netwatch_status::load_statuses(&state.cache, &state.history, &config, now).await;
    let tree = netwatch_status::compose(&config, &statuses);
    let body = serde_json::to_value(&tree).unwrap_or_default();
    etag_response(&headers, &body)
}

pub async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let now = current_timestamp_millis();
    let config = state.config.load().await;
    let statuses =
        netwatch_status::load_statuses(&state.cache, &state.history, &config, now).await;
    let tree = netwatch_status::compose(&config, &statuses);
    let body = serde_json::json!({
        "status": tree,
        "config": &*config,
    });
    etag_response(&headers, &body)
}

#[derive(serde::Deserialize)]
pub struct HistoryQuery {
    period: Option<String>,
}

pub async fn history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let period = query
        .period
        .as_deref()
        .and_then(Period::parse)
        .unwrap_or(Period::OneHour);
    let now = current_timestamp_millis();

    match state.history.device_history(&device_id, period, now).await {
        Ok(result) => {
            let data = match result {
                netwatch_history::DeviceHistoryResult::Raw(rows) => {
                    serde_json::to_value(rows).unwrap_or_default()
                }
                netwatch_history::DeviceHistoryResult::Aggregated(aggregates) => {
                    serde_json::to_value(aggregates).unwrap_or_default()
                }
            };
            Json(serde_json::json!({
                "deviceId": device_id,
                "period": query.period.unwrap_or_else(|| "1h".to_string()),
                "data": data,
            }))
            .into_response()
        }
        Err(e) => {
            tracing::warn!(device = %device_id, error = %e, "history query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub async fn config_get(State(state): State<AppState>) -> Json<netwatch_config::ConfigSnapshot> {
    Json((*state.config.load().await).clone())
}

/// A successful `POST` triggers scheduler reload before returning `200`
/// (spec.md §4.10, P14). Parse/save failure returns `500` with the reason
/// and leaves the previous snapshot active (spec.md §7 `ConfigWriteRejected`).
pub async fn config_post(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Response {
    let snapshot: netwatch_config::ConfigSnapshot = match serde_json::from_slice(&body) {
        Ok(s) => s,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("invalid config: {e}"))
                .into_response();
        }
    };

    if let Err(e) = state.config.save(snapshot).await {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to save config: {e}"))
            .into_response();
    }

    state.scheduler.reload().await;
    StatusCode::OK.into_response()
}

pub async fn system_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "scheduler": state.scheduler.stats(),
        "cache": state.cache.stats(),
        "batch": state.batch.stats(),
        "ingestor": {
            "unknownHostTotal": state.ingestor.unknown_host_total(),
            "trackedInterfaces": state.flapping.tracked_interfaces(),
        },
    }))
}

pub async fn metrics_ping(
    State(state): State<AppState>,
    Json(samples): Json<Vec<netwatch_ingest::PingSample>>,
) -> StatusCode {
    let summary = state.ingestor.ingest_ping(samples).await;
    tracing::debug!(accepted = summary.accepted, unknown_host = summary.unknown_host, "ping ingest");
    StatusCode::NO_CONTENT
}

pub async fn metrics_snmp(
    State(state): State<AppState>,
    Json(samples): Json<Vec<netwatch_ingest::SnmpSample>>,
) -> StatusCode {
    let summary = state.ingestor.ingest_snmp(samples).await;
    tracing::debug!(accepted = summary.accepted, unknown_host = summary.unknown_host, "snmp ingest");
    StatusCode::NO_CONTENT
}

pub async fn snmp_interfaces(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Json<Vec<netwatch_common::InterfaceReading>> {
    let now = current_timestamp_millis();
    let mut readings = state.cache.interface_statuses_for_device(&device_id, now);
    if readings.is_empty() {
        readings = state
            .history
            .latest_interface_readings(&device_id)
            .await
            .unwrap_or_default();
    }
    Json(readings)
}

#[derive(serde::Deserialize)]
pub struct FlappingReportQuery {
    hours: Option<i64>,
}

/// Grouped per-`(deviceId, ifIndex)` flapping summary (spec.md §6 "Grouped
/// flapping summary").
pub async fn flapping_report(
    State(state): State<AppState>,
    Query(query): Query<FlappingReportQuery>,
) -> Response {
    let hours = query.hours.unwrap_or(24);
    let now = current_timestamp_millis();

    let events = match state.history.flapping_events_since(hours, now).await {
        Ok(events) => events,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let mut groups: HashMap<(String, i64), Vec<&netwatch_common::FlappingEvent>> = HashMap::new();
    for event in &events {
        groups
            .entry((event.device_id.clone(), event.if_index))
            .or_default()
            .push(event);
    }

    let report: Vec<serde_json::Value> = groups
        .into_iter()
        .map(|((device_id, if_index), events)| {
            let count = events.len();
            let latest = events.iter().max_by_key(|e| e.timestamp).unwrap();
            let max_severity = events.iter().map(|e| e.severity).max().unwrap();
            serde_json::json!({
                "deviceId": device_id,
                "ifIndex": if_index,
                "ifName": latest.if_name,
                "count": count,
                "maxSeverity": max_severity,
                "lastEvent": latest,
            })
        })
        .collect();

    Json(serde_json::json!({"hours": hours, "interfaces": report})).into_response()
}

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forward C2 pub/sub events verbatim with a channel tag. No snapshot on
/// connect, no replay, no acks (spec.md §4.10).
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut events = state.cache.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let envelope = serde_json::json!({
                    "channel": event.channel.as_str(),
                    "payload": event.payload,
                });
                if socket.send(Message::Text(envelope.to_string())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => continue,
                }
            }
        }
    }
}
