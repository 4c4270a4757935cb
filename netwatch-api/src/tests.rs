use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use netwatch_batch::BatchWriter;
use netwatch_cache::CacheStore;
use netwatch_common::{Criticality, Device, DeviceType, Status, Thresholds};
use netwatch_config::ConfigStore;
use netwatch_flapping::FlappingDetector;
use netwatch_history::HistoryStore;
use netwatch_ingest::Ingestor;
use netwatch_prober::{Prober, ProbeOutcome};
use netwatch_scheduler::Scheduler;
use tower::ServiceExt;

use super::*;

struct AlwaysUpProber;

#[async_trait]
impl Prober for AlwaysUpProber {
    async fn probe(&self, _device: &Device, _thresholds: &Thresholds) -> ProbeOutcome {
        ProbeOutcome {
            status: Status::Up,
            latency_ms: Some(5.0),
            packet_loss: Some(0.0),
        }
    }
}

fn device(id: &str, ip: &str) -> Device {
    Device {
        id: id.to_string(),
        area_id: "a1".into(),
        name: id.to_string(),
        device_type: DeviceType::Router,
        ip: ip.to_string(),
        criticality: Criticality::Critical,
        thresholds: None,
        snmp_enabled: None,
        snmp_community: None,
        snmp_version: None,
    }
}

async fn harness() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ConfigStore::open(dir.path().join("config.json")).await.unwrap());

    let mut snapshot = (*config.load().await).clone();
    snapshot.devices = vec![device("d1", "10.0.0.1")];
    config.save(snapshot).await.unwrap();

    let cache = Arc::new(CacheStore::new());
    let history = Arc::new(HistoryStore::open(dir.path().join("history.db")).await.unwrap());
    let batch = Arc::new(BatchWriter::new(history.clone()));
    let prober: Arc<dyn Prober> = Arc::new(AlwaysUpProber);
    let scheduler = Arc::new(Scheduler::new(config.clone(), cache.clone(), batch.clone(), prober));
    let flapping = Arc::new(FlappingDetector::new(history.clone(), cache.clone()));
    let ingestor = Arc::new(
        Ingestor::new(config.clone(), cache.clone(), batch.clone())
            .with_flapping_sink(flapping.clone()),
    );

    let state = AppState::new(
        config,
        cache,
        history,
        batch,
        scheduler,
        ingestor,
        flapping,
        dir.path().to_path_buf(),
    );
    (state, dir)
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let (state, _dir) = harness().await;
    let router = create_router(state);

    let response = router
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_endpoint_sets_etag_and_honors_if_none_match() {
    let (state, _dir) = harness().await;
    let router = create_router(state);

    let response = router
        .clone()
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let etag = response
        .headers()
        .get(header::ETAG)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let response = router
        .oneshot(
            Request::get("/api/status")
                .header(header::IF_NONE_MATCH, etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn config_round_trip_reloads_scheduler_p14() {
    let (state, _dir) = harness().await;
    let scheduler = state.scheduler.clone();
    let router = create_router(state.clone());

    let response = router
        .clone()
        .oneshot(Request::get("/api/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let mut snapshot: netwatch_config::ConfigSnapshot = serde_json::from_slice(&body).unwrap();
    snapshot.devices.push(device("d2", "10.0.0.2"));

    let response = router
        .oneshot(
            Request::post("/api/config")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&snapshot).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(state.config.load().await.devices.len(), 2);
    scheduler.reload().await;
    assert_eq!(scheduler.stats().tracked_devices, 2);
}

#[tokio::test]
async fn config_post_with_invalid_body_is_rejected() {
    let (state, _dir) = harness().await;
    let router = create_router(state);

    let response = router
        .oneshot(
            Request::post("/api/config")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn metrics_ping_ingests_and_updates_cache() {
    let (state, _dir) = harness().await;
    let cache = state.cache.clone();
    let router = create_router(state);

    let sample = serde_json::json!([{
        "name": "ping",
        "tags": {"host": "10.0.0.1"},
        "fields": {"average_response_ms": 5.0, "percent_packet_loss": 0.0},
        "timestamp": 1_700_000_000_000i64,
    }]);

    let response = router
        .oneshot(
            Request::post("/api/metrics/ping")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(sample.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let now = netwatch_common::current_timestamp_millis();
    assert!(cache.get_device_status("d1", now).is_some());
}

#[tokio::test]
async fn system_stats_shape_has_four_top_level_keys() {
    let (state, _dir) = harness().await;
    let router = create_router(state);

    let response = router
        .oneshot(Request::get("/api/system/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let object = value.as_object().unwrap();
    assert!(object.contains_key("scheduler"));
    assert!(object.contains_key("cache"));
    assert!(object.contains_key("batch"));
    assert!(object.contains_key("ingestor"));
}

#[tokio::test]
async fn export_then_import_round_trips_through_maintenance_window() {
    let (state, _dir) = harness().await;
    let router = create_router(state.clone());

    let response = router
        .clone()
        .oneshot(Request::get("/api/export").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let zip_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let boundary = "tests-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"archive\"; filename=\"export.zip\"\r\nContent-Type: application/zip\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&zip_bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let response = router
        .oneshot(
            Request::post("/api/import")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(state.config.load().await.devices.len(), 1);
}
