//! Push ingestor (C7): accepts external-collector POSTs under the
//! `/metrics/ping` and `/metrics/snmp` schemas, resolves the reporting host
//! to a `deviceId`, and feeds the same cache/history path a scheduled probe
//! would (spec.md §4.7).
//!
//! Grounded on `zenoh-bridge-snmp/src/poller.rs`'s separation of raw sample
//! parsing (`snmp_value_to_telemetry`-equivalent) from the transport/runner
//! plumbing — here the HTTP handler lives in the API crate, and this crate
//! owns only sample parsing, host resolution, and forwarding.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use netwatch_batch::BatchWriter;
use netwatch_cache::CacheStore;
use netwatch_common::{
    current_timestamp_millis, DeviceStatus, HistoryRow, InterfaceReading, OperStatus, ProbeResult,
};
use netwatch_config::{ConfigSnapshot, ConfigStore};
use serde::Deserialize;

/// `/metrics/ping` element (spec.md §4.7).
#[derive(Debug, Clone, Deserialize)]
pub struct PingSample {
    pub name: String,
    pub tags: PingTags,
    pub fields: PingFields,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingTags {
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingFields {
    pub average_response_ms: f64,
    #[serde(default)]
    pub percent_packet_loss: Option<f64>,
}

/// `/metrics/snmp` element (spec.md §4.7). `fields` is left as a raw JSON
/// object: the `"interface"` schema is parsed into an `InterfaceReading`
/// here; the `"ubiquiti_wireless"` schema is opaque and stored/forwarded
/// verbatim, matching what the cache's `wireless_status` slot already
/// expects.
#[derive(Debug, Clone, Deserialize)]
pub struct SnmpSample {
    pub name: String,
    pub tags: SnmpTags,
    #[serde(default)]
    pub fields: serde_json::Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpTags {
    pub hostname: String,
    #[serde(default)]
    pub if_name: Option<String>,
    #[serde(default)]
    pub if_index: Option<i64>,
    #[serde(default)]
    pub ssid: Option<String>,
}

/// Forwarding target for resolved SNMP interface readings (spec.md §4.8).
/// Kept as a trait, the same seam `netwatch_prober::Prober` uses, so this
/// crate never depends on the flapping detector's concrete type.
pub trait FlappingSink: Send + Sync {
    fn record(&self, reading: &InterfaceReading, now_ms: i64);
}

#[derive(Debug, Default, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub accepted: usize,
    pub unknown_host: usize,
}

pub struct Ingestor {
    config: Arc<ConfigStore>,
    cache: Arc<CacheStore>,
    batch: Arc<BatchWriter>,
    flapping: Option<Arc<dyn FlappingSink>>,
    unknown_host_total: AtomicU64,
}

impl Ingestor {
    pub fn new(config: Arc<ConfigStore>, cache: Arc<CacheStore>, batch: Arc<BatchWriter>) -> Self {
        Self {
            config,
            cache,
            batch,
            flapping: None,
            unknown_host_total: AtomicU64::new(0),
        }
    }

    pub fn with_flapping_sink(mut self, sink: Arc<dyn FlappingSink>) -> Self {
        self.flapping = Some(sink);
        self
    }

    /// Total samples dropped for an unresolved host (spec.md §8, open
    /// question: surfaced as a counter rather than a config-load alert).
    pub fn unknown_host_total(&self) -> u64 {
        self.unknown_host_total.load(Ordering::Relaxed)
    }

    /// Reverse lookup: the collector reports whatever string it was
    /// configured with, which may be the device's probe IP or its
    /// configured name (spec.md §8 "resolution uses whatever string the
    /// collector supplies").
    fn resolve<'a>(&self, snapshot: &'a ConfigSnapshot, host: &str) -> Option<&'a netwatch_common::Device> {
        snapshot
            .devices
            .iter()
            .find(|d| d.probe_ip() == host || d.name == host)
    }

    /// Parse and forward a `/metrics/ping` batch (spec.md §4.7).
    pub async fn ingest_ping(&self, samples: Vec<PingSample>) -> IngestSummary {
        let snapshot = self.config.load().await;
        let mut summary = IngestSummary::default();

        for sample in samples {
            let Some(device) = self.resolve(&snapshot, &sample.tags.host) else {
                self.unknown_host_total.fetch_add(1, Ordering::Relaxed);
                summary.unknown_host += 1;
                tracing::warn!(host = %sample.tags.host, "ping sample from unknown host, dropped");
                continue;
            };

            let thresholds = device.thresholds.unwrap_or(snapshot.settings.thresholds);
            let loss = sample.fields.percent_packet_loss.unwrap_or(0.0);
            let status = netwatch_prober::classify(sample.fields.average_response_ms, loss, &thresholds);

            let result = ProbeResult {
                device_id: device.id.clone(),
                status,
                latency_ms: Some(sample.fields.average_response_ms),
                packet_loss: sample.fields.percent_packet_loss,
                timestamp: sample.timestamp,
            };

            let now = current_timestamp_millis();
            self.cache.put_device_status(DeviceStatus::from_probe_result(&result), now);
            self.batch.push_probe(HistoryRow::from(&result)).await;
            summary.accepted += 1;
        }

        summary
    }

    /// Parse and forward a `/metrics/snmp` batch (spec.md §4.7).
    pub async fn ingest_snmp(&self, samples: Vec<SnmpSample>) -> IngestSummary {
        let snapshot = self.config.load().await;
        let mut summary = IngestSummary::default();

        for sample in samples {
            let Some(device) = self.resolve(&snapshot, &sample.tags.hostname) else {
                self.unknown_host_total.fetch_add(1, Ordering::Relaxed);
                summary.unknown_host += 1;
                tracing::warn!(host = %sample.tags.hostname, "snmp sample from unknown host, dropped");
                continue;
            };
            let device_id = device.id.clone();
            let now = current_timestamp_millis();

            match sample.name.as_str() {
                "interface" => {
                    let Some(reading) = parse_interface_reading(&device_id, &sample) else {
                        tracing::warn!(device = %device_id, "snmp interface sample missing ifIndex, dropped");
                        continue;
                    };
                    if let Some(sink) = &self.flapping {
                        sink.record(&reading, now);
                    }
                    self.cache.put_interface_status(reading.clone(), now);
                    self.batch.push_interface(reading).await;
                }
                "ubiquiti_wireless" => {
                    self.cache.put_wireless_status(&device_id, sample.fields.clone(), now);
                }
                other => {
                    tracing::debug!(name = other, "unrecognized snmp sample name, dropped");
                    continue;
                }
            }

            summary.accepted += 1;
        }

        summary
    }
}

fn parse_interface_reading(device_id: &str, sample: &SnmpSample) -> Option<InterfaceReading> {
    let if_index = sample.tags.if_index?;
    let if_name = sample.tags.if_name.clone().unwrap_or_default();
    let fields = sample.fields.as_object()?;

    let oper_status_raw = fields.get("ifOperStatus").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
    let oper_status = OperStatus::try_from(oper_status_raw).expect("OperStatus conversion is infallible");

    Some(InterfaceReading {
        device_id: device_id.to_string(),
        if_index,
        if_name,
        oper_status,
        speed_mbps: fields.get("ifSpeed").and_then(|v| v.as_f64()),
        in_octets: fields.get("ifInOctets").and_then(|v| v.as_i64()),
        out_octets: fields.get("ifOutOctets").and_then(|v| v.as_i64()),
        in_errors: fields.get("ifInErrors").and_then(|v| v.as_i64()),
        out_errors: fields.get("ifOutErrors").and_then(|v| v.as_i64()),
        in_discards: fields.get("ifInDiscards").and_then(|v| v.as_i64()),
        out_discards: fields.get("ifOutDiscards").and_then(|v| v.as_i64()),
        timestamp: sample.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_common::{AreaType, Area, Criticality, Device, DeviceType, Endpoint, Link};

    async fn harness() -> (Arc<ConfigStore>, Arc<CacheStore>, Arc<BatchWriter>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("config.json")).await.unwrap());
        let cache = Arc::new(CacheStore::new());
        let history = Arc::new(netwatch_history::HistoryStore::open(dir.path().join("history.db")).await.unwrap());
        let batch = Arc::new(BatchWriter::new(history));

        let mut snapshot = (*config.load().await).clone();
        snapshot.areas = vec![Area {
            id: "a1".into(),
            name: "Area".into(),
            area_type: AreaType::Homes,
            lat: 0.0,
            lng: 0.0,
        }];
        snapshot.devices = vec![Device {
            id: "d1".into(),
            area_id: "a1".into(),
            name: "router-1".into(),
            device_type: DeviceType::Router,
            ip: "10.0.0.1".into(),
            criticality: Criticality::Normal,
            thresholds: None,
            snmp_enabled: Some(true),
            snmp_community: None,
            snmp_version: None,
        }];
        snapshot.links = vec![Link {
            id: "l1".into(),
            endpoints: [
                Endpoint { device_id: Some("d1".into()), ..Default::default() },
                Endpoint { area_id: Some("a1".into()), ..Default::default() },
            ],
            link_type: None,
            metadata: None,
        }];
        config.save(snapshot).await.unwrap();

        (config, cache, batch, dir)
    }

    #[tokio::test]
    async fn ping_sample_resolves_by_ip_and_classifies() {
        let (config, cache, batch, _dir) = harness().await;
        let ingestor = Ingestor::new(config, cache.clone(), batch);

        let summary = ingestor
            .ingest_ping(vec![PingSample {
                name: "ping".into(),
                tags: PingTags { host: "10.0.0.1".into() },
                fields: PingFields { average_response_ms: 30.0, percent_packet_loss: Some(0.0) },
                timestamp: 1_000,
            }])
            .await;

        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.unknown_host, 0);
        let status = cache.get_device_status("d1", 1_000).unwrap();
        assert_eq!(status.status, netwatch_common::Status::Up);
    }

    #[tokio::test]
    async fn unknown_host_is_dropped_and_counted() {
        let (config, cache, batch, _dir) = harness().await;
        let ingestor = Ingestor::new(config, cache, batch);

        let summary = ingestor
            .ingest_ping(vec![PingSample {
                name: "ping".into(),
                tags: PingTags { host: "99.99.99.99".into() },
                fields: PingFields { average_response_ms: 10.0, percent_packet_loss: None },
                timestamp: 1_000,
            }])
            .await;

        assert_eq!(summary.accepted, 0);
        assert_eq!(summary.unknown_host, 1);
        assert_eq!(ingestor.unknown_host_total(), 1);
    }

    #[tokio::test]
    async fn snmp_interface_sample_forwards_to_cache_and_flapping() {
        struct Recorder(std::sync::Mutex<Vec<InterfaceReading>>);
        impl FlappingSink for Recorder {
            fn record(&self, reading: &InterfaceReading, _now_ms: i64) {
                self.0.lock().unwrap().push(reading.clone());
            }
        }

        let (config, cache, batch, _dir) = harness().await;
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        let ingestor = Ingestor::new(config, cache.clone(), batch).with_flapping_sink(recorder.clone());

        let fields = serde_json::json!({
            "ifOperStatus": 1,
            "ifSpeed": 1000.0,
            "ifInOctets": 42,
        });

        let summary = ingestor
            .ingest_snmp(vec![SnmpSample {
                name: "interface".into(),
                tags: SnmpTags {
                    hostname: "router-1".into(),
                    if_name: Some("eth0".into()),
                    if_index: Some(5),
                    ssid: None,
                },
                fields,
                timestamp: 2_000,
            }])
            .await;

        assert_eq!(summary.accepted, 1);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
        let cached = cache.get_interface_status("d1", 5, 2_000).unwrap();
        assert_eq!(cached.speed_mbps, Some(1000.0));
    }
}
