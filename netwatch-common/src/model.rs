//! Topology and status data model (spec.md §3).
//!
//! Devices, Areas and Links form a bipartite reference graph: Links
//! reference Devices and Areas, Devices reference Areas. Everything here is
//! modeled as a flat record keyed by an opaque `id`; resolution happens by
//! lookup on every read, never via back-pointers, so deletions are
//! tolerated rather than needing cascade logic.

use serde::{Deserialize, Serialize};

/// A device's role, selecting nothing on its own but informative for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    WirelessAntenna,
    WifiSoho,
    Router,
    WifiOutdoor,
}

/// Criticality selects a device's probe interval (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Critical,
    High,
    Normal,
    Low,
}

impl Criticality {
    /// Probe interval in seconds. These exact values are required by
    /// spec.md §3 unless a device-specific interval is configured.
    pub fn interval_seconds(self) -> u64 {
        match self {
            Criticality::Critical => 30,
            Criticality::High => 60,
            Criticality::Normal => 120,
            Criticality::Low => 300,
        }
    }

    /// Dispatch priority used by the scheduler (spec.md §4.6); higher wins.
    pub fn priority(self) -> u8 {
        match self {
            Criticality::Critical => 4,
            Criticality::High => 3,
            Criticality::Normal => 2,
            Criticality::Low => 1,
        }
    }
}

/// Latency/packet-loss thresholds used to classify a probe (spec.md §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub latency: LatencyThresholds,
    pub packet_loss: PacketLossThresholds,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencyThresholds {
    pub good: f64,
    pub degraded: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PacketLossThresholds {
    pub good: f64,
    pub degraded: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            latency: LatencyThresholds {
                good: 50.0,
                degraded: 150.0,
            },
            packet_loss: PacketLossThresholds {
                good: 1.0,
                degraded: 5.0,
            },
        }
    }
}

/// SNMP protocol version, when `snmp_enabled` is set on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SnmpVersion {
    V1,
    V2,
    V3,
}

impl TryFrom<u8> for SnmpVersion {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(SnmpVersion::V1),
            2 => Ok(SnmpVersion::V2),
            3 => Ok(SnmpVersion::V3),
            other => Err(format!("invalid SNMP version: {other}")),
        }
    }
}

impl From<SnmpVersion> for u8 {
    fn from(value: SnmpVersion) -> Self {
        match value {
            SnmpVersion::V1 => 1,
            SnmpVersion::V2 => 2,
            SnmpVersion::V3 => 3,
        }
    }
}

/// A network device under management. Owned by Config; `id` is globally
/// unique, `area_id` must reference an existing Area.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub area_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub ip: String,
    pub criticality: Criticality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp_community: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp_version: Option<SnmpVersion>,
}

impl Device {
    /// `device.ip` with any `:port` suffix stripped, per spec.md §3/§4.5.
    pub fn probe_ip(&self) -> &str {
        self.ip.split(':').next().unwrap_or(&self.ip)
    }

    pub fn snmp_enabled(&self) -> bool {
        self.snmp_enabled.unwrap_or(false)
    }
}

/// A logical grouping of devices. No probe state of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum AreaType {
    Homes,
    #[serde(rename = "PisoWiFi Vendo")]
    PisoWifiVendo,
    Schools,
    #[serde(rename = "Server/Relay")]
    ServerRelay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub area_type: AreaType,
    pub lat: f64,
    pub lng: f64,
}

/// One side of a Link. May pin to an Area alone, or to a specific Device
/// (optionally an interface on it).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A link between two endpoints. Deserialization upgrades the legacy
/// `{from, to}` area-only shape into `endpoints: [Endpoint; 2]`
/// (spec.md §3, §9 "Polymorphism").
#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub id: String,
    pub endpoints: [Endpoint; 2],
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawLink {
            id: String,
            #[serde(default)]
            endpoints: Option<[Endpoint; 2]>,
            #[serde(default)]
            from: Option<String>,
            #[serde(default)]
            to: Option<String>,
            #[serde(default, rename = "type")]
            link_type: Option<String>,
            #[serde(default)]
            metadata: Option<serde_json::Value>,
        }

        let raw = RawLink::deserialize(deserializer)?;
        let endpoints = match raw.endpoints {
            Some(endpoints) => endpoints,
            None => {
                let from = raw.from.ok_or_else(|| {
                    serde::de::Error::custom(
                        "link must have either `endpoints` or legacy `from`/`to`",
                    )
                })?;
                let to = raw.to.ok_or_else(|| {
                    serde::de::Error::custom(
                        "link must have either `endpoints` or legacy `from`/`to`",
                    )
                })?;
                [
                    Endpoint {
                        area_id: Some(from),
                        ..Default::default()
                    },
                    Endpoint {
                        area_id: Some(to),
                        ..Default::default()
                    },
                ]
            }
        };

        Ok(Link {
            id: raw.id,
            endpoints,
            link_type: raw.link_type,
            metadata: raw.metadata,
        })
    }
}

/// A completed, classified reachability state (spec.md §3). `up`/`degraded`
/// carry latency and packet loss; `down` may lack both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Degraded,
    Down,
    /// Not part of the source data model, but needed by status derivation
    /// (spec.md §4.9) for devices that have never completed a probe.
    Unknown,
}

/// Output of one probe (ephemeral). Produced by the Prober, consumed by the
/// cache and batch writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub device_id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_loss: Option<f64>,
    pub timestamp: i64,
}

/// The cache's live view of a device: a ProbeResult plus presentation
/// fields (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub device_id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_loss: Option<f64>,
    pub timestamp: i64,
    pub last_checked: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_duration: Option<i64>,
}

impl DeviceStatus {
    pub fn from_probe_result(result: &ProbeResult) -> Self {
        Self {
            device_id: result.device_id.clone(),
            status: result.status,
            latency_ms: result.latency_ms,
            packet_loss: result.packet_loss,
            timestamp: result.timestamp,
            last_checked: crate::time::to_iso8601(result.timestamp),
            offline_duration: None,
        }
    }
}

/// A persisted, immutable-until-expiry probe record (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow {
    pub device_id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_loss: Option<f64>,
    pub timestamp: i64,
}

impl From<&ProbeResult> for HistoryRow {
    fn from(result: &ProbeResult) -> Self {
        Self {
            device_id: result.device_id.clone(),
            status: result.status,
            latency_ms: result.latency_ms,
            packet_loss: result.packet_loss,
            timestamp: result.timestamp,
        }
    }
}

/// A closed time-bucket summary (spec.md §3). `(device_id, period_type,
/// period_start)` is a unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Hourly,
    Daily,
}

impl PeriodType {
    pub fn bucket_size_ms(self) -> i64 {
        match self {
            PeriodType::Hourly => 3_600_000,
            PeriodType::Daily => 86_400_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub device_id: String,
    pub period_type: PeriodType,
    pub period_start: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_packet_loss: Option<f64>,
    pub uptime_percent: f64,
    pub ping_count: i64,
    pub down_count: i64,
    pub degraded_count: i64,
}

/// SNMP interface operational status, the two RFC1213 values this engine
/// distinguishes (spec.md §3 `operStatus ∈ {up=1, down=2, ...}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum OperStatus {
    Up,
    Down,
    Other(i32),
}

impl TryFrom<i32> for OperStatus {
    type Error = std::convert::Infallible;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            1 => OperStatus::Up,
            2 => OperStatus::Down,
            other => OperStatus::Other(other),
        })
    }
}

impl From<OperStatus> for i32 {
    fn from(value: OperStatus) -> Self {
        match value {
            OperStatus::Up => 1,
            OperStatus::Down => 2,
            OperStatus::Other(v) => v,
        }
    }
}

/// A single SNMP interface sample (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceReading {
    pub device_id: String,
    pub if_index: i64,
    pub if_name: String,
    pub oper_status: OperStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mbps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_octets: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_octets: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_errors: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_errors: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_discards: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_discards: Option<i64>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlappingEventType {
    SpeedChange,
    StatusChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Emitted by the flapping detector (spec.md §3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlappingEvent {
    pub device_id: String,
    pub if_index: i64,
    pub if_name: String,
    pub event_type: FlappingEventType,
    pub from: serde_json::Value,
    pub to: serde_json::Value,
    pub severity: Severity,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criticality_intervals_match_spec() {
        assert_eq!(Criticality::Critical.interval_seconds(), 30);
        assert_eq!(Criticality::High.interval_seconds(), 60);
        assert_eq!(Criticality::Normal.interval_seconds(), 120);
        assert_eq!(Criticality::Low.interval_seconds(), 300);
    }

    #[test]
    fn device_probe_ip_strips_port() {
        let device = Device {
            id: "d1".into(),
            area_id: "a1".into(),
            name: "Router".into(),
            device_type: DeviceType::Router,
            ip: "192.168.1.1:8080".into(),
            criticality: Criticality::Normal,
            thresholds: None,
            snmp_enabled: None,
            snmp_community: None,
            snmp_version: None,
        };
        assert_eq!(device.probe_ip(), "192.168.1.1");
    }

    #[test]
    fn link_upgrades_legacy_from_to() {
        let json = r#"{"id": "l1", "from": "area1", "to": "area2"}"#;
        let link: Link = serde_json::from_str(json).unwrap();
        assert_eq!(link.endpoints[0].area_id.as_deref(), Some("area1"));
        assert_eq!(link.endpoints[1].area_id.as_deref(), Some("area2"));
        assert!(link.endpoints[0].device_id.is_none());
    }

    #[test]
    fn link_accepts_modern_endpoints_shape() {
        let json = r#"{
            "id": "l2",
            "endpoints": [
                {"deviceId": "d1", "interface": "eth0"},
                {"areaId": "a2"}
            ]
        }"#;
        let link: Link = serde_json::from_str(json).unwrap();
        assert_eq!(link.endpoints[0].device_id.as_deref(), Some("d1"));
        assert_eq!(link.endpoints[1].area_id.as_deref(), Some("a2"));
    }

    #[test]
    fn oper_status_round_trips_unknown_values() {
        let status = OperStatus::try_from(3).unwrap();
        assert_eq!(status, OperStatus::Other(3));
        let back: i32 = status.into();
        assert_eq!(back, 3);
    }

    #[test]
    fn device_status_from_probe_result_renders_iso8601() {
        let result = ProbeResult {
            device_id: "d1".into(),
            status: Status::Up,
            latency_ms: Some(12.5),
            packet_loss: Some(0.0),
            timestamp: 1_700_000_000_000,
        };
        let status = DeviceStatus::from_probe_result(&result);
        assert_eq!(status.device_id, "d1");
        assert!(status.last_checked.starts_with("2023-11-14"));
        assert!(status.offline_duration.is_none());
    }
}
