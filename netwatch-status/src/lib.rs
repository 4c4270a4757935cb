//! Status derivation (C9): Area/Link status composition over a Config
//! snapshot and the current DeviceStatus set (spec.md §4.9).
//!
//! The composition itself (`area_status`, `link_status`, `compose`) is a
//! pure function of its inputs, grounded directly on spec.md §4.9's
//! algorithm text rather than any corpus file — the teacher
//! (`p13marc-zensight`) has no equivalent rollup. `enrich_offline_durations`
//! is the one piece that needs I/O (a history lookup per down device) and
//! lives in this crate anyway, since offline-duration attachment is part of
//! the same derivation step spec.md describes (§4.9 point 4) and gains
//! nothing from a separate crate.

use std::collections::HashMap;
use std::sync::Arc;

use netwatch_cache::CacheStore;
use netwatch_common::{AreaType, DeviceStatus, Status};
use netwatch_config::ConfigSnapshot;
use netwatch_history::HistoryStore;
use serde::Serialize;

/// Resolved status of one Area, carrying the DeviceStatus of every member
/// device for the map UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaStatus {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub area_type: AreaType,
    pub lat: f64,
    pub lng: f64,
    pub status: Status,
    pub devices: Vec<DeviceStatus>,
}

/// One endpoint of a resolved Link, after pinned-device/area lookup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    pub endpoints: [EndpointStatus; 2],
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusTree {
    pub areas: Vec<AreaStatus>,
    pub links: Vec<LinkStatus>,
}

/// `down` if any member is down; else `degraded` if any member is
/// degraded; else `up`. Devices with no recorded status (`unknown`) neither
/// raise nor lower the area (spec.md §4.9, P6).
fn area_status(members: &[Status]) -> Status {
    if members.iter().any(|s| *s == Status::Down) {
        Status::Down
    } else if members.iter().any(|s| *s == Status::Degraded) {
        Status::Degraded
    } else if members.iter().any(|s| *s == Status::Up) {
        Status::Up
    } else {
        Status::Unknown
    }
}

/// `down` > `degraded` > `up` > `unknown` over the two endpoint statuses
/// (spec.md §4.9, P8).
fn link_status(endpoints: [Status; 2]) -> Status {
    if endpoints.iter().any(|s| *s == Status::Down) {
        Status::Down
    } else if endpoints.iter().any(|s| *s == Status::Degraded) {
        Status::Degraded
    } else if endpoints.iter().any(|s| *s == Status::Up) {
        Status::Up
    } else {
        Status::Unknown
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Compose the full `{areas, links}` tree from a Config snapshot and the
/// current device statuses (indexed by `deviceId`). Devices absent from
/// `statuses` are treated as `unknown` with no latency/packet-loss
/// (spec.md §4.9 point 1).
pub fn compose(config: &ConfigSnapshot, statuses: &HashMap<String, DeviceStatus>) -> StatusTree {
    let unknown = |device_id: &str| DeviceStatus {
        device_id: device_id.to_string(),
        status: Status::Unknown,
        latency_ms: None,
        packet_loss: None,
        timestamp: 0,
        last_checked: String::new(),
        offline_duration: None,
    };

    let mut areas = Vec::with_capacity(config.areas.len());
    for area in &config.areas {
        let members: Vec<DeviceStatus> = config
            .devices
            .iter()
            .filter(|d| d.area_id == area.id)
            .map(|d| statuses.get(&d.id).cloned().unwrap_or_else(|| unknown(&d.id)))
            .collect();
        let status = area_status(&members.iter().map(|m| m.status).collect::<Vec<_>>());
        areas.push(AreaStatus {
            id: area.id.clone(),
            name: area.name.clone(),
            area_type: area.area_type,
            lat: area.lat,
            lng: area.lng,
            status,
            devices: members,
        });
    }

    // Endpoint resolution: a pinned deviceId wins; otherwise fall back to
    // the pinned areaId's rolled-up AreaStatus; otherwise unresolved
    // (spec.md §4.9 point 2).
    let area_status_by_id: HashMap<&str, Status> =
        areas.iter().map(|a| (a.id.as_str(), a.status)).collect();
    let device_status_by_id: HashMap<&str, &DeviceStatus> =
        statuses.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let known_area_ids: std::collections::HashSet<&str> =
        config.areas.iter().map(|a| a.id.as_str()).collect();
    let known_device_ids: std::collections::HashSet<&str> =
        config.devices.iter().map(|d| d.id.as_str()).collect();

    let mut links = Vec::with_capacity(config.links.len());
    'links: for link in &config.links {
        let mut resolved = Vec::with_capacity(2);
        let mut latencies: Vec<(String, f64)> = Vec::new();
        for endpoint in &link.endpoints {
            if let Some(device_id) = &endpoint.device_id {
                if !known_device_ids.contains(device_id.as_str()) {
                    // Link filtering: drop links referencing unknown
                    // devices/areas entirely (spec.md §4.9 point 5, P7).
                    continue 'links;
                }
                let status = device_status_by_id
                    .get(device_id.as_str())
                    .map(|d| d.status)
                    .unwrap_or(Status::Unknown);
                if let Some(latency) = device_status_by_id.get(device_id.as_str()).and_then(|d| d.latency_ms) {
                    latencies.push((device_id.clone(), latency));
                }
                resolved.push(EndpointStatus {
                    area_id: endpoint.area_id.clone(),
                    device_id: Some(device_id.clone()),
                    label: endpoint.label.clone(),
                    status,
                });
            } else if let Some(area_id) = &endpoint.area_id {
                if !known_area_ids.contains(area_id.as_str()) {
                    continue 'links;
                }
                let status = *area_status_by_id.get(area_id.as_str()).unwrap_or(&Status::Unknown);
                resolved.push(EndpointStatus {
                    area_id: Some(area_id.clone()),
                    device_id: None,
                    label: endpoint.label.clone(),
                    status,
                });
            } else {
                continue 'links;
            }
        }
        if resolved.len() != 2 {
            continue;
        }

        let endpoints: [EndpointStatus; 2] = [resolved[0].clone(), resolved[1].clone()];
        let statuses_pair = [endpoints[0].status, endpoints[1].status];

        // Average distinct device latencies: a link whose two endpoints
        // pin to the same device must not double-count it (DESIGN.md Open
        // Question 1).
        latencies.sort_by(|a, b| a.0.cmp(&b.0));
        latencies.dedup_by(|a, b| a.0 == b.0);
        let latency = if latencies.is_empty() {
            None
        } else {
            Some(round2(latencies.iter().map(|(_, v)| *v).sum::<f64>() / latencies.len() as f64))
        };

        links.push(LinkStatus {
            id: link.id.clone(),
            link_type: link.link_type.clone(),
            status: link_status(statuses_pair),
            latency,
            endpoints,
        });
    }

    StatusTree { areas, links }
}

/// Attach `offlineDuration` to every `down` entry of `statuses`, querying
/// the history store for the start of each device's current down streak
/// (spec.md §4.9 point 4, P9). Devices for which no streak boundary is
/// found (history has nothing, or raced ahead of the cache) are left
/// without an `offlineDuration`.
pub async fn enrich_offline_durations(
    history: &Arc<HistoryStore>,
    statuses: &mut HashMap<String, DeviceStatus>,
    now_ms: i64,
) {
    for status in statuses.values_mut() {
        if status.status != Status::Down {
            continue;
        }
        match history.down_streak_start(&status.device_id).await {
            Ok(Some(start)) => status.offline_duration = Some(now_ms - start),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(device_id = %status.device_id, error = %e, "offline duration lookup failed");
            }
        }
    }
}

/// Load every current DeviceStatus from the cache, falling back to C3's
/// `latest_per_device` for devices the cache has nothing for (spec.md §9
/// "Dual-store consistency").
pub async fn load_statuses(
    cache: &CacheStore,
    history: &Arc<HistoryStore>,
    config: &ConfigSnapshot,
    now_ms: i64,
) -> HashMap<String, DeviceStatus> {
    let mut statuses: HashMap<String, DeviceStatus> = cache
        .all_device_statuses(now_ms)
        .into_iter()
        .map(|s| (s.device_id.clone(), s))
        .collect();

    let missing: Vec<&str> = config
        .devices
        .iter()
        .map(|d| d.id.as_str())
        .filter(|id| !statuses.contains_key(*id))
        .collect();
    if !missing.is_empty() {
        if let Ok(rows) = history.latest_per_device(None, now_ms).await {
            for row in rows {
                if missing.contains(&row.device_id.as_str()) {
                    statuses.insert(row.device_id.clone(), DeviceStatus::from_probe_result(
                        &netwatch_common::ProbeResult {
                            device_id: row.device_id.clone(),
                            status: row.status,
                            latency_ms: row.latency_ms,
                            packet_loss: row.packet_loss,
                            timestamp: row.timestamp,
                        },
                    ));
                }
            }
        }
    }

    enrich_offline_durations(history, &mut statuses, now_ms).await;
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_common::{Area, AreaType, Criticality, Device, DeviceType, Endpoint, Link};

    fn device(id: &str, area_id: &str) -> Device {
        Device {
            id: id.into(),
            area_id: area_id.into(),
            name: id.into(),
            device_type: DeviceType::Router,
            ip: "10.0.0.1".into(),
            criticality: Criticality::Normal,
            thresholds: None,
            snmp_enabled: None,
            snmp_community: None,
            snmp_version: None,
        }
    }

    fn area(id: &str) -> Area {
        Area {
            id: id.into(),
            name: id.into(),
            area_type: AreaType::ServerRelay,
            lat: 0.0,
            lng: 0.0,
        }
    }

    fn status(device_id: &str, s: Status, latency: Option<f64>) -> DeviceStatus {
        DeviceStatus {
            device_id: device_id.into(),
            status: s,
            latency_ms: latency,
            packet_loss: Some(0.0),
            timestamp: 1_000,
            last_checked: "1970-01-01T00:00:01.000Z".into(),
            offline_duration: None,
        }
    }

    #[test]
    fn area_down_dominates_p6() {
        assert_eq!(area_status(&[Status::Up, Status::Down, Status::Degraded]), Status::Down);
        assert_eq!(area_status(&[Status::Up, Status::Degraded]), Status::Degraded);
        assert_eq!(area_status(&[Status::Up, Status::Unknown]), Status::Up);
        assert_eq!(area_status(&[Status::Unknown, Status::Unknown]), Status::Unknown);
    }

    #[test]
    fn link_composition_matches_p8() {
        assert_eq!(link_status([Status::Up, Status::Down]), Status::Down);
        assert_eq!(link_status([Status::Degraded, Status::Up]), Status::Degraded);
        assert_eq!(link_status([Status::Up, Status::Up]), Status::Up);
    }

    #[test]
    fn links_referencing_unknown_devices_are_dropped_p7() {
        let config = ConfigSnapshot {
            areas: vec![area("a1")],
            devices: vec![device("d1", "a1")],
            links: vec![Link {
                id: "l1".into(),
                endpoints: [
                    Endpoint { device_id: Some("d1".into()), ..Default::default() },
                    Endpoint { device_id: Some("ghost".into()), ..Default::default() },
                ],
                link_type: None,
                metadata: None,
            }],
            settings: Default::default(),
        };
        let statuses = HashMap::from([("d1".to_string(), status("d1", Status::Up, Some(10.0)))]);
        let tree = compose(&config, &statuses);
        assert!(tree.links.is_empty());
    }

    #[test]
    fn link_latency_averages_distinct_devices_only() {
        let config = ConfigSnapshot {
            areas: vec![area("a1")],
            devices: vec![device("d1", "a1"), device("d2", "a1")],
            links: vec![Link {
                id: "l1".into(),
                endpoints: [
                    Endpoint { device_id: Some("d1".into()), ..Default::default() },
                    Endpoint { device_id: Some("d1".into()), ..Default::default() },
                ],
                link_type: None,
                metadata: None,
            }],
            settings: Default::default(),
        };
        let statuses = HashMap::from([
            ("d1".to_string(), status("d1", Status::Up, Some(20.0))),
            ("d2".to_string(), status("d2", Status::Up, Some(999.0))),
        ]);
        let tree = compose(&config, &statuses);
        assert_eq!(tree.links[0].latency, Some(20.0));
    }

    #[test]
    fn area_endpoint_resolves_via_rolled_up_area_status() {
        let config = ConfigSnapshot {
            areas: vec![area("a1"), area("a2")],
            devices: vec![device("d1", "a1")],
            links: vec![Link {
                id: "l1".into(),
                endpoints: [
                    Endpoint { area_id: Some("a1".into()), ..Default::default() },
                    Endpoint { area_id: Some("a2".into()), ..Default::default() },
                ],
                link_type: None,
                metadata: None,
            }],
            settings: Default::default(),
        };
        let statuses = HashMap::from([("d1".to_string(), status("d1", Status::Down, None))]);
        let tree = compose(&config, &statuses);
        assert_eq!(tree.links[0].status, Status::Down);
    }

    #[tokio::test]
    async fn offline_duration_measures_current_streak_only_p9() {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path().join("h.db")).await.unwrap());
        history
            .insert_many(&[
                netwatch_common::HistoryRow { device_id: "d1".into(), status: Status::Up, latency_ms: Some(5.0), packet_loss: Some(0.0), timestamp: 1_000 },
                netwatch_common::HistoryRow { device_id: "d1".into(), status: Status::Down, latency_ms: None, packet_loss: None, timestamp: 5_000 },
            ])
            .await
            .unwrap();

        let mut statuses = HashMap::from([("d1".to_string(), status("d1", Status::Down, None))]);
        enrich_offline_durations(&history, &mut statuses, 15_000).await;
        assert_eq!(statuses["d1"].offline_duration, Some(10_000));
    }
}
