//! Prober (C5): executes one ICMP probe and classifies the result
//! (spec.md §4.5).
//!
//! Grounded on `other_examples/d2c6ac05_ifpj-netwatch`'s `Probe` trait /
//! `IcmpProbe` impl (`surge_ping::ping`, async-trait) — the teacher itself
//! carries no probe code, so this is a pack enrichment built in the same
//! trait-per-mechanism shape the teacher uses elsewhere (its Zenoh bridges'
//! `Poller`/`Collector` structs).

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use netwatch_common::{Device, Status, Thresholds};
use regex::Regex;
use std::sync::OnceLock;

/// A strict IPv4 regex; invalid addresses never reach a socket (spec.md
/// §4.5).
fn ipv4_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)(\.(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)){3}$")
            .expect("static IPv4 regex is valid")
    })
}

/// Result of one probe attempt, before it is stamped with a timestamp and
/// turned into a `netwatch_common::ProbeResult` by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub status: Status,
    pub latency_ms: Option<f64>,
    pub packet_loss: Option<f64>,
}

/// Classify a completed probe's latency/loss against thresholds (spec.md
/// §4.5, P5).
pub fn classify(latency_ms: f64, packet_loss: f64, thresholds: &Thresholds) -> Status {
    if latency_ms <= thresholds.latency.good && packet_loss <= thresholds.packet_loss.good {
        Status::Up
    } else if latency_ms <= thresholds.latency.degraded
        && packet_loss <= thresholds.packet_loss.degraded
    {
        Status::Degraded
    } else {
        Status::Down
    }
}

/// Round to 3 decimal places, preserving sub-millisecond precision
/// (spec.md §3 ProbeResult, §4.5).
fn round_latency(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Abstraction over "send N ICMP echoes, report what came back", so the
/// scheduler/tests can substitute a fake without opening real sockets.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, device: &Device, thresholds: &Thresholds) -> ProbeOutcome;
}

/// Raw-socket ICMP prober backed by `surge-ping` (spec.md §4.5 "Raw-socket
/// ICMP is the correct mechanism").
pub struct IcmpProber;

impl IcmpProber {
    pub fn new() -> Self {
        Self
    }

    fn timeout_secs(device: &Device) -> u64 {
        if matches!(device.criticality, netwatch_common::Criticality::Critical) {
            3
        } else {
            5
        }
    }

    fn min_replies(device: &Device) -> usize {
        if matches!(device.criticality, netwatch_common::Criticality::Critical) {
            2
        } else {
            3
        }
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&self, device: &Device, thresholds: &Thresholds) -> ProbeOutcome {
        let ip_str = device.probe_ip();
        if !ipv4_regex().is_match(ip_str) {
            tracing::error!(device = %device.id, ip = %ip_str, "invalid IPv4 address, skipping probe");
            return ProbeOutcome {
                status: Status::Down,
                latency_ms: None,
                packet_loss: None,
            };
        }

        let ip: IpAddr = match ip_str.parse() {
            Ok(ip) => ip,
            Err(_) => {
                tracing::error!(device = %device.id, ip = %ip_str, "unparseable IPv4 address, skipping probe");
                return ProbeOutcome {
                    status: Status::Down,
                    latency_ms: None,
                    packet_loss: None,
                };
            }
        };

        let timeout_secs = Self::timeout_secs(device);
        let min_replies = Self::min_replies(device);
        let count = min_replies.max(3);
        let timeout = Duration::from_secs(timeout_secs);
        let payload = [0u8; 8];

        let mut rtts_ms: Vec<f64> = Vec::with_capacity(count);
        for i in 0..count {
            let result = tokio::time::timeout(timeout, surge_ping::ping(ip, &payload)).await;
            match result {
                Ok(Ok((_, duration))) => {
                    rtts_ms.push(duration.as_secs_f64() * 1000.0);
                }
                Ok(Err(e)) => {
                    tracing::debug!(device = %device.id, error = %e, "icmp echo failed");
                }
                Err(_) => {
                    tracing::debug!(device = %device.id, "icmp echo timed out");
                }
            }
            if i + 1 < count {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        if rtts_ms.is_empty() {
            return ProbeOutcome {
                status: Status::Down,
                latency_ms: None,
                packet_loss: None,
            };
        }

        let mean = rtts_ms.iter().sum::<f64>() / rtts_ms.len() as f64;
        let latency_ms = round_latency(mean);
        let packet_loss = 100.0 * (1.0 - rtts_ms.len() as f64 / count as f64);
        let effective = device.thresholds.as_ref().unwrap_or(thresholds);
        let status = classify(latency_ms, packet_loss, effective);

        ProbeOutcome {
            status,
            latency_ms: Some(latency_ms),
            packet_loss: Some(packet_loss),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            latency: netwatch_common::LatencyThresholds {
                good: 50.0,
                degraded: 150.0,
            },
            packet_loss: netwatch_common::PacketLossThresholds {
                good: 1.0,
                degraded: 5.0,
            },
        }
    }

    #[test]
    fn classification_matches_spec_p5() {
        let t = thresholds();
        assert_eq!(classify(30.0, 0.0, &t), Status::Up);
        assert_eq!(classify(100.0, 0.0, &t), Status::Degraded);
        assert_eq!(classify(200.0, 0.0, &t), Status::Down);
        assert_eq!(classify(10.0, 6.0, &t), Status::Down);
    }

    #[test]
    fn ipv4_regex_rejects_garbage() {
        assert!(ipv4_regex().is_match("192.168.1.1"));
        assert!(!ipv4_regex().is_match("not-an-ip"));
        assert!(!ipv4_regex().is_match("999.1.1.1"));
        assert!(!ipv4_regex().is_match("192.168.1.1:8080"));
    }

    #[test]
    fn round_latency_preserves_sub_millisecond_precision() {
        assert_eq!(round_latency(0.3333333), 0.333);
        assert_eq!(round_latency(12.0), 12.0);
    }

    #[tokio::test]
    async fn invalid_ip_produces_synthetic_down_without_socket() {
        let device = Device {
            id: "d1".into(),
            area_id: "a1".into(),
            name: "Bad".into(),
            device_type: netwatch_common::DeviceType::Router,
            ip: "not-an-ip".into(),
            criticality: netwatch_common::Criticality::Normal,
            thresholds: None,
            snmp_enabled: None,
            snmp_community: None,
            snmp_version: None,
        };
        let prober = IcmpProber::new();
        let outcome = prober.probe(&device, &thresholds()).await;
        assert_eq!(outcome.status, Status::Down);
        assert!(outcome.latency_ms.is_none());
        assert!(outcome.packet_loss.is_none());
    }
}
