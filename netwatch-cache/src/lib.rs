//! Hot cache + pub/sub (C2).
//!
//! A process-local key/value layer with TTL-refresh-on-write semantics and
//! a set of at-most-once broadcast channels (spec.md §4.2). The spec
//! describes optional delegation to an external cache service (a
//! Redis-equivalent); no such dependency appears anywhere in the example
//! pack this engine is grounded on, so only the required in-process
//! fallback is implemented here. [`CacheMode`] still exists so
//! `/api/system/stats` can report which mode is active (scenario 6 of
//! spec.md §8), and the store is structured so a real external backend
//! could be added behind the same API without touching callers.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use netwatch_common::{DeviceStatus, FlappingEvent, InterfaceReading};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEVICE_STATUS_TTL_MS: i64 = 3_600_000;
const INTERFACE_STATUS_TTL_MS: i64 = 3_600_000;
const WIRELESS_STATUS_TTL_MS: i64 = 3_600_000;
const SWEEP_INTERVAL_MS: u64 = 30_000;

/// Which cache backend is currently serving reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    Local,
    External,
}

/// A pub/sub channel name (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    DeviceUpdate,
    InterfaceUpdate,
    WirelessUpdate,
    AlertFlapping,
    SystemStatus,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::DeviceUpdate => "device:update",
            Channel::InterfaceUpdate => "interface:update",
            Channel::WirelessUpdate => "wireless:update",
            Channel::AlertFlapping => "alert:flapping",
            Channel::SystemStatus => "system:status",
        }
    }
}

/// An event forwarded verbatim to WebSocket subscribers, tagged with its
/// source channel (spec.md §4.10). Delivery is at-most-once; subscribers
/// joining late receive nothing retroactively (no replay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEvent {
    pub channel: Channel,
    pub payload: serde_json::Value,
}

struct TtlEntry<V> {
    value: V,
    expires_at: i64,
}

/// A TTL map keyed by `String`, refreshing expiry on every write (spec.md
/// §4.2 "TTL = 1 hour, refresh on write").
struct TtlMap<V> {
    entries: DashMap<String, TtlEntry<V>>,
    ttl_ms: i64,
}

impl<V: Clone> TtlMap<V> {
    fn new(ttl_ms: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ms,
        }
    }

    fn insert(&self, key: String, value: V, now_ms: i64) {
        self.entries.insert(
            key,
            TtlEntry {
                value,
                expires_at: now_ms + self.ttl_ms,
            },
        );
    }

    fn get(&self, key: &str, now_ms: i64) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= now_ms {
            return None;
        }
        Some(entry.value.clone())
    }

    fn all(&self, now_ms: i64) -> Vec<V> {
        self.entries
            .iter()
            .filter(|e| e.expires_at > now_ms)
            .map(|e| e.value.clone())
            .collect()
    }

    fn sweep(&self, now_ms: i64) {
        self.entries.retain(|_, entry| entry.expires_at > now_ms);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The hot cache + pub/sub layer (spec.md §4.2).
pub struct CacheStore {
    mode: Arc<std::sync::atomic::AtomicBool>, // true == external
    device_status: TtlMap<DeviceStatus>,
    interface_status: TtlMap<InterfaceReading>,
    wireless_status: TtlMap<serde_json::Value>,
    events_tx: broadcast::Sender<CacheEvent>,
    last_sweep_ms: AtomicI64,
}

impl CacheStore {
    pub fn new() -> Self {
        let (events_tx, _rx) = broadcast::channel(1024);
        Self {
            mode: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            device_status: TtlMap::new(DEVICE_STATUS_TTL_MS),
            interface_status: TtlMap::new(INTERFACE_STATUS_TTL_MS),
            wireless_status: TtlMap::new(WIRELESS_STATUS_TTL_MS),
            events_tx,
            last_sweep_ms: AtomicI64::new(0),
        }
    }

    pub fn mode(&self) -> CacheMode {
        if self.mode.load(Ordering::Relaxed) {
            CacheMode::External
        } else {
            CacheMode::Local
        }
    }

    /// Subscribe to the pub/sub event stream (spec.md §4.10 WebSocket edge).
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events_tx.subscribe()
    }

    fn publish(&self, channel: Channel, payload: serde_json::Value) {
        // A send error just means there are currently no subscribers; the
        // spec explicitly allows lossy, at-most-once delivery.
        let _ = self.events_tx.send(CacheEvent { channel, payload });
    }

    /// `device:status:{deviceId}` write + `device:update` publish.
    pub fn put_device_status(&self, status: DeviceStatus, now_ms: i64) {
        let payload = serde_json::to_value(&status).unwrap_or(serde_json::Value::Null);
        self.device_status
            .insert(status.device_id.clone(), status, now_ms);
        self.publish(Channel::DeviceUpdate, payload);
    }

    pub fn get_device_status(&self, device_id: &str, now_ms: i64) -> Option<DeviceStatus> {
        self.device_status.get(device_id, now_ms)
    }

    pub fn all_device_statuses(&self, now_ms: i64) -> Vec<DeviceStatus> {
        self.device_status.all(now_ms)
    }

    /// `interface:status:{deviceId}:{ifIndex}` write + `interface:update`.
    pub fn put_interface_status(&self, reading: InterfaceReading, now_ms: i64) {
        let key = format!("{}:{}", reading.device_id, reading.if_index);
        let payload = serde_json::to_value(&reading).unwrap_or(serde_json::Value::Null);
        self.interface_status.insert(key, reading, now_ms);
        self.publish(Channel::InterfaceUpdate, payload);
    }

    pub fn get_interface_status(
        &self,
        device_id: &str,
        if_index: i64,
        now_ms: i64,
    ) -> Option<InterfaceReading> {
        let key = format!("{device_id}:{if_index}");
        self.interface_status.get(&key, now_ms)
    }

    pub fn interface_statuses_for_device(
        &self,
        device_id: &str,
        now_ms: i64,
    ) -> Vec<InterfaceReading> {
        self.interface_status
            .all(now_ms)
            .into_iter()
            .filter(|r| r.device_id == device_id)
            .collect()
    }

    /// `wireless:status:{deviceId}` write + `wireless:update`.
    pub fn put_wireless_status(&self, device_id: &str, sample: serde_json::Value, now_ms: i64) {
        self.wireless_status
            .insert(device_id.to_string(), sample.clone(), now_ms);
        self.publish(Channel::WirelessUpdate, sample);
    }

    pub fn get_wireless_status(&self, device_id: &str, now_ms: i64) -> Option<serde_json::Value> {
        self.wireless_status.get(device_id, now_ms)
    }

    /// Publish a flapping alert (spec.md §4.8).
    pub fn publish_flapping(&self, event: &FlappingEvent) {
        let payload = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
        self.publish(Channel::AlertFlapping, payload);
    }

    /// Publish a heartbeat / backend-switch notice.
    pub fn publish_system_status(&self, payload: serde_json::Value) {
        self.publish(Channel::SystemStatus, payload);
    }

    /// Sweep all three TTL maps, dropping expired entries. Intended to be
    /// driven by a `tokio::time::interval` loop at `SWEEP_INTERVAL_MS`,
    /// the same idiom as the teacher's Prometheus exporter's
    /// `cleanup_stale` task.
    pub fn sweep(&self, now_ms: i64) {
        self.device_status.sweep(now_ms);
        self.interface_status.sweep(now_ms);
        self.wireless_status.sweep(now_ms);
        self.last_sweep_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn sweep_interval_ms() -> u64 {
        SWEEP_INTERVAL_MS
    }

    /// Drop every cached entry. Called after `/api/import` replaces the
    /// history store wholesale, so stale entries never outlive the data
    /// they were read from (spec.md §9 "Shared resources": the cache is
    /// reset-invalidated by the store).
    pub fn invalidate_all(&self) {
        self.device_status.entries.clear();
        self.interface_status.entries.clear();
        self.wireless_status.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            mode: self.mode(),
            device_status_entries: self.device_status.len(),
            interface_status_entries: self.interface_status.len(),
            wireless_status_entries: self.wireless_status.len(),
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub mode: CacheMode,
    pub device_status_entries: usize,
    pub interface_status_entries: usize,
    pub wireless_status_entries: usize,
}
