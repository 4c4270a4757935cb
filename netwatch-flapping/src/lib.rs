//! Flapping detector (C8): a per-`(deviceId, ifIndex)` sliding-window
//! change counter over SNMP interface readings (spec.md §4.8).
//!
//! Grounded on `other_examples/Pratyay360-cloud-ping`'s `StreamingAggregator`
//! for the shape only — a `HashMap`-keyed per-series state struct fed one
//! record at a time — not its EWMA scoring math, which this detector has no
//! use for. Implemented as a `netwatch_ingest::FlappingSink` so the ingestor
//! forwards readings without depending on this crate's concrete type.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use dashmap::DashMap;
use netwatch_cache::CacheStore;
use netwatch_common::{FlappingEvent, FlappingEventType, InterfaceReading, OperStatus, Severity};
use netwatch_history::HistoryStore;
use netwatch_ingest::FlappingSink;

const RING_CAPACITY: usize = 100;
const MIN_SPEED_CHANGE_MBPS: f64 = 10.0;
const WINDOW_MS: i64 = 10 * 60 * 1000;
const CHANGE_THRESHOLD: usize = 5;
const DEDUP_MS: i64 = 5 * 60 * 1000;

struct Sample {
    speed_mbps: Option<f64>,
    oper_status: OperStatus,
}

struct InterfaceState {
    readings: VecDeque<Sample>,
    changes: VecDeque<i64>,
    last_event_ms: Option<i64>,
}

impl InterfaceState {
    fn new() -> Self {
        Self {
            readings: VecDeque::with_capacity(RING_CAPACITY),
            changes: VecDeque::new(),
            last_event_ms: None,
        }
    }
}

fn status_label(status: OperStatus) -> serde_json::Value {
    match status {
        OperStatus::Up => serde_json::json!("up"),
        OperStatus::Down => serde_json::json!("down"),
        OperStatus::Other(v) => serde_json::json!(v),
    }
}

/// Detects unstable interfaces from the ring buffer of their last 100
/// readings and publishes/persists at most one event per 5 minutes per
/// interface (spec.md §4.8).
pub struct FlappingDetector {
    history: Arc<HistoryStore>,
    cache: Arc<CacheStore>,
    states: DashMap<(String, i64), Mutex<InterfaceState>>,
}

impl FlappingDetector {
    pub fn new(history: Arc<HistoryStore>, cache: Arc<CacheStore>) -> Self {
        Self {
            history,
            cache,
            states: DashMap::new(),
        }
    }

    /// Number of `(deviceId, ifIndex)` pairs currently tracked, for
    /// `/api/system/stats`.
    pub fn tracked_interfaces(&self) -> usize {
        self.states.len()
    }
}

impl FlappingSink for FlappingDetector {
    fn record(&self, reading: &InterfaceReading, now_ms: i64) {
        let key = (reading.device_id.clone(), reading.if_index);
        let entry = self
            .states
            .entry(key)
            .or_insert_with(|| Mutex::new(InterfaceState::new()));
        let mut state = entry.lock().expect("flapping state mutex poisoned");

        let mut detected: Option<(FlappingEventType, serde_json::Value, serde_json::Value)> = None;
        match state.readings.front() {
            Some(prev) => {
                if let (Some(prev_speed), Some(new_speed)) = (prev.speed_mbps, reading.speed_mbps) {
                    if (new_speed - prev_speed).abs() >= MIN_SPEED_CHANGE_MBPS {
                        state.changes.push_back(now_ms);
                        detected = Some((
                            FlappingEventType::SpeedChange,
                            serde_json::json!(prev_speed),
                            serde_json::json!(new_speed),
                        ));
                    }
                }
                if prev.oper_status != reading.oper_status {
                    state.changes.push_back(now_ms);
                    detected = Some((
                        FlappingEventType::StatusChange,
                        status_label(prev.oper_status),
                        status_label(reading.oper_status),
                    ));
                }
            }
            None => {
                // No prior sample to diff against; the first reading is the
                // baseline and counts as a change in its own right so N
                // alternating readings reach the threshold on the Nth one.
                state.changes.push_back(now_ms);
            }
        }

        state.readings.push_front(Sample {
            speed_mbps: reading.speed_mbps,
            oper_status: reading.oper_status,
        });
        if state.readings.len() > RING_CAPACITY {
            state.readings.pop_back();
        }

        let cutoff = now_ms - WINDOW_MS;
        while matches!(state.changes.front(), Some(ts) if *ts < cutoff) {
            state.changes.pop_front();
        }

        let change_count = state.changes.len();
        if change_count < CHANGE_THRESHOLD {
            return;
        }
        let Some((event_type, from, to)) = detected else {
            return;
        };
        if let Some(last) = state.last_event_ms {
            if now_ms - last < DEDUP_MS {
                return;
            }
        }
        state.last_event_ms = Some(now_ms);
        drop(state);

        let severity = if change_count >= 2 * CHANGE_THRESHOLD {
            Severity::Critical
        } else {
            Severity::Warning
        };

        let event = FlappingEvent {
            device_id: reading.device_id.clone(),
            if_index: reading.if_index,
            if_name: reading.if_name.clone(),
            event_type,
            from,
            to,
            severity,
            timestamp: now_ms,
        };

        self.cache.publish_flapping(&event);

        let history = Arc::clone(&self.history);
        tokio::spawn(async move {
            if let Err(e) = history.insert_flapping_event(&event).await {
                tracing::warn!(error = %e, "failed to persist flapping event");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(speed: f64, if_index: i64) -> InterfaceReading {
        InterfaceReading {
            device_id: "d1".into(),
            if_index,
            if_name: "eth0".into(),
            oper_status: OperStatus::Up,
            speed_mbps: Some(speed),
            in_octets: None,
            out_octets: None,
            in_errors: None,
            out_errors: None,
            in_discards: None,
            out_discards: None,
            timestamp: 0,
        }
    }

    async fn harness() -> (Arc<HistoryStore>, Arc<CacheStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(HistoryStore::open(dir.path().join("history.db")).await.unwrap());
        let cache = Arc::new(CacheStore::new());
        (history, cache, dir)
    }

    #[tokio::test]
    async fn five_speed_transitions_emit_exactly_one_event_p13() {
        let (history, cache, _dir) = harness().await;
        let detector = FlappingDetector::new(history, cache.clone());
        let mut rx = cache.subscribe();

        let speeds = [1000.0, 100.0, 1000.0, 100.0, 1000.0];
        for (i, speed) in speeds.iter().enumerate() {
            detector.record(&reading(*speed, 5), (i as i64) * 30_000);
        }

        // The baseline reading plus 4 alternating transitions cross the
        // threshold on the 5th sample.
        let event = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv())
            .await
            .expect("expected one flapping event")
            .unwrap();
        assert_eq!(event.channel, netwatch_cache::Channel::AlertFlapping);
        assert_eq!(event.payload["severity"], "warning");

        let second = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(second.is_err(), "no second event expected within the dedup window");
    }

    #[tokio::test]
    async fn stable_interface_never_flaps() {
        let (history, cache, _dir) = harness().await;
        let detector = FlappingDetector::new(history, cache.clone());
        let mut rx = cache.subscribe();

        for i in 0..10 {
            detector.record(&reading(1000.0, 7), (i as i64) * 30_000);
        }

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn repeat_within_dedup_window_is_suppressed() {
        let (history, cache, _dir) = harness().await;
        let detector = FlappingDetector::new(history, cache.clone());
        let mut rx = cache.subscribe();

        let speeds = [1000.0, 100.0, 1000.0, 100.0, 1000.0, 100.0, 1000.0];
        for (i, speed) in speeds.iter().enumerate() {
            detector.record(&reading(*speed, 9), (i as i64) * 30_000);
        }

        tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv())
            .await
            .expect("expected the first flapping event")
            .unwrap();
        let second = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(second.is_err(), "7th transition within the dedup window must not re-emit");
        assert_eq!(detector.tracked_interfaces(), 1);
    }
}
