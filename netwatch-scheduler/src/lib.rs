//! Scheduler (C6): a single cooperative tick loop that decides when each
//! device is probed, dispatches under a concurrency budget, and tracks a
//! per-device circuit breaker (spec.md §4.6).
//!
//! Grounded on the teacher's `BridgeHealth` in
//! `zensight-bridge-framework/src/health.rs`: the same per-device liveness
//! map, success/failure recorders, and consecutive-failure counter, but
//! rebuilt around a different policy — one cooperative ticker walking every
//! device each tick rather than a per-poll health update, and a three-state
//! breaker (closed/open/half-open) in place of the teacher's two-state
//! online/offline counter.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use netwatch_batch::BatchWriter;
use netwatch_cache::CacheStore;
use netwatch_common::{current_timestamp_millis, Device, DeviceStatus, HistoryRow, ProbeResult, Status, Thresholds};
use netwatch_config::ConfigStore;
use netwatch_prober::Prober;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

const TICK_INTERVAL: Duration = Duration::from_secs(10);
const TICK_INTERVAL_MS: i64 = 10_000;
const MAX_CONCURRENT_PINGS: usize = 5;
const STAGGER_DELAY: Duration = Duration::from_millis(50);
const MAX_FAILURES: u32 = 5;
const OPEN_TIMEOUT_MS: i64 = 60_000;
const IN_FLIGHT_WATCHDOG: Duration = Duration::from_secs(5);

/// Three-state circuit breaker (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct DevState {
    ticks_needed: i64,
    ticks_remaining: i64,
    in_flight: bool,
    last_ping: Option<i64>,
    breaker_state: BreakerState,
    failures: u32,
    last_failure_ms: i64,
}

impl DevState {
    fn new(ticks_needed: i64) -> Self {
        Self {
            ticks_needed,
            ticks_remaining: ticks_needed,
            in_flight: false,
            last_ping: None,
            breaker_state: BreakerState::Closed,
            failures: 0,
            last_failure_ms: 0,
        }
    }

    /// True if the breaker is currently blocking dispatch. Transitions
    /// `open` → `half-open` in place once the timeout has elapsed, so the
    /// caller sees the post-transition state in the same check.
    fn breaker_blocks(&mut self, now_ms: i64) -> bool {
        match self.breaker_state {
            BreakerState::Closed | BreakerState::HalfOpen => false,
            BreakerState::Open => {
                if now_ms - self.last_failure_ms >= OPEN_TIMEOUT_MS {
                    self.breaker_state = BreakerState::HalfOpen;
                    false
                } else {
                    true
                }
            }
        }
    }

    fn record_outcome(&mut self, status: Status, now_ms: i64) {
        self.in_flight = false;
        if status == Status::Down {
            self.failures += 1;
            self.last_failure_ms = now_ms;
            if self.breaker_state == BreakerState::HalfOpen || self.failures >= MAX_FAILURES {
                self.breaker_state = BreakerState::Open;
            }
        } else {
            self.failures = 0;
            self.breaker_state = BreakerState::Closed;
            self.last_ping = Some(now_ms);
        }
    }
}

fn ticks_needed_for(device: &Device) -> i64 {
    let interval_ms = device.criticality.interval_seconds() as i64 * 1000;
    std::cmp::max(1, interval_ms / TICK_INTERVAL_MS)
}

/// Per-process scheduler state. Cheap to share: devices live behind a
/// `DashMap`, so `tick()` and in-flight completions can touch different
/// devices concurrently without a global lock.
pub struct Scheduler {
    config: Arc<ConfigStore>,
    cache: Arc<CacheStore>,
    batch: Arc<BatchWriter>,
    prober: Arc<dyn Prober>,
    devices: DashMap<String, Mutex<DevState>>,
    dispatched_total: AtomicI64,
    last_tick_ms: AtomicI64,
    in_flight_count: AtomicU32,
    paused: AtomicBool,
}

impl Scheduler {
    pub fn new(
        config: Arc<ConfigStore>,
        cache: Arc<CacheStore>,
        batch: Arc<BatchWriter>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        Self {
            config,
            cache,
            batch,
            prober,
            devices: DashMap::new(),
            dispatched_total: AtomicI64::new(0),
            last_tick_ms: AtomicI64::new(0),
            in_flight_count: AtomicU32::new(0),
            paused: AtomicBool::new(false),
        }
    }

    /// Stop dispatching new probes, leaving in-flight ones to finish on
    /// their own. Used by `/api/import` while it swaps the history store
    /// out from under the engine (spec.md §9 Open Question 2).
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    /// Re-sync the device set against the latest config snapshot, without
    /// waiting for the next tick. Called by the API after a successful
    /// `POST /api/config` (spec.md §4.10, P14).
    pub async fn reload(&self) {
        let snapshot = self.config.load().await;
        self.sync_devices(&snapshot.devices);
    }

    fn sync_devices(&self, devices: &[Device]) {
        let ids: HashSet<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        self.devices.retain(|id, _| ids.contains(id.as_str()));
        for device in devices {
            self.devices
                .entry(device.id.clone())
                .or_insert_with(|| Mutex::new(DevState::new(ticks_needed_for(device))));
        }
    }

    /// Run the tick loop until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// One cooperative tick: decrement every device's counter, collect
    /// dispatch candidates, sort by priority, and fan out the top
    /// `maxConcurrentPings` with a per-position stagger delay (spec.md
    /// §4.6).
    pub async fn tick(self: &Arc<Self>) {
        if self.paused.load(Ordering::Relaxed) {
            return;
        }
        let now = current_timestamp_millis();
        self.last_tick_ms.store(now, Ordering::Relaxed);
        let snapshot = self.config.load().await;
        self.sync_devices(&snapshot.devices);

        let mut candidates: Vec<Device> = Vec::new();
        for device in &snapshot.devices {
            let Some(entry) = self.devices.get(&device.id) else {
                continue;
            };
            let mut state = entry.lock().expect("scheduler device mutex poisoned");
            state.ticks_remaining -= 1;
            if state.ticks_remaining > 0 {
                continue;
            }
            if state.breaker_blocks(now) {
                state.ticks_remaining = state.ticks_needed;
                continue;
            }
            if state.in_flight {
                // Skip without reset: retried again next tick (spec.md §4.6).
                continue;
            }
            candidates.push(device.clone());
            state.ticks_remaining = state.ticks_needed;
        }

        candidates.sort_by(|a, b| b.criticality.priority().cmp(&a.criticality.priority()));
        let thresholds = snapshot.settings.thresholds;

        for (position, device) in candidates.into_iter().take(MAX_CONCURRENT_PINGS).enumerate() {
            if let Some(entry) = self.devices.get(&device.id) {
                entry.lock().expect("scheduler device mutex poisoned").in_flight = true;
            }
            self.in_flight_count.fetch_add(1, Ordering::Relaxed);
            self.dispatched_total.fetch_add(1, Ordering::Relaxed);

            let scheduler = Arc::clone(self);
            let delay = STAGGER_DELAY * position as u32;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                scheduler.dispatch(device, thresholds).await;
            });
        }
    }

    async fn dispatch(self: Arc<Self>, device: Device, thresholds: Thresholds) {
        let watchdog_scheduler = Arc::clone(&self);
        let watchdog_id = device.id.clone();
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(IN_FLIGHT_WATCHDOG).await;
            watchdog_scheduler.clear_in_flight(&watchdog_id);
        });

        let outcome = self.prober.probe(&device, &thresholds).await;
        watchdog.abort();
        self.in_flight_count.fetch_sub(1, Ordering::Relaxed);

        let now = current_timestamp_millis();
        let result = ProbeResult {
            device_id: device.id.clone(),
            status: outcome.status,
            latency_ms: outcome.latency_ms,
            packet_loss: outcome.packet_loss,
            timestamp: now,
        };

        if let Some(entry) = self.devices.get(&device.id) {
            entry
                .lock()
                .expect("scheduler device mutex poisoned")
                .record_outcome(result.status, now);
        }

        let status = DeviceStatus::from_probe_result(&result);
        self.cache.put_device_status(status, now);
        self.batch.push_probe(HistoryRow::from(&result)).await;
    }

    fn clear_in_flight(&self, device_id: &str) {
        if let Some(entry) = self.devices.get(device_id) {
            let mut state = entry.lock().expect("scheduler device mutex poisoned");
            if state.in_flight {
                state.in_flight = false;
                tracing::warn!(device = device_id, "in-flight watchdog fired, prober never returned");
            }
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let circuit_breakers_open = self
            .devices
            .iter()
            .filter(|e| {
                matches!(
                    e.value().lock().expect("scheduler device mutex poisoned").breaker_state,
                    BreakerState::Open
                )
            })
            .count();

        SchedulerStats {
            tracked_devices: self.devices.len(),
            dispatched_total: self.dispatched_total.load(Ordering::Relaxed),
            in_flight: self.in_flight_count.load(Ordering::Relaxed),
            last_tick_ms: self.last_tick_ms.load(Ordering::Relaxed),
            circuit_breakers_open,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub tracked_devices: usize,
    pub dispatched_total: i64,
    pub in_flight: u32,
    pub last_tick_ms: i64,
    pub circuit_breakers_open: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netwatch_prober::ProbeOutcome;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex as AsyncMutex;

    struct ScriptedProber {
        calls: AtomicUsize,
        outcomes: AsyncMutex<Vec<ProbeOutcome>>,
    }

    impl ScriptedProber {
        fn always_down() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcomes: AsyncMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, _device: &Device, _thresholds: &Thresholds) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut queue = self.outcomes.lock().await;
            queue.pop().unwrap_or(ProbeOutcome {
                status: Status::Down,
                latency_ms: None,
                packet_loss: None,
            })
        }
    }

    fn device(id: &str, criticality: netwatch_common::Criticality) -> Device {
        Device {
            id: id.to_string(),
            area_id: "a1".into(),
            name: id.to_string(),
            device_type: netwatch_common::DeviceType::Router,
            ip: "10.0.0.1".into(),
            criticality,
            thresholds: None,
            snmp_enabled: None,
            snmp_community: None,
            snmp_version: None,
        }
    }

    async fn harness() -> (Arc<ConfigStore>, Arc<CacheStore>, Arc<BatchWriter>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("config.json")).await.unwrap());
        let cache = Arc::new(CacheStore::new());
        let history = Arc::new(netwatch_history::HistoryStore::open(dir.path().join("history.db")).await.unwrap());
        let batch = Arc::new(BatchWriter::new(history));
        (config, cache, batch, dir)
    }

    #[test]
    fn ticks_needed_matches_criticality_intervals() {
        assert_eq!(ticks_needed_for(&device("d", netwatch_common::Criticality::Critical)), 3);
        assert_eq!(ticks_needed_for(&device("d", netwatch_common::Criticality::High)), 6);
        assert_eq!(ticks_needed_for(&device("d", netwatch_common::Criticality::Normal)), 12);
        assert_eq!(ticks_needed_for(&device("d", netwatch_common::Criticality::Low)), 30);
    }

    #[tokio::test]
    async fn breaker_opens_after_five_failures_p3() {
        let (config, cache, batch, _dir) = harness().await;
        let mut snapshot = (*config.load().await).clone();
        snapshot.devices = vec![device("d1", netwatch_common::Criticality::Critical)];
        config.save(snapshot).await.unwrap();

        let prober: Arc<dyn Prober> = Arc::new(ScriptedProber::always_down());
        let scheduler = Arc::new(Scheduler::new(config, cache, batch, prober));
        scheduler.reload().await;

        let now = 0i64;
        for _ in 0..5 {
            scheduler
                .dispatch(device("d1", netwatch_common::Criticality::Critical), Thresholds::default())
                .await;
        }
        let _ = now;

        let entry = scheduler.devices.get("d1").unwrap();
        let state = entry.lock().unwrap();
        assert_eq!(state.breaker_state, BreakerState::Open);
        assert_eq!(state.failures, 5);
        drop(state);
        drop(entry);
        assert_eq!(scheduler.stats().circuit_breakers_open, 1);
    }

    #[tokio::test]
    async fn half_open_reopens_on_failure_p4() {
        let (config, cache, batch, _dir) = harness().await;
        let mut snapshot = (*config.load().await).clone();
        snapshot.devices = vec![device("d1", netwatch_common::Criticality::Critical)];
        config.save(snapshot).await.unwrap();

        let prober: Arc<dyn Prober> = Arc::new(ScriptedProber::always_down());
        let scheduler = Arc::new(Scheduler::new(config, cache, batch, prober));
        scheduler.reload().await;

        {
            let entry = scheduler.devices.get("d1").unwrap();
            let mut state = entry.lock().unwrap();
            state.breaker_state = BreakerState::HalfOpen;
        }

        scheduler
            .dispatch(device("d1", netwatch_common::Criticality::Critical), Thresholds::default())
            .await;

        let entry = scheduler.devices.get("d1").unwrap();
        let state = entry.lock().unwrap();
        assert_eq!(state.breaker_state, BreakerState::Open);
    }

    #[tokio::test]
    async fn open_breaker_blocks_until_timeout_elapses() {
        let mut state = DevState::new(3);
        state.breaker_state = BreakerState::Open;
        state.last_failure_ms = 0;

        assert!(state.breaker_blocks(OPEN_TIMEOUT_MS - 1));
        assert!(!state.breaker_blocks(OPEN_TIMEOUT_MS));
        assert_eq!(state.breaker_state, BreakerState::HalfOpen);
    }

    #[tokio::test]
    async fn paused_scheduler_skips_tick() {
        let (config, cache, batch, _dir) = harness().await;
        let mut snapshot = (*config.load().await).clone();
        snapshot.devices = vec![device("d1", netwatch_common::Criticality::Critical)];
        config.save(snapshot).await.unwrap();

        let prober: Arc<dyn Prober> = Arc::new(ScriptedProber::always_down());
        let scheduler = Arc::new(Scheduler::new(config, cache, batch, prober));
        scheduler.reload().await;
        scheduler.pause();

        for _ in 0..5 {
            scheduler.tick().await;
        }
        assert_eq!(scheduler.stats().dispatched_total, 0);

        scheduler.resume();
        for _ in 0..3 {
            scheduler.tick().await;
        }
        assert!(scheduler.stats().dispatched_total > 0);
    }

    #[tokio::test]
    async fn reload_adds_and_removes_devices() {
        let (config, cache, batch, _dir) = harness().await;
        let mut snapshot = (*config.load().await).clone();
        snapshot.devices = vec![device("d1", netwatch_common::Criticality::Normal)];
        config.save(snapshot).await.unwrap();

        let prober: Arc<dyn Prober> = Arc::new(ScriptedProber::always_down());
        let scheduler = Arc::new(Scheduler::new(config.clone(), cache, batch, prober));
        scheduler.reload().await;
        assert_eq!(scheduler.devices.len(), 1);

        let mut snapshot = (*config.load().await).clone();
        snapshot.devices.clear();
        config.save(snapshot).await.unwrap();
        scheduler.reload().await;
        assert_eq!(scheduler.devices.len(), 0);
    }
}
