//! Batch writer (C4): buffers `ProbeResult`/`InterfaceReading` samples and
//! flushes them to history in bounded batches (spec.md §4.4).
//!
//! Grounded on the teacher's `cleanup_task` idiom in
//! `zensight-exporter-prometheus/src/main.rs` — a `tokio::time::interval`
//! raced against a `watch::Receiver<bool>` shutdown signal inside
//! `tokio::select!`. Flush-on-size is driven explicitly by the caller
//! (the scheduler/ingestor push samples in); flush-on-time is driven by
//! this crate's own loop.

use std::sync::Arc;

use netwatch_common::{HistoryRow, InterfaceReading};
use netwatch_history::HistoryStore;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, Duration};

const MAX_BATCH: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(30);
const RETAIN_CEILING: usize = MAX_BATCH * 4;

#[derive(Default)]
struct Queues {
    probes: Vec<HistoryRow>,
    interfaces: Vec<InterfaceReading>,
}

/// Single in-memory queue of samples awaiting a transactional flush to
/// history (spec.md §4.4). Cheap to clone (an `Arc` internally) so the
/// scheduler, ingestor, and the flush loop can all share one instance.
pub struct BatchWriter {
    history: Arc<HistoryStore>,
    queues: Mutex<Queues>,
    dropped_probes: std::sync::atomic::AtomicU64,
    dropped_interfaces: std::sync::atomic::AtomicU64,
    consecutive_failures: std::sync::atomic::AtomicU32,
}

impl BatchWriter {
    pub fn new(history: Arc<HistoryStore>) -> Self {
        Self {
            history,
            queues: Mutex::new(Queues::default()),
            dropped_probes: std::sync::atomic::AtomicU64::new(0),
            dropped_interfaces: std::sync::atomic::AtomicU64::new(0),
            consecutive_failures: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Queue a probe result's history row. Flushes immediately if the
    /// queue has reached `maxBatch` (spec.md §4.4 "whichever fires first").
    pub async fn push_probe(&self, row: HistoryRow) {
        let should_flush = {
            let mut queues = self.queues.lock().await;
            queues.probes.push(row);
            queues.probes.len() >= MAX_BATCH
        };
        if should_flush {
            self.flush().await;
        }
    }

    /// Queue an SNMP interface reading.
    pub async fn push_interface(&self, reading: InterfaceReading) {
        let should_flush = {
            let mut queues = self.queues.lock().await;
            queues.interfaces.push(reading);
            queues.interfaces.len() >= MAX_BATCH
        };
        if should_flush {
            self.flush().await;
        }
    }

    /// Flush whatever is currently queued. On failure the batch is
    /// retained for the next attempt; once a retained batch exceeds
    /// `maxBatch * 4`, the oldest samples are dropped and logged
    /// (spec.md §4.4, §7 BatchFlushError).
    pub async fn flush(&self) {
        let (probes, interfaces) = {
            let mut queues = self.queues.lock().await;
            (
                std::mem::take(&mut queues.probes),
                std::mem::take(&mut queues.interfaces),
            )
        };

        if probes.is_empty() && interfaces.is_empty() {
            return;
        }

        let mut failed = false;

        if !probes.is_empty() {
            if let Err(e) = self.history.insert_many(&probes).await {
                tracing::warn!(error = %e, count = probes.len(), "batch flush of probe rows failed, retaining");
                self.requeue_probes(probes).await;
                failed = true;
            }
        }

        if !interfaces.is_empty() {
            if let Err(e) = self.history.insert_interface_readings(&interfaces).await {
                tracing::warn!(error = %e, count = interfaces.len(), "batch flush of interface readings failed, retaining");
                self.requeue_interfaces(interfaces).await;
                failed = true;
            }
        }

        if failed {
            self.consecutive_failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        } else {
            self.consecutive_failures.store(0, std::sync::atomic::Ordering::Relaxed);
        }
    }

    async fn requeue_probes(&self, mut failed: Vec<HistoryRow>) {
        let mut queues = self.queues.lock().await;
        failed.append(&mut queues.probes);
        queues.probes = failed;
        if queues.probes.len() > RETAIN_CEILING {
            let drop_count = queues.probes.len() - RETAIN_CEILING;
            queues.probes.drain(0..drop_count);
            self.dropped_probes.fetch_add(drop_count as u64, std::sync::atomic::Ordering::Relaxed);
            tracing::warn!(dropped = drop_count, "dropped oldest probe samples past retain ceiling");
        }
    }

    async fn requeue_interfaces(&self, mut failed: Vec<InterfaceReading>) {
        let mut queues = self.queues.lock().await;
        failed.append(&mut queues.interfaces);
        queues.interfaces = failed;
        if queues.interfaces.len() > RETAIN_CEILING {
            let drop_count = queues.interfaces.len() - RETAIN_CEILING;
            queues.interfaces.drain(0..drop_count);
            self.dropped_interfaces.fetch_add(drop_count as u64, std::sync::atomic::Ordering::Relaxed);
            tracing::warn!(dropped = drop_count, "dropped oldest interface samples past retain ceiling");
        }
    }

    /// Run the time-based flush loop until `shutdown` fires, then perform
    /// one final synchronous flush (spec.md §4.4 "graceful shutdown").
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(FLUSH_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.flush().await;
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            dropped_probes: self.dropped_probes.load(std::sync::atomic::Ordering::Relaxed),
            dropped_interfaces: self.dropped_interfaces.load(std::sync::atomic::Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(std::sync::atomic::Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub dropped_probes: u64,
    pub dropped_interfaces: u64,
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_common::Status;

    async fn memory_history() -> (Arc<HistoryStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let store = HistoryStore::open(&path).await.unwrap();
        (Arc::new(store), dir)
    }

    fn row(ts: i64) -> HistoryRow {
        HistoryRow {
            device_id: "d1".to_string(),
            status: Status::Up,
            latency_ms: Some(10.0),
            packet_loss: Some(0.0),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn flush_fires_on_max_batch_p11() {
        let (history, _dir) = memory_history().await;
        let writer = BatchWriter::new(history.clone());

        for i in 0..250 {
            writer.push_probe(row(i)).await;
        }
        // 250 samples at maxBatch=100 flushes twice automatically (200
        // rows); the remaining 50 need an explicit flush (the "next
        // time-boundary" in P11).
        writer.flush().await;

        let latest = history.latest_per_device(None, 1_000_000).await.unwrap();
        // latest_per_device collapses to one row per device; verify total
        // row count via a wide raw-history window instead.
        let raw = history.device_history("d1", netwatch_history::Period::OneHour, 1_000_000).await.unwrap();
        match raw {
            netwatch_history::DeviceHistoryResult::Raw(rows) => assert_eq!(rows.len(), 250),
            _ => panic!("expected raw rows"),
        }
        assert_eq!(latest.len(), 1);
    }

    #[tokio::test]
    async fn final_flush_on_shutdown_drains_queue() {
        let (history, _dir) = memory_history().await;
        let writer = Arc::new(BatchWriter::new(history.clone()));
        writer.push_probe(row(1)).await;
        writer.push_probe(row(2)).await;

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(writer.clone().run(rx));
        tx.send(true).unwrap();
        handle.await.unwrap();

        let raw = history.device_history("d1", netwatch_history::Period::OneHour, 1_000_000).await.unwrap();
        match raw {
            netwatch_history::DeviceHistoryResult::Raw(rows) => assert_eq!(rows.len(), 2),
            _ => panic!("expected raw rows"),
        }
    }
}
