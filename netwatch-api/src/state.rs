use std::path::PathBuf;
use std::sync::Arc;

use netwatch_batch::BatchWriter;
use netwatch_cache::CacheStore;
use netwatch_config::ConfigStore;
use netwatch_flapping::FlappingDetector;
use netwatch_history::HistoryStore;
use netwatch_ingest::Ingestor;
use netwatch_scheduler::Scheduler;
use tokio::sync::Mutex;

/// Everything a handler might need, injected via `axum::extract::State`
/// (spec.md §4.10).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub cache: Arc<CacheStore>,
    pub history: Arc<HistoryStore>,
    pub batch: Arc<BatchWriter>,
    pub scheduler: Arc<Scheduler>,
    pub ingestor: Arc<Ingestor>,
    pub flapping: Arc<FlappingDetector>,
    /// Directory containing `config.json`, `history.db`, and
    /// `backup-{epoch}/` (spec.md §6 "Persisted state layout").
    pub data_dir: PathBuf,
    /// Serializes `/api/import` runs so two concurrent uploads can't
    /// interleave their stop/swap/resume sequence (spec.md §9 Open
    /// Question 2).
    pub import_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        config: Arc<ConfigStore>,
        cache: Arc<CacheStore>,
        history: Arc<HistoryStore>,
        batch: Arc<BatchWriter>,
        scheduler: Arc<Scheduler>,
        ingestor: Arc<Ingestor>,
        flapping: Arc<FlappingDetector>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            cache,
            history,
            batch,
            scheduler,
            ingestor,
            flapping,
            data_dir,
            import_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }
}
