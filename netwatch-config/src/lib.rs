//! Config store (C1): durable `{areas, devices, links, settings}` JSON.
//!
//! `Save` is the only mutator; every other subsystem reads an immutable
//! snapshot (spec.md §4.1). The on-disk format is plain `serde_json` (not
//! the teacher's usual JSON5) because spec.md §6 names an exact
//! `data/config.json` schema consumed by the out-of-scope config-editing
//! UI — see DESIGN.md, Open Question 1's sibling decision.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use netwatch_common::{Area, Device, Link, Thresholds};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, watch};

/// Global settings embedded in the Config snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
        }
    }
}

/// An immutable topology snapshot. Subsystems clone the `Arc` they're
/// handed; they never mutate it (spec.md §9 "Global mutable state").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default)]
    pub areas: Vec<Area>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub settings: Settings,
}

impl ConfigSnapshot {
    /// A compiled-in default used when no config file exists yet, matching
    /// scenario 1 of spec.md §8 (two devices, one link, default thresholds).
    pub fn default_seed() -> Self {
        use netwatch_common::{AreaType, Criticality, DeviceType, Endpoint};

        ConfigSnapshot {
            areas: vec![
                Area {
                    id: "area-public-dns-a".into(),
                    name: "Public DNS A".into(),
                    area_type: AreaType::ServerRelay,
                    lat: 0.0,
                    lng: 0.0,
                },
                Area {
                    id: "area-public-dns-b".into(),
                    name: "Public DNS B".into(),
                    area_type: AreaType::ServerRelay,
                    lat: 0.0,
                    lng: 0.0,
                },
            ],
            devices: vec![
                Device {
                    id: "dev-google-dns".into(),
                    area_id: "area-public-dns-a".into(),
                    name: "Google DNS".into(),
                    device_type: DeviceType::Router,
                    ip: "8.8.8.8".into(),
                    criticality: Criticality::Normal,
                    thresholds: None,
                    snmp_enabled: None,
                    snmp_community: None,
                    snmp_version: None,
                },
                Device {
                    id: "dev-cloudflare-dns".into(),
                    area_id: "area-public-dns-b".into(),
                    name: "Cloudflare DNS".into(),
                    device_type: DeviceType::Router,
                    ip: "1.1.1.1".into(),
                    criticality: Criticality::Normal,
                    thresholds: None,
                    snmp_enabled: None,
                    snmp_community: None,
                    snmp_version: None,
                },
            ],
            links: vec![Link {
                id: "link-dns-a-b".into(),
                endpoints: [
                    Endpoint {
                        area_id: Some("area-public-dns-a".into()),
                        ..Default::default()
                    },
                    Endpoint {
                        area_id: Some("area-public-dns-b".into()),
                        ..Default::default()
                    },
                ],
                link_type: None,
                metadata: None,
            }],
            settings: Settings::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Durable config store with atomic writes and a reload broadcast.
///
/// `Watch()` fires on every successful `Save` (spec.md §4.1); the scheduler
/// subscribes to this to implement config-reload semantics (P14).
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<ConfigSnapshot>>,
    watch_tx: watch::Sender<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Load the store from `path`, seeding with the compiled-in default if
    /// the file does not exist (spec.md §4.1 `Load()`).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, seeding default");
                ConfigSnapshot::default_seed()
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot = Arc::new(snapshot);
        let (watch_tx, _) = watch::channel(snapshot.clone());

        Ok(Self {
            path,
            current: RwLock::new(snapshot),
            watch_tx,
        })
    }

    /// Current snapshot (spec.md §4.1 `Load()` read path, post-startup).
    pub async fn load(&self) -> Arc<ConfigSnapshot> {
        self.current.read().await.clone()
    }

    /// Re-read `path` from disk and broadcast the result, without writing
    /// anything. Used by `/api/import` after it has replaced the config
    /// file wholesale outside of `save()` (spec.md §9 Open Question 2).
    pub async fn reload_from_disk(&self) -> Result<(), ConfigError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let snapshot = Arc::new(serde_json::from_str::<ConfigSnapshot>(&content)?);
        *self.current.write().await = snapshot.clone();
        let _ = self.watch_tx.send(snapshot);
        Ok(())
    }

    /// Persist a new snapshot atomically (write-tmp, fsync, rename) and
    /// notify watchers (spec.md §4.1 `Save()`).
    pub async fn save(&self, snapshot: ConfigSnapshot) -> Result<(), ConfigError> {
        let body = serde_json::to_vec_pretty(&snapshot)?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let file = tokio::fs::File::create(&tmp_path).await?;
            use tokio::io::AsyncWriteExt;
            let mut file = file;
            file.write_all(&body).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp_path, &self.path).await?;

        let snapshot = Arc::new(snapshot);
        *self.current.write().await = snapshot.clone();
        // A send error only happens with no receivers left; that's fine —
        // it just means nobody is watching yet.
        let _ = self.watch_tx.send(snapshot);

        Ok(())
    }

    /// Subscribe to snapshot changes (spec.md §4.1 `Watch()`).
    pub fn watch(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.watch_tx.subscribe()
    }
}
