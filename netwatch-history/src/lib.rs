//! History store (C3): durable raw probe rows, time-bucketed aggregates,
//! and flapping events (spec.md §3, §4.3).
//!
//! Grounded on `sqlx` (sqlite, runtime-tokio, migrate) — the only SQL crate
//! appearing anywhere in the example pack for a monitoring-style history
//! store (`other_examples/manifests/H1ghBre4k3r-server-monitoring`). The
//! teacher itself (`p13marc-zensight`) has no durable store at all; this is
//! a pack enrichment, not a teacher-code transformation.

use std::path::{Path, PathBuf};

use chrono::Utc;
use netwatch_common::{Aggregate, HistoryRow, InterfaceReading, OperStatus, PeriodType, Status};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tokio::sync::RwLock;

const RAW_RETENTION_MS: i64 = 30 * 24 * 3_600_000;
const AGGREGATE_RETENTION_MS: i64 = 90 * 24 * 3_600_000;
const AGGREGATE_CLOSE_LAG_MS: i64 = 3_600_000;
const DEFAULT_LATEST_WINDOW_MS: i64 = RAW_RETENTION_MS;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("reset could not be verified safe: {0} rows remained after delete")]
    ResetUnsafe(i64),
}

fn is_corruption(err: &sqlx::Error) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("malformed") || message.contains("not a database")
}

async fn open_pool(path: &Path) -> Result<SqlitePool, HistoryError> {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Raw history + aggregate rows + flapping events, all in one SQLite file.
pub struct HistoryStore {
    path: PathBuf,
    pool: RwLock<SqlitePool>,
}

impl HistoryStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let pool = open_pool(&path).await?;
        Ok(Self {
            path,
            pool: RwLock::new(pool),
        })
    }

    /// Quarantine the current (corrupt) database file and open a fresh one
    /// in its place (spec.md §4.3 "Corruption handling").
    async fn quarantine_and_recreate(&self) -> Result<(), HistoryError> {
        let now = Utc::now().timestamp_millis();
        let backup_path = self
            .path
            .with_file_name(format!(
                "{}-corrupted-{now}.backup",
                self.path.file_name().and_then(|n| n.to_str()).unwrap_or("history.db")
            ));

        tracing::error!(
            path = %self.path.display(),
            backup = %backup_path.display(),
            "history store corruption detected, quarantining and recreating"
        );

        {
            let mut guard = self.pool.write().await;
            guard.close().await;
        }

        if tokio::fs::metadata(&self.path).await.is_ok() {
            tokio::fs::rename(&self.path, &backup_path).await?;
        }

        let fresh = open_pool(&self.path).await?;
        *self.pool.write().await = fresh;
        Ok(())
    }

    /// Close the current pool and reopen `path` from scratch, re-running
    /// migrations. Used by `/api/import` after the on-disk file has been
    /// replaced wholesale (spec.md §9 Open Question 2: stop, swap, reopen,
    /// resume).
    pub async fn reopen(&self) -> Result<(), HistoryError> {
        {
            let mut guard = self.pool.write().await;
            guard.close().await;
        }
        let fresh = open_pool(&self.path).await?;
        *self.pool.write().await = fresh;
        Ok(())
    }

    /// Run `op` against the current pool; on a detected corruption error,
    /// quarantine and retry exactly once (spec.md §4.3, §7 DBCorruption).
    async fn with_corruption_retry<T, F, Fut>(&self, op: F) -> Result<T, HistoryError>
    where
        F: Fn(SqlitePool) -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let pool = self.pool.read().await.clone();
        match op(pool).await {
            Ok(value) => Ok(value),
            Err(e) if is_corruption(&e) => {
                self.quarantine_and_recreate().await?;
                let pool = self.pool.read().await.clone();
                Ok(op(pool).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `InsertMany(rows)` — transactional (spec.md §4.3).
    pub async fn insert_many(&self, rows: &[HistoryRow]) -> Result<(), HistoryError> {
        if rows.is_empty() {
            return Ok(());
        }
        let rows = rows.to_vec();
        self.with_corruption_retry(move |pool| {
            let rows = rows.clone();
            async move {
                let mut tx = pool.begin().await?;
                for row in &rows {
                    sqlx::query(
                        "INSERT INTO history_rows (device_id, status, latency_ms, packet_loss, timestamp)
                         VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(&row.device_id)
                    .bind(status_str(row.status))
                    .bind(row.latency_ms)
                    .bind(row.packet_loss)
                    .bind(row.timestamp)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
                Ok(())
            }
        })
        .await
    }

    /// Persist a batch of SNMP interface readings (spec.md §4.4 batch
    /// writer — InterfaceReading samples share the ProbeResult flush path).
    pub async fn insert_interface_readings(
        &self,
        readings: &[InterfaceReading],
    ) -> Result<(), HistoryError> {
        if readings.is_empty() {
            return Ok(());
        }
        let readings = readings.to_vec();
        self.with_corruption_retry(move |pool| {
            let readings = readings.clone();
            async move {
                let mut tx = pool.begin().await?;
                for reading in &readings {
                    sqlx::query(
                        "INSERT INTO interface_readings
                            (device_id, if_index, if_name, oper_status, speed_mbps, in_octets,
                             out_octets, in_errors, out_errors, in_discards, out_discards, timestamp)
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(&reading.device_id)
                    .bind(reading.if_index)
                    .bind(&reading.if_name)
                    .bind(i32::from(reading.oper_status))
                    .bind(reading.speed_mbps)
                    .bind(reading.in_octets)
                    .bind(reading.out_octets)
                    .bind(reading.in_errors)
                    .bind(reading.out_errors)
                    .bind(reading.in_discards)
                    .bind(reading.out_discards)
                    .bind(reading.timestamp)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
                Ok(())
            }
        })
        .await
    }

    /// Persist a flapping event (spec.md §4.8 "Events persist in C3").
    pub async fn insert_flapping_event(
        &self,
        event: &netwatch_common::FlappingEvent,
    ) -> Result<(), HistoryError> {
        let event = event.clone();
        self.with_corruption_retry(move |pool| {
            let event = event.clone();
            async move {
                sqlx::query(
                    "INSERT INTO flapping_events
                        (device_id, if_index, if_name, event_type, from_value, to_value, severity, timestamp)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&event.device_id)
                .bind(event.if_index)
                .bind(&event.if_name)
                .bind(event_type_str(event.event_type))
                .bind(event.from.to_string())
                .bind(event.to.to_string())
                .bind(severity_str(event.severity))
                .bind(event.timestamp)
                .execute(&pool)
                .await?;
                Ok(())
            }
        })
        .await
    }

    /// `LatestPerDevice(windowMs)` — one row per device whose most recent
    /// history row falls within `[now-windowMs, now]` (spec.md §4.3).
    pub async fn latest_per_device(
        &self,
        window_ms: Option<i64>,
        now_ms: i64,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        let window_ms = window_ms.unwrap_or(DEFAULT_LATEST_WINDOW_MS);
        let cutoff = now_ms - window_ms;
        self.with_corruption_retry(move |pool| async move {
            let rows = sqlx::query(
                "SELECT hr.device_id, hr.status, hr.latency_ms, hr.packet_loss, hr.timestamp
                 FROM history_rows hr
                 INNER JOIN (
                     SELECT device_id, MAX(timestamp) AS max_ts
                     FROM history_rows
                     GROUP BY device_id
                 ) latest ON latest.device_id = hr.device_id AND latest.max_ts = hr.timestamp
                 WHERE hr.timestamp >= ?",
            )
            .bind(cutoff)
            .fetch_all(&pool)
            .await?;
            Ok(rows.into_iter().map(row_to_history_row).collect())
        })
        .await
    }

    /// Start timestamp of the most recent contiguous run of `down` rows for
    /// `device_id` (spec.md §4.9 offline duration). `None` if the device has
    /// no history or its latest row is not `down`.
    pub async fn down_streak_start(&self, device_id: &str) -> Result<Option<i64>, HistoryError> {
        let device_id = device_id.to_string();
        self.with_corruption_retry(move |pool| {
            let device_id = device_id.clone();
            async move {
                let row = sqlx::query(
                    "SELECT MIN(timestamp) AS streak_start
                     FROM history_rows
                     WHERE device_id = ?
                       AND status = 'down'
                       AND timestamp > COALESCE(
                           (SELECT MAX(timestamp) FROM history_rows
                            WHERE device_id = ? AND status != 'down'),
                           -1
                       )",
                )
                .bind(&device_id)
                .bind(&device_id)
                .fetch_one(&pool)
                .await?;
                Ok(row.try_get::<Option<i64>, _>("streak_start")?)
            }
        })
        .await
    }

    /// `DeviceHistory(deviceId, period)` — raw rows for `1h`/`24h`,
    /// aggregate rows for `7d`/`30d`, degrading to raw when aggregates are
    /// empty (spec.md §4.3).
    pub async fn device_history(
        &self,
        device_id: &str,
        period: Period,
        now_ms: i64,
    ) -> Result<DeviceHistoryResult, HistoryError> {
        match period {
            Period::OneHour | Period::TwentyFourHours => {
                let rows = self.raw_rows_since(device_id, period.window_ms(), now_ms).await?;
                Ok(DeviceHistoryResult::Raw(rows))
            }
            Period::SevenDays | Period::ThirtyDays => {
                let period_type = period.aggregate_period_type();
                let aggregates = self
                    .aggregate_rows_since(device_id, period_type, period.window_ms(), now_ms)
                    .await?;
                if aggregates.is_empty() {
                    let rows = self.raw_rows_since(device_id, period.window_ms(), now_ms).await?;
                    Ok(DeviceHistoryResult::Raw(rows))
                } else {
                    Ok(DeviceHistoryResult::Aggregated(aggregates))
                }
            }
        }
    }

    async fn raw_rows_since(
        &self,
        device_id: &str,
        window_ms: i64,
        now_ms: i64,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        let device_id = device_id.to_string();
        let cutoff = now_ms - window_ms;
        self.with_corruption_retry(move |pool| {
            let device_id = device_id.clone();
            async move {
                let rows = sqlx::query(
                    "SELECT device_id, status, latency_ms, packet_loss, timestamp
                     FROM history_rows
                     WHERE device_id = ? AND timestamp >= ?
                     ORDER BY timestamp ASC",
                )
                .bind(&device_id)
                .bind(cutoff)
                .fetch_all(&pool)
                .await?;
                Ok(rows.into_iter().map(row_to_history_row).collect())
            }
        })
        .await
    }

    async fn aggregate_rows_since(
        &self,
        device_id: &str,
        period_type: PeriodType,
        window_ms: i64,
        now_ms: i64,
    ) -> Result<Vec<Aggregate>, HistoryError> {
        let device_id = device_id.to_string();
        let cutoff = now_ms - window_ms;
        self.with_corruption_retry(move |pool| {
            let device_id = device_id.clone();
            async move {
                let rows = sqlx::query(
                    "SELECT device_id, period_type, period_start, avg_latency, min_latency,
                            max_latency, avg_packet_loss, uptime_percent, ping_count, down_count,
                            degraded_count
                     FROM aggregates
                     WHERE device_id = ? AND period_type = ? AND period_start >= ?
                     ORDER BY period_start ASC",
                )
                .bind(&device_id)
                .bind(period_type_str(period_type))
                .bind(cutoff)
                .fetch_all(&pool)
                .await?;
                Ok(rows.into_iter().map(row_to_aggregate).collect())
            }
        })
        .await
    }

    /// `UpsertAggregates()` — recompute every closed bucket (hourly and
    /// daily) whose `periodStart + bucketSize ≤ now − 1 hour`, upserting on
    /// the `(deviceId, periodType, periodStart)` key (spec.md §4.3). Safe
    /// to call repeatedly — upsert semantics make it idempotent (P12).
    pub async fn upsert_aggregates(&self, now_ms: i64) -> Result<(), HistoryError> {
        let cutoff = now_ms - AGGREGATE_CLOSE_LAG_MS;
        for period_type in [PeriodType::Hourly, PeriodType::Daily] {
            let bucket_size = period_type.bucket_size_ms();
            let period_type_label = period_type_str(period_type).to_string();
            self.with_corruption_retry(move |pool| {
                let period_type_label = period_type_label.clone();
                async move {
                    sqlx::query(
                        "INSERT INTO aggregates
                            (device_id, period_type, period_start, avg_latency, min_latency,
                             max_latency, avg_packet_loss, uptime_percent, ping_count, down_count,
                             degraded_count)
                         SELECT
                            device_id,
                            ? AS period_type,
                            (timestamp / ?) * ? AS period_start,
                            AVG(latency_ms),
                            MIN(latency_ms),
                            MAX(latency_ms),
                            AVG(packet_loss),
                            100.0 * SUM(CASE WHEN status = 'up' THEN 1 ELSE 0 END) / COUNT(*),
                            COUNT(*),
                            SUM(CASE WHEN status = 'down' THEN 1 ELSE 0 END),
                            SUM(CASE WHEN status = 'degraded' THEN 1 ELSE 0 END)
                         FROM history_rows
                         WHERE (timestamp / ?) * ? + ? <= ?
                         GROUP BY device_id, period_start
                         ON CONFLICT(device_id, period_type, period_start) DO UPDATE SET
                            avg_latency = excluded.avg_latency,
                            min_latency = excluded.min_latency,
                            max_latency = excluded.max_latency,
                            avg_packet_loss = excluded.avg_packet_loss,
                            uptime_percent = excluded.uptime_percent,
                            ping_count = excluded.ping_count,
                            down_count = excluded.down_count,
                            degraded_count = excluded.degraded_count",
                    )
                    .bind(period_type_label)
                    .bind(bucket_size)
                    .bind(bucket_size)
                    .bind(bucket_size)
                    .bind(bucket_size)
                    .bind(bucket_size)
                    .bind(cutoff)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await?;
        }
        Ok(())
    }

    /// `Expire()` — delete raw rows older than 30 days, aggregates older
    /// than 90 days (spec.md §4.3).
    pub async fn expire(&self, now_ms: i64) -> Result<(), HistoryError> {
        let raw_cutoff = now_ms - RAW_RETENTION_MS;
        let aggregate_cutoff = now_ms - AGGREGATE_RETENTION_MS;
        self.with_corruption_retry(move |pool| async move {
            sqlx::query("DELETE FROM history_rows WHERE timestamp < ?")
                .bind(raw_cutoff)
                .execute(&pool)
                .await?;
            sqlx::query("DELETE FROM aggregates WHERE period_start < ?")
                .bind(aggregate_cutoff)
                .execute(&pool)
                .await?;
            Ok(())
        })
        .await
    }

    /// `Reset()` — truncate `history_rows` and `aggregates`, writing a
    /// pre-reset backup copy of the database file first, then `VACUUM`
    /// (spec.md §4.3). The caller is responsible for invalidating C2
    /// afterward. Fails with [`HistoryError::ResetUnsafe`] if the
    /// post-delete row count is nonzero.
    pub async fn reset(&self) -> Result<(), HistoryError> {
        let now = Utc::now().timestamp_millis();
        let backup_path = self.path.with_file_name(format!(
            "{}-pre-reset-{now}.backup",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or("history.db")
        ));
        tokio::fs::copy(&self.path, &backup_path).await.ok();

        self.with_corruption_retry(move |pool| async move {
            let mut tx = pool.begin().await?;
            sqlx::query("DELETE FROM history_rows").execute(&mut *tx).await?;
            sqlx::query("DELETE FROM aggregates").execute(&mut *tx).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        let remaining: i64 = {
            let pool = self.pool.read().await.clone();
            let row = sqlx::query(
                "SELECT (SELECT COUNT(*) FROM history_rows) + (SELECT COUNT(*) FROM aggregates) AS n",
            )
            .fetch_one(&pool)
            .await?;
            row.try_get("n")?
        };
        if remaining > 0 {
            return Err(HistoryError::ResetUnsafe(remaining));
        }

        let pool = self.pool.read().await.clone();
        sqlx::query("VACUUM").execute(&pool).await?;

        Ok(())
    }

    /// Most recent interface reading per `(device_id, if_index)`, used as a
    /// fallback when the cache has nothing for a device (spec.md §9
    /// "Dual-store consistency" — history is the system-of-record).
    pub async fn latest_interface_readings(
        &self,
        device_id: &str,
    ) -> Result<Vec<InterfaceReading>, HistoryError> {
        let device_id = device_id.to_string();
        self.with_corruption_retry(move |pool| {
            let device_id = device_id.clone();
            async move {
                let rows = sqlx::query(
                    "SELECT ir.device_id, ir.if_index, ir.if_name, ir.oper_status, ir.speed_mbps,
                            ir.in_octets, ir.out_octets, ir.in_errors, ir.out_errors,
                            ir.in_discards, ir.out_discards, ir.timestamp
                     FROM interface_readings ir
                     INNER JOIN (
                         SELECT if_index, MAX(timestamp) AS max_ts
                         FROM interface_readings
                         WHERE device_id = ?
                         GROUP BY if_index
                     ) latest ON latest.if_index = ir.if_index AND latest.max_ts = ir.timestamp
                     WHERE ir.device_id = ?",
                )
                .bind(&device_id)
                .bind(&device_id)
                .fetch_all(&pool)
                .await?;
                Ok(rows.into_iter().map(row_to_interface_reading).collect())
            }
        })
        .await
    }

    /// Flapping events within the last `hours`, newest first (used by
    /// `GET /api/snmp/flapping-report?hours=N`, spec.md §6).
    pub async fn flapping_events_since(
        &self,
        hours: i64,
        now_ms: i64,
    ) -> Result<Vec<netwatch_common::FlappingEvent>, HistoryError> {
        let cutoff = now_ms - hours * 3_600_000;
        self.with_corruption_retry(move |pool| async move {
            let rows = sqlx::query(
                "SELECT device_id, if_index, if_name, event_type, from_value, to_value, severity, timestamp
                 FROM flapping_events
                 WHERE timestamp >= ?
                 ORDER BY timestamp DESC",
            )
            .bind(cutoff)
            .fetch_all(&pool)
            .await?;
            Ok(rows.into_iter().map(row_to_flapping_event).collect())
        })
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    OneHour,
    TwentyFourHours,
    SevenDays,
    ThirtyDays,
}

impl Period {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1h" => Some(Period::OneHour),
            "24h" => Some(Period::TwentyFourHours),
            "7d" => Some(Period::SevenDays),
            "30d" => Some(Period::ThirtyDays),
            _ => None,
        }
    }

    fn window_ms(self) -> i64 {
        match self {
            Period::OneHour => 3_600_000,
            Period::TwentyFourHours => 86_400_000,
            Period::SevenDays => 7 * 86_400_000,
            Period::ThirtyDays => 30 * 86_400_000,
        }
    }

    fn aggregate_period_type(self) -> PeriodType {
        match self {
            Period::SevenDays => PeriodType::Hourly,
            Period::ThirtyDays => PeriodType::Daily,
            _ => PeriodType::Hourly,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DeviceHistoryResult {
    Raw(Vec<HistoryRow>),
    Aggregated(Vec<Aggregate>),
}

fn status_str(status: Status) -> &'static str {
    match status {
        Status::Up => "up",
        Status::Degraded => "degraded",
        Status::Down => "down",
        Status::Unknown => "unknown",
    }
}

fn status_from_str(s: &str) -> Status {
    match s {
        "up" => Status::Up,
        "degraded" => Status::Degraded,
        "down" => Status::Down,
        _ => Status::Unknown,
    }
}

fn period_type_str(period_type: PeriodType) -> &'static str {
    match period_type {
        PeriodType::Hourly => "hourly",
        PeriodType::Daily => "daily",
    }
}

fn period_type_from_str(s: &str) -> PeriodType {
    match s {
        "daily" => PeriodType::Daily,
        _ => PeriodType::Hourly,
    }
}

fn event_type_str(event_type: netwatch_common::FlappingEventType) -> &'static str {
    match event_type {
        netwatch_common::FlappingEventType::SpeedChange => "speed_change",
        netwatch_common::FlappingEventType::StatusChange => "status_change",
    }
}

fn severity_str(severity: netwatch_common::Severity) -> &'static str {
    match severity {
        netwatch_common::Severity::Info => "info",
        netwatch_common::Severity::Warning => "warning",
        netwatch_common::Severity::Critical => "critical",
    }
}

fn row_to_history_row(row: sqlx::sqlite::SqliteRow) -> HistoryRow {
    HistoryRow {
        device_id: row.get("device_id"),
        status: status_from_str(row.get::<String, _>("status").as_str()),
        latency_ms: row.get("latency_ms"),
        packet_loss: row.get("packet_loss"),
        timestamp: row.get("timestamp"),
    }
}

fn row_to_aggregate(row: sqlx::sqlite::SqliteRow) -> Aggregate {
    Aggregate {
        device_id: row.get("device_id"),
        period_type: period_type_from_str(row.get::<String, _>("period_type").as_str()),
        period_start: row.get("period_start"),
        avg_latency: row.get("avg_latency"),
        min_latency: row.get("min_latency"),
        max_latency: row.get("max_latency"),
        avg_packet_loss: row.get("avg_packet_loss"),
        uptime_percent: row.get("uptime_percent"),
        ping_count: row.get("ping_count"),
        down_count: row.get("down_count"),
        degraded_count: row.get("degraded_count"),
    }
}

fn event_type_from_str(s: &str) -> netwatch_common::FlappingEventType {
    match s {
        "status_change" => netwatch_common::FlappingEventType::StatusChange,
        _ => netwatch_common::FlappingEventType::SpeedChange,
    }
}

fn severity_from_str(s: &str) -> netwatch_common::Severity {
    match s {
        "critical" => netwatch_common::Severity::Critical,
        "warning" => netwatch_common::Severity::Warning,
        _ => netwatch_common::Severity::Info,
    }
}

fn row_to_flapping_event(row: sqlx::sqlite::SqliteRow) -> netwatch_common::FlappingEvent {
    netwatch_common::FlappingEvent {
        device_id: row.get("device_id"),
        if_index: row.get("if_index"),
        if_name: row.get("if_name"),
        event_type: event_type_from_str(row.get::<String, _>("event_type").as_str()),
        from: serde_json::from_str(&row.get::<String, _>("from_value"))
            .unwrap_or(serde_json::Value::Null),
        to: serde_json::from_str(&row.get::<String, _>("to_value"))
            .unwrap_or(serde_json::Value::Null),
        severity: severity_from_str(row.get::<String, _>("severity").as_str()),
        timestamp: row.get("timestamp"),
    }
}

fn row_to_interface_reading(row: sqlx::sqlite::SqliteRow) -> InterfaceReading {
    InterfaceReading {
        device_id: row.get("device_id"),
        if_index: row.get("if_index"),
        if_name: row.get("if_name"),
        oper_status: OperStatus::try_from(row.get::<i32, _>("oper_status")).unwrap(),
        speed_mbps: row.get("speed_mbps"),
        in_octets: row.get("in_octets"),
        out_octets: row.get("out_octets"),
        in_errors: row.get("in_errors"),
        out_errors: row.get("out_errors"),
        in_discards: row.get("in_discards"),
        out_discards: row.get("out_discards"),
        timestamp: row.get("timestamp"),
    }
}
