//! `/api/export` and `/api/import`: a ZIP of `{config.json, database}`
//! (spec.md §6), grounded on the `zip` crate pairing surfaced by
//! `lachen-nv-bare-metal-manager-core` and `openobserve-openobserve`'s
//! manifests (no in-pack file exercises the writer API, so this follows the
//! crate's documented 0.6 surface directly: `ZipWriter::start_file` +
//! `write_all`, `ZipArchive::by_name` on the way back in).

use std::io::{Cursor, Read, Write};

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use netwatch_common::current_timestamp_millis;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::state::AppState;

const CONFIG_ENTRY: &str = "config.json";
const DATABASE_ENTRY: &str = "database";

pub async fn export(State(state): State<AppState>) -> Response {
    let config_bytes = match tokio::fs::read(state.config_path()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to read config: {e}"))
                .into_response();
        }
    };
    let database_bytes = match tokio::fs::read(state.history_path()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to read database: {e}"))
                .into_response();
        }
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        if let Err(e) = writer
            .start_file(CONFIG_ENTRY, options)
            .and_then(|_| writer.write_all(&config_bytes).map_err(Into::into))
        {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to pack config: {e}"))
                .into_response();
        }
        if let Err(e) = writer
            .start_file(DATABASE_ENTRY, options)
            .and_then(|_| writer.write_all(&database_bytes).map_err(Into::into))
        {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to pack database: {e}"))
                .into_response();
        }
        if let Err(e) = writer.finish() {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to finish archive: {e}"))
                .into_response();
        }
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"netwatch-export.zip\"".to_string(),
            ),
        ],
        cursor.into_inner(),
    )
        .into_response()
}

/// Validate and unpack an uploaded ZIP, then stop/swap/reopen/resume the
/// engine around the new files (spec.md §9 Open Question 2). The previous
/// `config.json`/`history.db` are preserved under `backup-{epoch}/` before
/// being overwritten.
pub async fn import(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut archive_bytes: Option<Vec<u8>> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("invalid upload: {e}")).into_response();
            }
        };
        match field.bytes().await {
            Ok(bytes) => {
                archive_bytes = Some(bytes.to_vec());
                break;
            }
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("invalid upload: {e}")).into_response();
            }
        }
    }

    let archive_bytes = match archive_bytes {
        Some(bytes) => bytes,
        None => return (StatusCode::BAD_REQUEST, "missing archive field").into_response(),
    };

    let (config_bytes, database_bytes) = match unpack_archive(&archive_bytes) {
        Ok(pair) => pair,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };

    let _guard = state.import_lock.lock().await;
    state.scheduler.pause();

    let result = apply_import(&state, &config_bytes, &database_bytes).await;

    state.scheduler.reload().await;
    state.scheduler.resume();

    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "import failed after maintenance window opened");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

fn unpack_archive(bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>), String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a valid zip: {e}"))?;

    let mut config_bytes = Vec::new();
    archive
        .by_name(CONFIG_ENTRY)
        .map_err(|_| format!("archive missing {CONFIG_ENTRY} entry"))?
        .read_to_end(&mut config_bytes)
        .map_err(|e| format!("failed to read {CONFIG_ENTRY}: {e}"))?;

    let mut database_bytes = Vec::new();
    archive
        .by_name(DATABASE_ENTRY)
        .map_err(|_| format!("archive missing {DATABASE_ENTRY} entry"))?
        .read_to_end(&mut database_bytes)
        .map_err(|e| format!("failed to read {DATABASE_ENTRY}: {e}"))?;

    serde_json::from_slice::<netwatch_config::ConfigSnapshot>(&config_bytes)
        .map_err(|e| format!("{CONFIG_ENTRY} is not a valid config: {e}"))?;

    Ok((config_bytes, database_bytes))
}

async fn apply_import(
    state: &AppState,
    config_bytes: &[u8],
    database_bytes: &[u8],
) -> Result<(), String> {
    let backup_dir = state.data_dir.join(format!("backup-{}", current_timestamp_millis()));
    tokio::fs::create_dir_all(&backup_dir)
        .await
        .map_err(|e| format!("failed to create backup dir: {e}"))?;

    if tokio::fs::try_exists(state.config_path()).await.unwrap_or(false) {
        tokio::fs::copy(state.config_path(), backup_dir.join(CONFIG_ENTRY))
            .await
            .map_err(|e| format!("failed to back up config: {e}"))?;
    }
    if tokio::fs::try_exists(state.history_path()).await.unwrap_or(false) {
        tokio::fs::copy(state.history_path(), backup_dir.join("history.db"))
            .await
            .map_err(|e| format!("failed to back up database: {e}"))?;
    }

    tokio::fs::write(state.config_path(), config_bytes)
        .await
        .map_err(|e| format!("failed to write config: {e}"))?;
    tokio::fs::write(state.history_path(), database_bytes)
        .await
        .map_err(|e| format!("failed to write database: {e}"))?;

    state
        .history
        .reopen()
        .await
        .map_err(|e| format!("failed to reopen database: {e}"))?;
    state
        .config
        .reload_from_disk()
        .await
        .map_err(|e| format!("failed to reload config: {e}"))?;
    state.cache.invalidate_all();

    Ok(())
}
