//! Background periodic maintenance (component I): two independent
//! `tokio::time::interval` loops, grounded on the teacher's graceful-shutdown
//! signal `tokio::select!` pattern in `main.rs`, generalised into standalone
//! spawned tasks a caller can hold the `JoinHandle`s of.
use crate::services::states::FileCoreState;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Sweeps chunk sessions whose TTL elapsed or whose cancel grace window has
/// passed. Always idempotent: a session already swept by a previous tick is
/// silently skipped on the next.
pub fn spawn_session_sweeper(state: Arc<FileCoreState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = state.uploads.sweep_expired(OffsetDateTime::now_utc()).await;
            if !removed.is_empty() {
                tracing::info!(count = removed.len(), "swept expired upload sessions");
            }
        }
    })
}

/// Drains the notification hub's queued fanout for logging/dispatch. The hub
/// itself delivers live messages immediately; this tick exists to flush any
/// messages queued for sockets that were briefly disconnected.
pub fn spawn_notification_drain(state: Arc<FileCoreState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let drained = state.ws_hub.drain_queued().await;
            if drained > 0 {
                tracing::debug!(count = drained, "drained queued upload notifications");
            }
        }
    })
}

/// Garbage-collects blobs whose file record has no active attachment and is
/// older than `min_age`. Deletion failures are logged, never propagated:
/// orphan cleanup is best-effort by design.
pub async fn collect_unreferenced_blobs(state: &FileCoreState, min_age: time::Duration, limit: i64) {
    let candidates = match state.file_store.find_unreferenced(&state.db, min_age, limit).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "failed to list unreferenced files");
            return;
        }
    };
    for record in candidates {
        let storage_path = record.storage_path.clone();
        if let Err(e) = state.file_store.soft_delete(&state.db, record.id, record.uploader_id).await {
            tracing::warn!(file_id = %record.id, error = %e, "failed to garbage-collect unreferenced file");
            continue;
        }
        match state.file_store.store().absolute_path(&storage_path) {
            Ok(path) => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(file_id = %record.id, error = %e, "failed to remove orphaned blob");
                }
            }
            Err(e) => tracing::warn!(file_id = %record.id, error = %e, "failed to resolve orphaned blob path"),
        }
    }
}

/// Spawns `collect_unreferenced_blobs` on a recurring tick.
pub fn spawn_blob_collector(
    state: Arc<FileCoreState>,
    interval: Duration,
    min_age: time::Duration,
    limit: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            collect_unreferenced_blobs(&state, min_age, limit).await;
        }
    })
}
