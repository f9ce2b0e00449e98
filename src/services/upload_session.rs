//! Chunk session manager (component D). Grounded on the teacher's
//! `UploadTracker` (`examples/pk5ls20-echo/src/services/upload_tracker.rs`)
//! for the on-disk tmp-file/positioned-write/SHA-verify shape, reassembled
//! around the fast-store-backed session state machine this spec requires:
//! completed/failed indices live in their own atomically-mutated sets, not
//! a serialised bit array, so concurrent distinct-index chunk uploads never
//! contend on the same key.
use crate::models::chunk_session::{ChunkSession, ChunkSessionProgress, ChunkSessionStatus};
use crate::models::const_val::{
    CANCEL_GRACE_WINDOW, CHUNK_SESSION_TTL, MAX_ASSEMBLED_SIZE, MAX_CHUNKS_PER_SESSION,
};
use crate::services::file_store::{FileStoreError, FileStoreService};
use crate::services::states::db::{DataBaseError, DataBaseState};
use crate::services::states::fastkv::{FastKv, FastKvError, MokaFastKv};
use crate::services::validation::{SizeCeilings, ValidationError, validate_upload};
use crate::utils::hex_ext::HexString;
use crate::utils::stream_pipeline::stream_pipeline;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::io::{Read, Write};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ChunkSessionError {
    #[error("upload session not found")]
    NotFound,
    #[error("session belongs to a different user")]
    WrongOwner,
    #[error("session is in a terminal state")]
    TerminalState,
    #[error("chunk index {idx} is out of range (total_chunks={total})")]
    ChunkOutOfRange { idx: u32, total: u32 },
    #[error("chunk {idx} declared length {got} does not match expected {expected}")]
    ChunkLengthMismatch { idx: u32, expected: u64, got: u64 },
    #[error("chunk {idx} checksum mismatch")]
    ChunkChecksumMismatch { idx: u32 },
    #[error("assembly incomplete, missing chunks: {missing:?}")]
    IncompleteAssembly { missing: Vec<u32> },
    #[error("assembled size {got} does not match declared total {expected}")]
    AssembledSizeMismatch { expected: u64, got: u64 },
    #[error("whole-file checksum mismatch")]
    WholeFileChecksumMismatch,
    #[error("too many chunks for one session")]
    TooManyChunks,
    #[error("file of {size} bytes is below the {threshold}-byte chunking threshold; use the single-shot path")]
    BelowChunkThreshold { size: u64, threshold: u64 },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    FastKv(#[from] FastKvError),
    #[error(transparent)]
    Database(#[from] DataBaseError),
    #[error(transparent)]
    FileStore(#[from] FileStoreError),
}

pub type ChunkSessionResult<T> = Result<T, ChunkSessionError>;

fn session_key(id: Uuid) -> String {
    format!("chunk_session:{id}")
}
fn uploaded_key(id: Uuid) -> String {
    format!("chunk_uploaded:{id}")
}
fn failed_key(id: Uuid) -> String {
    format!("chunk_failed:{id}")
}
fn progress_key(id: Uuid) -> String {
    format!("chunk_progress:{id}")
}

pub struct UploadSessionManager {
    kv: MokaFastKv,
    chunk_root: PathBuf,
}

impl UploadSessionManager {
    pub fn new(kv: MokaFastKv, chunk_root: impl Into<PathBuf>) -> Self {
        Self {
            kv,
            chunk_root: chunk_root.into(),
        }
    }

    fn session_chunk_dir(&self, session_id: Uuid) -> PathBuf {
        self.chunk_root.join(session_id.to_string())
    }

    fn chunk_path(&self, session_id: Uuid, idx: u32) -> PathBuf {
        self.session_chunk_dir(session_id).join(format!("chunk_{idx:04}"))
    }

    pub async fn initiate(
        &self,
        db: &DataBaseState,
        owner_user_id: i64,
        original_name: String,
        declared_mime: String,
        total_size: u64,
        chunk_size: NonZeroU32,
    ) -> ChunkSessionResult<ChunkSession> {
        if total_size > MAX_ASSEMBLED_SIZE {
            return Err(ChunkSessionError::AssembledSizeMismatch {
                expected: MAX_ASSEMBLED_SIZE,
                got: total_size,
            });
        }
        let (threshold,) = crate::get_batch_tuple!(db.dyn_settings(), crate::models::dyn_setting::ChunkUploadThreshold)?;
        if total_size < threshold {
            return Err(ChunkSessionError::BelowChunkThreshold {
                size: total_size,
                threshold,
            });
        }
        let cs = chunk_size.get() as u64;
        let total_chunks = total_size.div_ceil(cs);
        if total_chunks > MAX_CHUNKS_PER_SESSION {
            return Err(ChunkSessionError::TooManyChunks);
        }
        let total_chunks = total_chunks as u32;
        let now = OffsetDateTime::now_utc();
        let session = ChunkSession {
            session_id: Uuid::new_v4(),
            owner_user_id,
            original_name,
            declared_mime,
            total_size,
            chunk_size: chunk_size.get(),
            total_chunks,
            status: ChunkSessionStatus::Pending,
            last_error: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
            expires_at: now + CHUNK_SESSION_TTL,
        };
        tokio::fs::create_dir_all(self.session_chunk_dir(session.session_id)).await?;
        self.kv
            .hash_set(
                &session_key(session.session_id),
                &session,
                Some(CHUNK_SESSION_TTL.try_into().unwrap_or_default()),
            )
            .await?;
        Ok(session)
    }

    async fn load(&self, session_id: Uuid) -> ChunkSessionResult<ChunkSession> {
        self.kv
            .hash_get::<ChunkSession>(&session_key(session_id))
            .await?
            .ok_or(ChunkSessionError::NotFound)
    }

    fn check_owner_and_revive(
        session: &mut ChunkSession,
        owner_user_id: i64,
        now: OffsetDateTime,
    ) -> ChunkSessionResult<()> {
        if session.owner_user_id != owner_user_id {
            return Err(ChunkSessionError::WrongOwner);
        }
        if session.status == ChunkSessionStatus::Cancelled {
            if session.within_grace_window(now, CANCEL_GRACE_WINDOW) {
                session.status = ChunkSessionStatus::Uploading;
                session.cancelled_at = None;
            } else {
                return Err(ChunkSessionError::TerminalState);
            }
        } else if matches!(
            session.status,
            ChunkSessionStatus::Completed | ChunkSessionStatus::Failed
        ) {
            return Err(ChunkSessionError::TerminalState);
        }
        Ok(())
    }

    pub async fn accept_chunk(
        &self,
        session_id: Uuid,
        owner_user_id: i64,
        idx: u32,
        bytes: &[u8],
        expected_sha256: [u8; 32],
    ) -> ChunkSessionResult<ChunkSessionProgress> {
        let now = OffsetDateTime::now_utc();
        let ttl = CHUNK_SESSION_TTL.try_into().unwrap_or_default();
        self.kv
            .hash_update::<ChunkSession, _, _>(&session_key(session_id), Some(ttl), |current| {
                let Some(mut session) = current else {
                    return (None, Err(ChunkSessionError::NotFound));
                };
                if let Err(e) = Self::check_owner_and_revive(&mut session, owner_user_id, now) {
                    let prev = session.clone();
                    return (Some(prev), Err(e));
                }
                if idx >= session.total_chunks {
                    let prev = session.clone();
                    return (
                        Some(prev),
                        Err(ChunkSessionError::ChunkOutOfRange {
                            idx,
                            total: session.total_chunks,
                        }),
                    );
                }
                if session.status == ChunkSessionStatus::Pending {
                    session.status = ChunkSessionStatus::Uploading;
                }
                session.updated_at = now;
                session.expires_at = now + CHUNK_SESSION_TTL;
                (Some(session), Ok(()))
            })
            .await??;
        let session = self.load(session_id).await?;

        if self.kv.set_contains(&uploaded_key(session_id), &idx.to_string()).await {
            return self.progress_snapshot(&session).await;
        }

        let expected_len = session.chunk_len_at(idx);
        if bytes.len() as u64 != expected_len {
            self.kv.set_add(&failed_key(session_id), idx.to_string(), Some(ttl)).await;
            return Err(ChunkSessionError::ChunkLengthMismatch {
                idx,
                expected: expected_len,
                got: bytes.len() as u64,
            });
        }
        let actual_sha256: [u8; 32] = Sha256::digest(bytes).into();
        if actual_sha256 != expected_sha256 {
            self.kv.set_add(&failed_key(session_id), idx.to_string(), Some(ttl)).await;
            return Err(ChunkSessionError::ChunkChecksumMismatch { idx });
        }

        let path = self.chunk_path(session_id, idx);
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut f = std::fs::File::create(path)?;
            f.write_all(&bytes)?;
            Ok(())
        })
        .await
        .expect("chunk write task panicked")?;

        self.kv.set_add(&uploaded_key(session_id), idx.to_string(), Some(ttl)).await;
        self.kv.set_remove(&failed_key(session_id), &idx.to_string()).await;

        self.progress_snapshot(&session).await
    }

    async fn progress_snapshot(&self, session: &ChunkSession) -> ChunkSessionResult<ChunkSessionProgress> {
        let completed = self.kv.set_len(&uploaded_key(session.session_id)).await as u32;
        let failed: Vec<u32> = self
            .kv
            .set_members(&failed_key(session.session_id))
            .await
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        let percentage = if session.total_chunks == 0 {
            100
        } else {
            ((completed as u64 * 100) / session.total_chunks as u64) as u8
        };
        let progress = ChunkSessionProgress {
            session_id: session.session_id,
            status: session.status,
            completed_count: completed,
            total_chunks: session.total_chunks,
            failed,
            percentage,
            terminal: session.status.is_terminal(),
        };
        self.kv
            .hash_set(&progress_key(session.session_id), &progress, Some(CHUNK_SESSION_TTL.try_into().unwrap_or_default()))
            .await?;
        Ok(progress)
    }

    pub async fn progress(&self, session_id: Uuid, owner_user_id: i64) -> ChunkSessionResult<ChunkSessionProgress> {
        let now = OffsetDateTime::now_utc();
        let ttl = CHUNK_SESSION_TTL.try_into().unwrap_or_default();
        self.kv
            .hash_update::<ChunkSession, _, _>(&session_key(session_id), Some(ttl), |current| {
                let Some(mut session) = current else {
                    return (None, Err(ChunkSessionError::NotFound));
                };
                if session.owner_user_id != owner_user_id {
                    let prev = session.clone();
                    return (Some(prev), Err(ChunkSessionError::WrongOwner));
                }
                if session.status == ChunkSessionStatus::Cancelled
                    && session.within_grace_window(now, CANCEL_GRACE_WINDOW)
                {
                    session.status = ChunkSessionStatus::Uploading;
                    session.cancelled_at = None;
                }
                let snapshot = session.clone();
                (Some(session), Ok(snapshot))
            })
            .await??;
        let session = self.load(session_id).await?;
        self.progress_snapshot(&session).await
    }

    pub async fn cancel(&self, session_id: Uuid, owner_user_id: i64) -> ChunkSessionResult<()> {
        let now = OffsetDateTime::now_utc();
        let ttl = CANCEL_GRACE_WINDOW.try_into().unwrap_or_default();
        self.kv
            .hash_update::<ChunkSession, _, _>(&session_key(session_id), Some(ttl), |current| {
                let Some(mut session) = current else {
                    return (None, Err(ChunkSessionError::NotFound));
                };
                if session.owner_user_id != owner_user_id {
                    let prev = session.clone();
                    return (Some(prev), Err(ChunkSessionError::WrongOwner));
                }
                session.status = ChunkSessionStatus::Cancelled;
                session.cancelled_at = Some(now);
                session.updated_at = now;
                (Some(session), Ok(()))
            })
            .await??;
        Ok(())
    }

    /// Assembles, validates and persists the session's chunks into the
    /// content-addressed store. `whole_file_sha256` is optional per spec.
    pub async fn complete(
        &self,
        db: &DataBaseState,
        file_store: &FileStoreService,
        size_ceilings: &SizeCeilings,
        mime_allow_list: Option<&[Cow<'static, str>]>,
        session_id: Uuid,
        owner_user_id: i64,
        whole_file_sha256: Option<[u8; 32]>,
    ) -> ChunkSessionResult<(crate::models::file::FileRecord, bool)> {
        let session = self.load(session_id).await?;
        if session.owner_user_id != owner_user_id {
            return Err(ChunkSessionError::WrongOwner);
        }
        let completed: std::collections::BTreeSet<u32> = self
            .kv
            .set_members(&uploaded_key(session_id))
            .await
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        let missing: Vec<u32> = (0..session.total_chunks)
            .filter(|i| !completed.contains(i))
            .collect();
        if !missing.is_empty() {
            return Err(ChunkSessionError::IncompleteAssembly { missing });
        }

        self.set_status(session_id, ChunkSessionStatus::Assembling).await?;

        let dir = self.session_chunk_dir(session_id);
        let total_chunks = session.total_chunks;
        let total_size = session.total_size;
        let (tmp_path, checksum, assembled_len, first_bytes) = tokio::task::spawn_blocking(move || -> ChunkSessionResult<(PathBuf, String, u64, Vec<u8>)> {
            let tmp = tempfile::NamedTempFile::new()?;
            let mut hasher = Sha256::new();
            let mut first_bytes = Vec::new();
            let mut written: u64 = 0;
            {
                let mut out = std::fs::File::create(tmp.path())?;
                for idx in 0..total_chunks {
                    let chunk_path = dir.join(format!("chunk_{idx:04}"));
                    let mut chunk = std::fs::File::open(&chunk_path)?;
                    let mut buf = Vec::new();
                    chunk.read_to_end(&mut buf)?;
                    if idx == 0 {
                        first_bytes = buf[..buf.len().min(8192)].to_vec();
                    }
                    hasher.update(&buf);
                    out.write_all(&buf)?;
                    written += buf.len() as u64;
                }
            }
            let (_file, path) = tmp.keep().map_err(|e| e.error)?;
            Ok((path, hasher.finalize().hex(), written, first_bytes))
        })
        .await
        .expect("assembly task panicked")?;

        if assembled_len != total_size {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            self.fail(session_id, "assembled size mismatch").await?;
            return Err(ChunkSessionError::AssembledSizeMismatch {
                expected: total_size,
                got: assembled_len,
            });
        }
        if let Some(expected) = whole_file_sha256 {
            let got: [u8; 32] = hex::decode(&checksum)
                .ok()
                .and_then(|v| v.try_into().ok())
                .unwrap_or([0u8; 32]);
            if got != expected {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                self.fail(session_id, "whole-file checksum mismatch").await?;
                return Err(ChunkSessionError::WholeFileChecksumMismatch);
            }
        }

        if let Err(e) = validate_upload(
            &session.original_name,
            &session.declared_mime,
            assembled_len,
            mime_allow_list,
            size_ceilings,
            Some(&first_bytes),
        ) {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            self.fail(session_id, "assembled content failed validation").await?;
            return Err(e.into());
        }

        let ext = infer::get(&first_bytes)
            .map(|t| t.extension().to_string())
            .unwrap_or_default();

        let (record, is_new) = file_store
            .put_assembled(
                db,
                &tmp_path,
                checksum,
                assembled_len,
                session.original_name.clone(),
                session.declared_mime.clone(),
                &ext,
                owner_user_id,
            )
            .await?;

        self.set_status(session_id, ChunkSessionStatus::Completed).await?;
        let _ = tokio::fs::remove_dir_all(self.session_chunk_dir(session_id)).await;

        Ok((record, is_new))
    }

    async fn set_status(&self, session_id: Uuid, status: ChunkSessionStatus) -> ChunkSessionResult<()> {
        let ttl = CHUNK_SESSION_TTL.try_into().unwrap_or_default();
        self.kv
            .hash_update::<ChunkSession, _, _>(&session_key(session_id), Some(ttl), |current| {
                let Some(mut session) = current else {
                    return (None, ());
                };
                session.status = status;
                session.updated_at = OffsetDateTime::now_utc();
                (Some(session), ())
            })
            .await?;
        Ok(())
    }

    async fn fail(&self, session_id: Uuid, reason: &str) -> ChunkSessionResult<()> {
        let ttl = CHUNK_SESSION_TTL.try_into().unwrap_or_default();
        self.kv
            .hash_update::<ChunkSession, _, _>(&session_key(session_id), Some(ttl), |current| {
                let Some(mut session) = current else {
                    return (None, ());
                };
                session.status = ChunkSessionStatus::Failed;
                session.last_error = Some(reason.to_string());
                session.updated_at = OffsetDateTime::now_utc();
                (Some(session), ())
            })
            .await?;
        Ok(())
    }

    /// Removes a cancelled session past its grace window, and completely
    /// expired sessions of any status. Called by component I.
    pub async fn sweep_expired(&self, now: OffsetDateTime) -> Vec<Uuid> {
        let mut removed = Vec::new();
        for key in self.kv.scan_prefix("chunk_session:").await {
            let Some(id_str) = key.strip_prefix("chunk_session:") else {
                continue;
            };
            let Ok(id) = Uuid::parse_str(id_str) else {
                continue;
            };
            let Ok(Some(session)) = self.kv.hash_get::<ChunkSession>(&key).await else {
                continue;
            };
            let cancelled_expired = session.status == ChunkSessionStatus::Cancelled
                && !session.within_grace_window(now, CANCEL_GRACE_WINDOW);
            let ttl_expired = session.expires_at <= now;
            if cancelled_expired || ttl_expired {
                self.kv.delete(&key).await;
                self.kv.delete(&uploaded_key(id)).await;
                self.kv.delete(&failed_key(id)).await;
                self.kv.delete(&progress_key(id)).await;
                let _ = tokio::fs::remove_dir_all(self.session_chunk_dir(id)).await;
                removed.push(id);
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    fn manager(dir: &std::path::Path) -> UploadSessionManager {
        UploadSessionManager::new(MokaFastKv::new(), dir.to_path_buf())
    }

    fn checksum(bytes: &[u8]) -> [u8; 32] {
        Sha256::digest(bytes).into()
    }

    /// In-memory DB with the chunk-upload threshold zeroed, so tests can
    /// exercise chunk sessions with small payloads without tripping the
    /// below-threshold rejection meant for real-sized uploads.
    async fn test_db() -> DataBaseState {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let db = DataBaseState::new(pool);
        db.dyn_settings().initialise().await.unwrap();
        db.dyn_settings()
            .set_inner("Upload.ChunkUploadThreshold", "0", db.pool())
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn initiate_computes_total_chunks_by_ceiling_division() {
        let db = test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr
            .initiate(&db, 1, "a.bin".into(), "application/octet-stream".into(), 10, NonZeroU32::new(4).unwrap())
            .await
            .unwrap();
        assert_eq!(session.total_chunks, 3);
        assert_eq!(session.status, ChunkSessionStatus::Pending);
    }

    #[tokio::test]
    async fn initiate_rejects_files_below_the_chunking_threshold() {
        let db = test_db().await;
        db.dyn_settings()
            .set_inner("Upload.ChunkUploadThreshold", "1024", db.pool())
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let err = mgr
            .initiate(&db, 1, "a.bin".into(), "application/octet-stream".into(), 100, NonZeroU32::new(4).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkSessionError::BelowChunkThreshold { size: 100, threshold: 1024 }));
    }

    #[tokio::test]
    async fn initiate_rejects_sessions_with_too_many_chunks() {
        let db = test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let total = (MAX_CHUNKS_PER_SESSION + 1) * 4;
        let err = mgr
            .initiate(&db, 1, "a.bin".into(), "application/octet-stream".into(), total, NonZeroU32::new(4).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkSessionError::TooManyChunks));
    }

    #[tokio::test]
    async fn accept_chunk_then_progress_reports_completion() {
        let db = test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr
            .initiate(&db, 1, "a.bin".into(), "application/octet-stream".into(), 10, NonZeroU32::new(5).unwrap())
            .await
            .unwrap();
        let chunk0 = vec![1u8; 5];
        mgr.accept_chunk(session.session_id, 1, 0, &chunk0, checksum(&chunk0))
            .await
            .unwrap();
        let progress = mgr.progress(session.session_id, 1).await.unwrap();
        assert_eq!(progress.completed_count, 1);
        assert_eq!(progress.total_chunks, 2);
        assert_eq!(progress.percentage, 50);
    }

    #[tokio::test]
    async fn accept_chunk_rejects_checksum_mismatch() {
        let db = test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr
            .initiate(&db, 1, "a.bin".into(), "application/octet-stream".into(), 5, NonZeroU32::new(5).unwrap())
            .await
            .unwrap();
        let chunk0 = vec![1u8; 5];
        let wrong = [0u8; 32];
        let err = mgr
            .accept_chunk(session.session_id, 1, 0, &chunk0, wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkSessionError::ChunkChecksumMismatch { idx: 0 }));
    }

    #[tokio::test]
    async fn accept_chunk_rejects_out_of_range_index() {
        let db = test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr
            .initiate(&db, 1, "a.bin".into(), "application/octet-stream".into(), 5, NonZeroU32::new(5).unwrap())
            .await
            .unwrap();
        let chunk = vec![1u8; 5];
        let err = mgr
            .accept_chunk(session.session_id, 1, 7, &chunk, checksum(&chunk))
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkSessionError::ChunkOutOfRange { idx: 7, total: 1 }));
    }

    #[tokio::test]
    async fn accept_chunk_rejects_wrong_owner() {
        let db = test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr
            .initiate(&db, 1, "a.bin".into(), "application/octet-stream".into(), 5, NonZeroU32::new(5).unwrap())
            .await
            .unwrap();
        let chunk = vec![1u8; 5];
        let err = mgr
            .accept_chunk(session.session_id, 2, 0, &chunk, checksum(&chunk))
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkSessionError::WrongOwner));
    }

    #[tokio::test]
    async fn cancel_within_grace_window_is_silently_revived_by_next_chunk() {
        let db = test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr
            .initiate(&db, 1, "a.bin".into(), "application/octet-stream".into(), 5, NonZeroU32::new(5).unwrap())
            .await
            .unwrap();
        mgr.cancel(session.session_id, 1).await.unwrap();
        let chunk = vec![1u8; 5];
        let progress = mgr
            .accept_chunk(session.session_id, 1, 0, &chunk, checksum(&chunk))
            .await
            .unwrap();
        assert_eq!(progress.status, ChunkSessionStatus::Uploading);
    }

    #[tokio::test]
    async fn cancel_rejects_wrong_owner() {
        let db = test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let session = mgr
            .initiate(&db, 1, "a.bin".into(), "application/octet-stream".into(), 5, NonZeroU32::new(5).unwrap())
            .await
            .unwrap();
        let err = mgr.cancel(session.session_id, 2).await.unwrap_err();
        assert!(matches!(err, ChunkSessionError::WrongOwner));
    }
}
