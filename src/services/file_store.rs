//! Content-addressed file store: on-disk blob layout plus the metadata index
//! in `files`. Grounded on the teacher's `UploadTracker::commit` path
//! (`examples/pk5ls20-echo/src/services/upload_tracker.rs`) for the
//! date-sharded layout and copy-then-drop commit pattern, reshaped around
//! component A's contract: the index is authoritative, a blob without an
//! active record is garbage.
use crate::models::file::{FileRecord, NewFileRecord, VirusScanStatus};
use crate::services::states::db::{DataBaseError, DataBaseState};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("storage path escapes the store root")]
    PathEscape,
    #[error("only the uploader may perform this operation")]
    NotOwner,
    #[error(transparent)]
    Database(#[from] DataBaseError),
}

pub type FileStoreResult<T> = Result<T, FileStoreError>;

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn month_shard(at: OffsetDateTime) -> String {
        format!("{:04}-{:02}", at.year(), u8::from(at.month()))
    }

    /// `<root>/<YYYY-MM>/<file-id>.<ext>`, relative to the store root.
    pub fn blob_relative_path(file_id: Uuid, ext: &str, at: OffsetDateTime) -> String {
        if ext.is_empty() {
            format!("{}/{}", Self::month_shard(at), file_id)
        } else {
            format!("{}/{}.{}", Self::month_shard(at), file_id, ext)
        }
    }

    pub fn thumbnail_relative_path(file_id: Uuid, ext: &str, at: OffsetDateTime) -> String {
        format!("{}/{}_thumb.{}", Self::month_shard(at), file_id, ext)
    }

    /// Resolves a relative storage path against the root, rejecting any path
    /// that normalises outside of it.
    fn resolve(&self, relative: &str) -> FileStoreResult<PathBuf> {
        let joined = self.root.join(relative);
        let mut normalised = PathBuf::new();
        for component in joined.components() {
            use std::path::Component;
            match component {
                Component::ParentDir => {
                    if !normalised.pop() {
                        return Err(FileStoreError::PathEscape);
                    }
                }
                Component::CurDir => {}
                other => normalised.push(other),
            }
        }
        if !normalised.starts_with(&self.root) {
            return Err(FileStoreError::PathEscape);
        }
        Ok(normalised)
    }

    pub async fn open_for_read(&self, storage_path: &str) -> FileStoreResult<tokio::fs::File> {
        let path = self.resolve(storage_path)?;
        Ok(tokio::fs::File::open(path).await?)
    }

    pub fn absolute_path(&self, storage_path: &str) -> FileStoreResult<PathBuf> {
        self.resolve(storage_path)
    }

    /// Moves the caller's (already-checksummed) source file into its final
    /// blob path. The store never updates the same path twice: a collision
    /// here would mean a checksum was reused, which the dedup check upstream
    /// should already have prevented.
    pub async fn commit_blob(&self, source: &Path, relative_dest: &str) -> FileStoreResult<PathBuf> {
        let dest = self.resolve(relative_dest)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::rename(source, &dest).await {
            Ok(()) => {}
            Err(_) => {
                tokio::fs::copy(source, &dest).await?;
                let _ = tokio::fs::remove_file(source).await;
            }
        }
        Ok(dest)
    }
}

pub struct FileStoreService {
    store: FileStore,
}

impl FileStoreService {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Single-shot upload: checksums the whole buffer, checks the dedup key,
    /// and writes a new blob only on a miss.
    pub async fn put_single_shot(
        &self,
        db: &DataBaseState,
        bytes: &[u8],
        original_name: String,
        declared_mime: String,
        ext: &str,
        uploader_id: i64,
    ) -> FileStoreResult<(FileRecord, bool)> {
        let checksum = hex::encode(Sha256::digest(bytes));
        if let Some(existing) = db.files().find_by_checksum(&checksum, &declared_mime).await? {
            return Ok((existing, false));
        }
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let relative = FileStore::blob_relative_path(id, ext, now);
        let tmp = tempfile::NamedTempFile::new()?;
        tokio::fs::write(tmp.path(), bytes).await?;
        let (tmp_path, tmp_guard) = tmp.keep().map_err(|e| e.error)?;
        self.store.commit_blob(&tmp_path, &relative).await?;
        drop(tmp_guard);
        let record = db
            .files()
            .insert(
                NewFileRecord {
                    id,
                    checksum,
                    original_name,
                    declared_mime,
                    byte_size: bytes.len() as i64,
                    storage_path: relative,
                    uploader_id,
                },
                db.pool(),
            )
            .await?;
        db.files().mark_virus_scan(record.id, VirusScanStatus::Clean).await?;
        Ok((FileRecord { virus_scan_status: VirusScanStatus::Clean, ..record }, true))
    }

    /// Promotes an already-assembled, already-checksummed temp file (the
    /// chunk session's finalizer) into the store, same dedup rule as the
    /// single-shot path.
    pub async fn put_assembled(
        &self,
        db: &DataBaseState,
        tmp_path: &Path,
        checksum: String,
        byte_size: u64,
        original_name: String,
        declared_mime: String,
        ext: &str,
        uploader_id: i64,
    ) -> FileStoreResult<(FileRecord, bool)> {
        if let Some(existing) = db.files().find_by_checksum(&checksum, &declared_mime).await? {
            let _ = tokio::fs::remove_file(tmp_path).await;
            return Ok((existing, false));
        }
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let relative = FileStore::blob_relative_path(id, ext, now);
        self.store.commit_blob(tmp_path, &relative).await?;
        let record = db
            .files()
            .insert(
                NewFileRecord {
                    id,
                    checksum,
                    original_name,
                    declared_mime,
                    byte_size: byte_size as i64,
                    storage_path: relative,
                    uploader_id,
                },
                db.pool(),
            )
            .await?;
        db.files().mark_virus_scan(record.id, VirusScanStatus::Clean).await?;
        Ok((FileRecord { virus_scan_status: VirusScanStatus::Clean, ..record }, true))
    }

    /// Returns only active records and touches `last_accessed_at`; every Get
    /// counts as an access, not just a download.
    pub async fn get(&self, db: &DataBaseState, file_id: Uuid) -> FileStoreResult<FileRecord> {
        let record = db.files().get_by_id(file_id).await?;
        let now = OffsetDateTime::now_utc();
        db.files().touch_last_accessed(record.id, now).await?;
        Ok(FileRecord {
            last_accessed_at: Some(now),
            ..record
        })
    }

    pub async fn read_bytes(
        &self,
        record: &FileRecord,
    ) -> FileStoreResult<tokio::fs::File> {
        self.store.open_for_read(&record.storage_path).await
    }

    pub async fn soft_delete(
        &self,
        db: &DataBaseState,
        file_id: Uuid,
        requesting_user: i64,
    ) -> FileStoreResult<()> {
        let record = db.files().get_by_id(file_id).await?;
        if record.uploader_id != requesting_user {
            return Err(FileStoreError::NotOwner);
        }
        db.files().soft_delete(file_id).await?;
        Ok(())
    }

    pub async fn find_unreferenced(
        &self,
        db: &DataBaseState,
        age: time::Duration,
        limit: i64,
    ) -> FileStoreResult<Vec<FileRecord>> {
        let cutoff = OffsetDateTime::now_utc() - age;
        Ok(db.files().list_unreferenced(cutoff, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn blob_relative_path_is_month_sharded() {
        let id = Uuid::nil();
        let at = datetime!(2026-03-07 00:00:00 UTC);
        assert_eq!(
            FileStore::blob_relative_path(id, "png", at),
            format!("2026-03/{id}.png")
        );
    }

    #[test]
    fn blob_relative_path_without_ext_has_no_dot() {
        let id = Uuid::nil();
        let at = datetime!(2026-01-01 00:00:00 UTC);
        assert_eq!(FileStore::blob_relative_path(id, "", at), format!("2026-01/{id}"));
    }

    #[test]
    fn resolve_rejects_parent_dir_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.resolve("../outside"),
            Err(FileStoreError::PathEscape)
        ));
    }

    #[test]
    fn resolve_accepts_normal_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.resolve("2026-03/blob.png").is_ok());
    }

    #[tokio::test]
    async fn commit_blob_moves_source_into_shard() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let src = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(src.path(), b"hello").await.unwrap();
        let dest = store.commit_blob(src.path(), "2026-03/x.bin").await.unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello");
    }
}
