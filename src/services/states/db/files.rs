use crate::models::file::{FileRecord, NewFileRecord, VirusScanStatus};
use crate::services::states::db::{
    DataBaseResult, PageQueryCursor, PageQueryInner, SqliteBaseResultExt, SqliteQueryResultExt,
};
use sqlx::{Executor, Sqlite, SqlitePool, query, query_as};
use time::OffsetDateTime;
use uuid::Uuid;

impl PageQueryCursor for FileRecord {
    fn cursor_field(&self) -> i64 {
        self.created_at.unix_timestamp()
    }
}

pub struct FileRepo<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> FileRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert<'c, E>(&self, new: NewFileRecord, executor: E) -> DataBaseResult<FileRecord>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        query_as!(
            FileRecord,
            r#"
                INSERT INTO files (
                    id, checksum, original_name, declared_mime, byte_size,
                    storage_path, thumbnail_path, uploader_id, active,
                    virus_scan_status, processed, download_count
                )
                VALUES (?, ?, ?, ?, ?, ?, NULL, ?, TRUE, ?, FALSE, 0)
                RETURNING
                    id AS "id: Uuid",
                    checksum,
                    original_name,
                    declared_mime,
                    byte_size,
                    storage_path,
                    thumbnail_path,
                    uploader_id,
                    active,
                    virus_scan_status AS "virus_scan_status: VirusScanStatus",
                    processed,
                    download_count,
                    last_accessed_at,
                    created_at,
                    updated_at
            "#,
            new.id,
            new.checksum,
            new.original_name,
            new.declared_mime,
            new.byte_size,
            new.storage_path,
            new.uploader_id,
            VirusScanStatus::Pending,
        )
        .fetch_one(executor)
        .await
        .resolve()
    }

    /// Looks up an existing, active, virus-scan-clean file sharing the same
    /// content checksum and declared MIME type, the dedup key used by the
    /// single-shot and chunked upload paths. A record still `Pending` scan
    /// is not a dedup candidate: the upload that is scanning it owns it.
    pub async fn find_by_checksum(
        &self,
        checksum: &str,
        declared_mime: &str,
    ) -> DataBaseResult<Option<FileRecord>> {
        let row = query_as!(
            FileRecord,
            r#"
                SELECT
                    id AS "id: Uuid",
                    checksum,
                    original_name,
                    declared_mime,
                    byte_size,
                    storage_path,
                    thumbnail_path,
                    uploader_id,
                    active,
                    virus_scan_status AS "virus_scan_status: VirusScanStatus",
                    processed,
                    download_count,
                    last_accessed_at,
                    created_at,
                    updated_at
                FROM files
                WHERE checksum = ? AND declared_mime = ? AND active = TRUE
                    AND virus_scan_status = ?
            "#,
            checksum,
            declared_mime,
            VirusScanStatus::Clean,
        )
        .fetch_optional(self.pool)
        .await
        .resolve()?;
        Ok(row)
    }

    /// Returns only active records, per the component's Get contract.
    pub async fn get_by_id(&self, id: Uuid) -> DataBaseResult<FileRecord> {
        query_as!(
            FileRecord,
            r#"
                SELECT
                    id AS "id: Uuid",
                    checksum,
                    original_name,
                    declared_mime,
                    byte_size,
                    storage_path,
                    thumbnail_path,
                    uploader_id,
                    active,
                    virus_scan_status AS "virus_scan_status: VirusScanStatus",
                    processed,
                    download_count,
                    last_accessed_at,
                    created_at,
                    updated_at
                FROM files
                WHERE id = ? AND active = TRUE
            "#,
            id,
        )
        .fetch_one(self.pool)
        .await
        .resolve()
    }

    pub async fn touch_last_accessed(&self, id: Uuid, at: OffsetDateTime) -> DataBaseResult<()> {
        query!(
            "UPDATE files SET last_accessed_at = ? WHERE id = ?",
            at,
            id,
        )
        .execute(self.pool)
        .await
        .resolve_affected()?;
        Ok(())
    }

    pub async fn mark_processed(
        &self,
        id: Uuid,
        thumbnail_path: Option<&str>,
    ) -> DataBaseResult<()> {
        query!(
            "UPDATE files SET processed = TRUE, thumbnail_path = ? WHERE id = ?",
            thumbnail_path,
            id,
        )
        .execute(self.pool)
        .await
        .resolve_affected()?;
        Ok(())
    }

    pub async fn mark_virus_scan(
        &self,
        id: Uuid,
        status: VirusScanStatus,
    ) -> DataBaseResult<()> {
        query!(
            "UPDATE files SET virus_scan_status = ? WHERE id = ?",
            status,
            id,
        )
        .execute(self.pool)
        .await
        .resolve_affected()?;
        Ok(())
    }

    pub async fn record_download(&self, id: Uuid, at: OffsetDateTime) -> DataBaseResult<()> {
        query!(
            "UPDATE files SET download_count = download_count + 1, last_accessed_at = ? WHERE id = ?",
            at,
            id,
        )
        .execute(self.pool)
        .await
        .resolve_affected()?;
        Ok(())
    }

    pub async fn soft_delete(&self, id: Uuid) -> DataBaseResult<()> {
        query!("UPDATE files SET active = FALSE WHERE id = ?", id)
            .execute(self.pool)
            .await
            .resolve_affected()?;
        Ok(())
    }

    pub async fn list_by_uploader(
        &self,
        uploader_id: i64,
        page: PageQueryInner,
    ) -> Result<Vec<FileRecord>, sqlx::Error> {
        query_as!(
            FileRecord,
            r#"
                SELECT
                    id AS "id: Uuid",
                    checksum,
                    original_name,
                    declared_mime,
                    byte_size,
                    storage_path,
                    thumbnail_path,
                    uploader_id,
                    active,
                    virus_scan_status AS "virus_scan_status: VirusScanStatus",
                    processed,
                    download_count,
                    last_accessed_at,
                    created_at,
                    updated_at
                FROM files
                WHERE uploader_id = ? AND active = TRUE AND unixepoch(created_at) > ?
                ORDER BY created_at ASC
                LIMIT ?
            "#,
            uploader_id,
            page.start_after,
            page.limit,
        )
        .fetch_all(self.pool)
        .await
    }

    /// Active records older than `older_than` with no active attachment, the
    /// garbage-collection candidate set for component I.
    pub async fn list_unreferenced(
        &self,
        older_than: OffsetDateTime,
        limit: i64,
    ) -> DataBaseResult<Vec<FileRecord>> {
        query_as!(
            FileRecord,
            r#"
                SELECT
                    f.id AS "id: Uuid",
                    f.checksum,
                    f.original_name,
                    f.declared_mime,
                    f.byte_size,
                    f.storage_path,
                    f.thumbnail_path,
                    f.uploader_id,
                    f.active,
                    f.virus_scan_status AS "virus_scan_status: VirusScanStatus",
                    f.processed,
                    f.download_count,
                    f.last_accessed_at,
                    f.created_at,
                    f.updated_at
                FROM files f
                LEFT JOIN message_attachments ma ON ma.file_id = f.id AND ma.active = TRUE
                WHERE f.active = TRUE AND f.created_at < ? AND ma.id IS NULL
                LIMIT ?
            "#,
            older_than,
            limit,
        )
        .fetch_all(self.pool)
        .await
        .resolve()
    }
}
