use crate::models::attachment::{MessageAttachment, NewMessageAttachment};
use crate::services::states::db::{DataBaseResult, SqliteBaseResultExt, SqliteQueryResultExt};
use sqlx::{Executor, Sqlite, SqlitePool, query, query_as};
use uuid::Uuid;

pub struct AttachmentRepo<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> AttachmentRepo<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn link<'c, E>(
        &self,
        new: NewMessageAttachment,
        executor: E,
    ) -> DataBaseResult<MessageAttachment>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        query_as!(
            MessageAttachment,
            r#"
                INSERT INTO message_attachments (message_id, file_id, caption, ordering_index, active)
                VALUES (?, ?, ?, ?, TRUE)
                RETURNING id, message_id, file_id AS "file_id: Uuid", caption, ordering_index, active, created_at
            "#,
            new.message_id,
            new.file_id,
            new.caption,
            new.ordering_index,
        )
        .fetch_one(executor)
        .await
        .resolve()
    }

    pub async fn unlink(&self, message_id: i64, file_id: Uuid) -> DataBaseResult<()> {
        query!(
            "UPDATE message_attachments SET active = FALSE WHERE message_id = ? AND file_id = ?",
            message_id,
            file_id,
        )
        .execute(self.pool)
        .await
        .resolve_affected()?;
        Ok(())
    }

    pub async fn list_by_message(&self, message_id: i64) -> DataBaseResult<Vec<MessageAttachment>> {
        query_as!(
            MessageAttachment,
            r#"
                SELECT id, message_id, file_id AS "file_id: Uuid", caption, ordering_index, active, created_at
                FROM message_attachments
                WHERE message_id = ? AND active = TRUE
                ORDER BY ordering_index ASC
            "#,
            message_id,
        )
        .fetch_all(self.pool)
        .await
        .resolve()
    }

    /// Any active attachment referencing this file, used to decide whether a message-visibility
    /// policy check should run before serving the file to a caller who is not its uploader.
    pub async fn find_by_file(&self, file_id: Uuid) -> DataBaseResult<Vec<MessageAttachment>> {
        query_as!(
            MessageAttachment,
            r#"
                SELECT id, message_id, file_id AS "file_id: Uuid", caption, ordering_index, active, created_at
                FROM message_attachments
                WHERE file_id = ? AND active = TRUE
            "#,
            file_id,
        )
        .fetch_all(self.pool)
        .await
        .resolve()
    }
}
