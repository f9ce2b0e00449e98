use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Boundary entity: owned by the message domain, persisted here so the file
/// subsystem can answer "is this file visible via some message the caller
/// can see?" through a policy callback, without owning message semantics.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageAttachment {
    pub id: i64,
    pub message_id: i64,
    pub file_id: Uuid,
    pub caption: Option<String>,
    pub ordering_index: i32,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewMessageAttachment {
    pub message_id: i64,
    pub file_id: Uuid,
    pub caption: Option<String>,
    pub ordering_index: i32,
}
