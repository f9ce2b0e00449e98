use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum VirusScanStatus {
    Pending = 0,
    Clean = 1,
    Infected = 2,
    Failed = 3,
    Timeout = 4,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub checksum: String,
    pub original_name: String,
    pub declared_mime: String,
    pub byte_size: i64,
    pub storage_path: String,
    pub thumbnail_path: Option<String>,
    pub uploader_id: i64,
    pub active: bool,
    pub virus_scan_status: VirusScanStatus,
    pub processed: bool,
    pub download_count: i64,
    pub last_accessed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields needed to insert a freshly-stored blob's record; identity and
/// telemetry columns are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub id: Uuid,
    pub checksum: String,
    pub original_name: String,
    pub declared_mime: String,
    pub byte_size: i64,
    pub storage_path: String,
    pub uploader_id: i64,
}
