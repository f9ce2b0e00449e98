use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSessionStatus {
    Pending,
    Uploading,
    Assembling,
    Completed,
    Failed,
    Cancelled,
}

impl ChunkSessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// The `chunk_session:<id>` fast-store hash. Completed/failed chunk indices
/// live in their own sets (`chunk_uploaded:<id>` / `chunk_failed:<id>`), not
/// embedded here, so they can be mutated by an atomic set-add independent of
/// this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSession {
    pub session_id: Uuid,
    pub owner_user_id: i64,
    pub original_name: String,
    pub declared_mime: String,
    pub total_size: u64,
    pub chunk_size: u32,
    pub total_chunks: u32,
    pub status: ChunkSessionStatus,
    pub last_error: Option<String>,
    pub cancelled_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl ChunkSession {
    pub fn chunk_len_at(&self, idx: u32) -> u64 {
        let cs = self.chunk_size as u64;
        if idx as u64 + 1 == self.total_chunks as u64 {
            self.total_size - idx as u64 * cs
        } else {
            cs
        }
    }

    pub fn within_grace_window(&self, now: OffsetDateTime, grace: time::Duration) -> bool {
        self.cancelled_at
            .map(|cancelled_at| now - cancelled_at <= grace)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSessionProgress {
    pub session_id: Uuid,
    pub status: ChunkSessionStatus,
    pub completed_count: u32,
    pub total_chunks: u32,
    pub failed: Vec<u32>,
    pub percentage: u8,
    pub terminal: bool,
}
