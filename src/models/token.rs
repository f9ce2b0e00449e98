use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Download,
}

/// The `download_token:<id>` fast-store record. The token string itself is
/// the store key and is never embedded in the record body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBinding {
    pub file_id: Uuid,
    pub subject_user_id: i64,
    pub permissions: Vec<Permission>,
    pub expires_at: OffsetDateTime,
    pub max_uses: Option<u32>,
    pub use_count: u32,
    pub ip_pin: Option<String>,
    pub created_at: OffsetDateTime,
}

impl TokenBinding {
    pub fn has_permission(&self, p: Permission) -> bool {
        self.permissions.contains(&p)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEvent {
    pub file_id: Uuid,
    pub user_id: i64,
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct IssueTokenOptions {
    pub expires_in: Option<time::Duration>,
    pub permissions: Vec<Permission>,
    pub max_uses: Option<u32>,
    pub ip_pin: Option<String>,
}
