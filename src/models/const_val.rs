/// Hard ceiling on chunk count per session, independent of chunk size.
pub const MAX_CHUNKS_PER_SESSION: u64 = 1000;

/// Chunk-upload sessions are revivable for this long after cancellation.
pub const CANCEL_GRACE_WINDOW: time::Duration = time::Duration::minutes(5);

/// Default session TTL from creation, refreshed on every accepted chunk.
pub const CHUNK_SESSION_TTL: time::Duration = time::Duration::hours(24);

pub const TOKEN_TTL_MIN: time::Duration = time::Duration::minutes(5);
pub const TOKEN_TTL_MAX: time::Duration = time::Duration::hours(24);
pub const TOKEN_TTL_DEFAULT: time::Duration = time::Duration::hours(1);
pub const ONE_TIME_TOKEN_TTL_MAX: time::Duration = time::Duration::minutes(5);

pub const USER_TOKEN_INDEX_TTL: time::Duration = TOKEN_TTL_MAX;

pub const DOWNLOAD_EVENTS_PER_FILE_CAP: usize = 100;
pub const DOWNLOAD_EVENTS_PER_FILE_TTL: time::Duration = time::Duration::days(30);
pub const DOWNLOAD_EVENTS_PER_USER_CAP: usize = 50;
pub const DOWNLOAD_EVENTS_PER_USER_TTL: time::Duration = time::Duration::days(7);

/// Hard cap on the assembled size of a chunked upload, bounds concatenation memory.
pub const MAX_ASSEMBLED_SIZE: u64 = 100 * 1024 * 1024;

pub const CATEGORY_CEILING_IMAGE: u64 = 25 * 1024 * 1024;
pub const CATEGORY_CEILING_AUDIO: u64 = 50 * 1024 * 1024;
pub const CATEGORY_CEILING_DOCUMENT: u64 = 50 * 1024 * 1024;
pub const CATEGORY_CEILING_VIDEO: u64 = 100 * 1024 * 1024;
pub const CATEGORY_CEILING_OTHER: u64 = 25 * 1024 * 1024;

pub const MAX_BATCH_UPLOAD_FILES: usize = 10;
pub const MAX_BATCH_LINK_MESSAGE: usize = 20;

pub const CLEANUP_SESSION_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);
pub const CLEANUP_NOTIFICATION_DRAIN_INTERVAL: std::time::Duration =
    std::time::Duration::from_secs(30);
pub const CLEANUP_BLOB_GC_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);
pub const CLEANUP_BLOB_GC_MIN_AGE: std::time::Duration = std::time::Duration::from_secs(86400);
pub const CLEANUP_BLOB_GC_LIMIT: i64 = 500;

pub const FAST_STORE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);
pub const DISK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
pub const TRANSCODER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
