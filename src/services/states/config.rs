use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
pub struct CommonConfig {
    pub host: Cow<'static, str>,
    pub port: usize,
    pub log_level: Cow<'static, str>,
    pub concurrency_limit: usize,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 18200,
            log_level: "info,filecore=debug".into(),
            concurrency_limit: 128,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataBaseConfig {
    pub db_url: Cow<'static, str>,
    pub sqlite_connection_nums: u32,
}

impl Default for DataBaseConfig {
    fn default() -> Self {
        Self {
            db_url: "sqlite://data/filecore.db".into(),
            sqlite_connection_nums: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub tmp_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "data/blobs".into(),
            tmp_dir: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenConfig {
    pub min_ttl_secs: i64,
    pub max_ttl_secs: i64,
    pub default_ttl_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            min_ttl_secs: crate::models::const_val::TOKEN_TTL_MIN.whole_seconds(),
            max_ttl_secs: crate::models::const_val::TOKEN_TTL_MAX.whole_seconds(),
            default_ttl_secs: crate::models::const_val::TOKEN_TTL_DEFAULT.whole_seconds(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TranscoderQualityPreset {
    pub height: u32,
    pub bitrate_kbps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    pub binary_path: Cow<'static, str>,
    pub timeout_secs: u64,
    pub low: TranscoderQualityPreset,
    pub medium: TranscoderQualityPreset,
    pub high: TranscoderQualityPreset,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".into(),
            timeout_secs: crate::models::const_val::TRANSCODER_TIMEOUT.as_secs(),
            low: TranscoderQualityPreset {
                height: 480,
                bitrate_kbps: 800,
            },
            medium: TranscoderQualityPreset {
                height: 720,
                bitrate_kbps: 2000,
            },
            high: TranscoderQualityPreset {
                height: 1080,
                bitrate_kbps: 5000,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub session_sweep_secs: u64,
    pub notification_drain_secs: u64,
    pub blob_gc_interval_secs: u64,
    pub blob_gc_min_age_secs: u64,
    pub blob_gc_limit: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            session_sweep_secs: crate::models::const_val::CLEANUP_SESSION_SWEEP_INTERVAL
                .as_secs(),
            notification_drain_secs: crate::models::const_val::CLEANUP_NOTIFICATION_DRAIN_INTERVAL
                .as_secs(),
            blob_gc_interval_secs: crate::models::const_val::CLEANUP_BLOB_GC_INTERVAL.as_secs(),
            blob_gc_min_age_secs: crate::models::const_val::CLEANUP_BLOB_GC_MIN_AGE.as_secs(),
            blob_gc_limit: crate::models::const_val::CLEANUP_BLOB_GC_LIMIT,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub common: CommonConfig,
    pub db: DataBaseConfig,
    pub storage: StorageConfig,
    pub token: TokenConfig,
    pub transcoder: TranscoderConfig,
    pub cleanup: CleanupConfig,
}

impl AppConfig {
    pub fn load(cfg_path: &str) -> Result<Self, Box<figment::Error>> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Env::prefixed("FILECORE_").split("__").global());
        if Path::new(cfg_path).exists() {
            figment = figment.merge(Toml::file(cfg_path));
        }
        figment.extract().map_err(Into::into)
    }
}
