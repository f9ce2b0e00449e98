pub mod config;
pub mod db;
pub mod fastkv;

use crate::services::file_store::{FileStore, FileStoreService};
use crate::services::token_service::TokenService;
use crate::services::upload_session::UploadSessionManager;
use crate::services::ws_channel::WsHub;
use config::AppConfig;
use db::DataBaseState;
use fastkv::MokaFastKv;
use std::sync::Arc;

pub struct FileCoreState {
    pub db: DataBaseState,
    pub kv: MokaFastKv,
    pub config: Arc<AppConfig>,
    pub file_store: FileStoreService,
    pub uploads: UploadSessionManager,
    pub tokens: TokenService,
    pub ws_hub: WsHub,
}

impl FileCoreState {
    pub fn new(db: DataBaseState, kv: MokaFastKv, config: Arc<AppConfig>) -> Self {
        let store = FileStore::new(config.storage.root.clone());
        let chunk_root = config
            .storage
            .tmp_dir
            .clone()
            .unwrap_or_else(|| config.storage.root.join(".chunks"));
        Self {
            file_store: FileStoreService::new(store),
            uploads: UploadSessionManager::new(kv.clone(), chunk_root),
            tokens: TokenService::new(kv.clone()),
            ws_hub: WsHub::new(),
            db,
            kv,
            config,
        }
    }
}
