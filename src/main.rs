#![allow(dead_code)]
#![feature(error_generic_member_access)]

mod errors;
mod layers;
mod models;
mod routers;
mod services;
mod utils;

use crate::errors::FileCoreError;
use crate::routers::router;
use crate::services::cleanup::{spawn_blob_collector, spawn_notification_drain, spawn_session_sweeper};
use crate::services::states::FileCoreState;
use crate::services::states::config::AppConfig;
use crate::services::states::db::DataBaseState;
use crate::services::states::fastkv::MokaFastKv;
use clap::Parser;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[cfg(all(target_os = "windows", feature = "alternative-allocator"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(all(
    any(
        target_os = "linux",
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd"
    ),
    feature = "alternative-allocator"
))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn tracing_init(level: &str) {
    use std::io::stdout;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, Layer};
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(stdout)
        .with_filter(EnvFilter::new(level));
    tracing_subscriber::registry().with(fmt_layer).init();
}

#[cfg_attr(test, ctor::ctor)]
fn init() {
    tracing_init("info,filecore=debug");
}

pub mod shadow {
    use shadow_rs::shadow;
    shadow!(build_info);
}

#[derive(clap::Parser, Debug)]
#[clap(
    name = "filecore",
    version = shadow::build_info::VERSION,
    long_version = shadow::build_info::CLAP_LONG_VERSION
)]
pub struct Cli {
    #[clap(
        short,
        long,
        help = "Path to config file",
        default_value = "filecore.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(AppConfig::load(&cli.config)?);
    tracing_init(&config.common.log_level);
    let sqlx_opt = SqliteConnectOptions::from_str(&config.db.db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let sqlx_pool = SqlitePoolOptions::new()
        .max_connections(config.db.sqlite_connection_nums)
        .connect_with(sqlx_opt)
        .await
        .map_err(FileCoreError::Sqlx)?;
    #[cfg(feature = "migrate")]
    {
        tracing::info!("Preparing to run embed migrations...");
        sqlx::migrate!("./migrations")
            .run(&sqlx_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                FileCoreError::Sqlx(e.into())
            })?;
        tracing::info!("Migrations completed successfully.");
    }
    let db = DataBaseState::new(sqlx_pool);
    tracing::info!("Initializing db dyn settings...");
    db.dyn_settings().initialise().await?;
    let kv = MokaFastKv::new();
    let addr = format!("{}:{}", config.common.host, config.common.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        "Starting server at {}:{}",
        config.common.host,
        config.common.port
    );
    let cleanup_cfg = config.cleanup.clone();
    let state = Arc::new(FileCoreState::new(db, kv, config));

    let sweeper = spawn_session_sweeper(
        state.clone(),
        Duration::from_secs(cleanup_cfg.session_sweep_secs),
    );
    let drainer = spawn_notification_drain(
        state.clone(),
        Duration::from_secs(cleanup_cfg.notification_drain_secs),
    );
    let blob_collector = spawn_blob_collector(
        state.clone(),
        Duration::from_secs(cleanup_cfg.blob_gc_interval_secs),
        time::Duration::seconds(cleanup_cfg.blob_gc_min_age_secs as i64),
        cleanup_cfg.blob_gc_limit,
    );

    axum::serve(listener, router(state.clone()).await)
        .with_graceful_shutdown(async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{SignalKind, signal};
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
                let mut sigterm =
                    signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = sigint.recv() => {},
                    _ = sigterm.recv() => {},
                }
            }
            #[cfg(windows)]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
            #[cfg(not(any(unix, windows)))]
            {
                tracing::warn!("Graceful shutdown is not supported on this platform.");
                futures::future::pending::<()>().await;
            }
            tracing::warn!("Received shutdown signal, shutting down gracefully...");
        })
        .await?;
    sweeper.abort();
    drainer.abort();
    blob_collector.abort();
    tracing::info!("Trying to close database connections...");
    match tokio::time::timeout(Duration::from_secs(15), state.db.close_conn()).await {
        Ok(_) => tracing::info!("Database connections closed."),
        Err(_) => tracing::error!("Timed out while closing database connections."),
    }
    Ok(())
}
