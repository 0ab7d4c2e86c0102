//! EdgeCache license server entry point.
//!
//! Loads `.env`, bootstraps the storage backend, audit trail and license
//! engine, then starts the Axum HTTP server with graceful shutdown.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use edgecache_core::audit::{AuditManager, StorageAuditBackend};
use edgecache_core::audit_file::FileAuditBackend;
use edgecache_core::LicenseEngine;
use edgecache_storage::{MemoryBackend, StorageBackend};

use edgecache_server::config::{ServerConfig, StorageBackendType};
use edgecache_server::routes::build_router;
use edgecache_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Existing process variables win over `.env`; a missing file is fine.
    let _ = dotenvy::dotenv();

    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(?config, "EdgeCache license API starting");

    let state = build_app_state(&config).await?;
    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "EdgeCache license API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("EdgeCache license API stopped");
    Ok(())
}

/// Open storage and build the engine and shared state.
async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    if let Some(path) = config.storage_backend.path() {
        ensure_parent_dir(path)?;
    }
    let storage = open_storage(&config.storage_backend).await?;

    let audit_manager = Arc::new(AuditManager::new());
    audit_manager
        .add_backend(Arc::new(StorageAuditBackend::new(Arc::clone(&storage))))
        .await;
    if let Some(ref audit_path) = config.audit_file_path {
        ensure_parent_dir(audit_path)?;
        audit_manager
            .add_backend(Arc::new(FileAuditBackend::new(audit_path)))
            .await;
        info!(path = %audit_path, "file audit backend registered");
    }

    let engine = Arc::new(LicenseEngine::new(
        storage,
        audit_manager,
        config.engine_config(),
    ));

    Ok(Arc::new(AppState {
        engine,
        signing_secret: config.signing_secret.clone(),
        admin_token: config.admin_token.clone(),
        debug: config.debug,
    }))
}

async fn open_storage(backend: &StorageBackendType) -> anyhow::Result<Arc<dyn StorageBackend>> {
    let storage: Arc<dyn StorageBackend> = match backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            Arc::new(MemoryBackend::new())
        }
        #[cfg(feature = "redb-backend")]
        StorageBackendType::Redb { path } => {
            info!(path = %path, "using redb storage");
            Arc::new(
                edgecache_storage::RedbBackend::open(path)
                    .context("failed to open redb storage")?,
            )
        }
        #[cfg(not(feature = "redb-backend"))]
        StorageBackendType::Redb { .. } => {
            anyhow::bail!("redb backend requested but feature 'redb-backend' is not enabled");
        }
        #[cfg(feature = "rocksdb-backend")]
        StorageBackendType::RocksDb { path } => {
            info!(path = %path, "using RocksDB storage");
            Arc::new(
                edgecache_storage::RocksDbBackend::open(path)
                    .context("failed to open RocksDB storage")?,
            )
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StorageBackendType::RocksDb { .. } => {
            anyhow::bail!("RocksDB backend requested but feature 'rocksdb-backend' is not enabled");
        }
        #[cfg(feature = "postgres-backend")]
        StorageBackendType::Postgres { url } => {
            info!(url = %"[redacted]", "using PostgreSQL storage");
            Arc::new(
                edgecache_storage::PostgresBackend::connect(url)
                    .await
                    .context("failed to connect to PostgreSQL storage")?,
            )
        }
        #[cfg(not(feature = "postgres-backend"))]
        StorageBackendType::Postgres { .. } => {
            anyhow::bail!(
                "PostgreSQL backend requested but feature 'postgres-backend' is not enabled"
            );
        }
    };
    Ok(storage)
}

fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
