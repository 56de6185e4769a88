use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use common::env::ensure_storage_dir;
use configs::{AppConfig, BackendKind};
use service::storage::FileStore;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::errors::StartupError;
use crate::routes::{self, AppState};

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

fn bind_addr(cfg: &AppConfig) -> Result<SocketAddr, StartupError> {
    format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .map_err(|e| StartupError::InvalidConfig(format!("bad bind address: {e}")))
}

/// Router over a file store rooted at the configured storage directory.
/// The directory is created here so the first listing does not fail.
pub async fn build_app(cfg: &AppConfig) -> Result<Router, StartupError> {
    if cfg.storage.backend != BackendKind::File {
        warn!(backend = ?cfg.storage.backend, "storage.backend is ignored by the server, serving files");
    }
    let root = cfg.storage.root.clone();
    ensure_storage_dir(&root)
        .await
        .map_err(|e| StartupError::StorageDir(format!("{root}: {e}")))?;

    let store = Arc::new(FileStore::new(&root));
    let state = AppState::new(store, root);
    Ok(routes::build_router(state, build_cors(), cfg.server.body_limit_bytes))
}

/// Public entry: load config, build the app and run the HTTP server
pub async fn run() -> Result<(), StartupError> {
    let cfg = AppConfig::load_and_normalize().map_err(|e| StartupError::InvalidConfig(e.to_string()))?;
    let app = build_app(&cfg).await?;

    let addr = bind_addr(&cfg)?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(anyhow::Error::from)?;
    info!(%addr, storage_root = %cfg.storage.root, "storage server listening");
    axum::serve(listener, app).await.map_err(anyhow::Error::from)?;
    Ok(())
}
