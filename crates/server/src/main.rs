//! pagemirror server entry point.
//!
//! Loads configuration, opens the database, starts the cache purge task and
//! serves the site and admin routes over HTTP. Logs go to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use pagemirror_client::ReqwestTransport;
use pagemirror_core::store::OptionKey;
use pagemirror_core::{AppConfig, Db};
use pagemirror_server::{AppState, build_app, spawn_cache_purge};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .json()
        .init();

    tracing::info!(environment = ?config.environment, db = %config.db_path.display(), "starting pagemirror");

    let db = Db::open(&config.db_path)
        .await
        .with_context(|| format!("opening database at {}", config.db_path.display()))?;

    if let Some(structure) = config.permalink_structure.as_deref()
        && db.get_option(OptionKey::PermalinkStructure).await?.is_none()
    {
        db.set_option(OptionKey::PermalinkStructure, structure).await?;
    }

    let purge = spawn_cache_purge(db.clone(), config.cache_purge_interval());

    let transport = Arc::new(ReqwestTransport::new(&config.user_agent)?);
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, db, transport)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    purge.abort();
    Ok(())
}
