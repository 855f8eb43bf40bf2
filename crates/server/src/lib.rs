//! pagemirror server.
//!
//! Mirrors landing pages from the content platform under local slugs:
//!
//! - the proxy engine answers GET requests whose path matches a connected
//!   page, ahead of the site's own handlers
//! - the sync engine pulls the platform's page list into the local store
//! - the admin REST surface under `/api/v1` manages pages and sign-in

pub mod admin;
pub mod error;
pub mod interceptor;
pub mod proxy;
pub mod state;
pub mod sync;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use pagemirror_core::Db;
use tokio::task::JoinHandle;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// The site's own handler for anything the interceptors did not answer.
async fn host_fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

/// Build the application router.
///
/// Admin routes are matched first; every other request runs through the
/// interceptor chain before reaching the host fallback.
pub fn build_app(state: AppState) -> Router {
    let site: Router<AppState> = Router::new()
        .fallback(host_fallback)
        .layer(middleware::from_fn_with_state(state.interceptors.clone(), interceptor::intercept));

    Router::new().nest("/api/v1", admin::routes()).merge(site).with_state(state)
}

/// Periodically delete expired cache entries.
pub fn spawn_cache_purge(db: Db, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match db.purge_expired_responses().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "purged expired cache entries"),
                Err(e) => tracing::warn!(error = %e, "cache purge failed"),
            }
        }
    })
}
