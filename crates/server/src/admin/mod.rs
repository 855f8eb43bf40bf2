//! Administrative REST surface, mounted under `/api/v1`.
//!
//! - `GET    /pages` - list pages (paged, filtered, sorted)
//! - `POST   /pages` - run a sync
//! - `GET    /pages/{id}` - one page
//! - `PUT    /pages/{id}` - set slug, publish state and page type
//! - `DELETE /pages/{id}/cache` - drop the page's cached response
//! - `GET    /oauth2` - authorization code callback
//! - `GET    /oauth2/authorize` - login URL
//! - `GET    /oauth2/status` - login status
//! - `GET    /oauth2/sign-out` - forget the stored tokens

pub mod oauth;
pub mod pages;

use axum::Router;
use axum::routing::{delete, get};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pages", get(pages::list_pages).post(pages::sync_pages))
        .route("/pages/{id}", get(pages::get_page).put(pages::update_page))
        .route("/pages/{id}/cache", delete(pages::delete_page_cache))
        .route("/oauth2", get(oauth::callback))
        .route("/oauth2/authorize", get(oauth::authorize))
        .route("/oauth2/status", get(oauth::status))
        .route("/oauth2/sign-out", get(oauth::sign_out))
}
