//! Sign-in handlers for the content platform.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStatus {
    pub is_logged_in: bool,
}

/// The admin page URL, carrying `lperror` when sign-in failed.
fn admin_redirect(base: &str, error: Option<&str>) -> String {
    let Some(error) = error else {
        return base.to_string();
    };
    match Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("lperror", error);
            url.into()
        }
        Err(_) => format!("{base}?lperror={error}"),
    }
}

/// GET /api/v1/oauth2/authorize - Login URL for the authorization code flow.
pub async fn authorize(State(state): State<AppState>) -> ApiResult<Json<String>> {
    let url = state
        .client
        .begin_authorization(state.config.login_url(), &state.config.oauth2_redirect_uri())
        .await?;
    Ok(Json(url))
}

/// GET /api/v1/oauth2 - Authorization code callback.
pub async fn callback(State(state): State<AppState>, Query(params): Query<CallbackParams>) -> ApiResult<Redirect> {
    let code = params.code.filter(|c| !c.is_empty());
    let base = state.config.admin_redirect_url.as_str();

    let Some(code) = code else {
        tracing::debug!("oauth2 callback without a code");
        return Ok(Redirect::to(&admin_redirect(base, Some("access_denied"))));
    };

    let signed_in = state
        .client
        .complete_authorization(&code, &state.config.oauth2_redirect_uri())
        .await?;

    let error = (!signed_in).then_some("invalid_code");
    Ok(Redirect::to(&admin_redirect(base, error)))
}

/// GET /api/v1/oauth2/status - Whether both tokens are stored.
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<LoginStatus>> {
    Ok(Json(LoginStatus { is_logged_in: state.db.is_logged_in().await? }))
}

/// GET /api/v1/oauth2/sign-out - Forget both tokens.
pub async fn sign_out(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.client.sign_out().await?;
    tracing::info!("signed out of the content platform");
    Ok(StatusCode::NO_CONTENT)
}
