//! Remote client with status classification and one-shot token refresh.
//!
//! ### Classification
//! - `< 400`: success
//! - `404`: not found
//! - `401` / `403`: auth
//! - `>= 500`: server error
//! - other `4xx`: client error
//! - no response: transport failure
//!
//! ### Refresh
//! An authorized request that is rejected with 401/403 triggers exactly one
//! refresh-token grant. With a new access token the request is retried once.
//! When the refresh yields nothing, or the retry is rejected again, both
//! stored tokens are deleted and the caller gets [`Outcome::NeedsReauth`].

mod error;
mod transport;

use std::sync::Arc;

use pagemirror_core::{AppConfig, Db, Error};
use serde::Deserialize;

pub use error::RemoteError;
pub use transport::{RemoteRequest, RemoteResponse, ReqwestTransport, Transport, TransportError};

/// Result of a remote call.
#[derive(Debug)]
pub enum Outcome {
    Success(RemoteResponse),
    /// No usable credentials remain; the caller must sign in again.
    NeedsReauth,
    Failed(RemoteError),
}

impl Outcome {
    /// Collapse into a `Result`, turning `NeedsReauth` into an auth error.
    pub fn into_result(self) -> Result<RemoteResponse, Error> {
        match self {
            Outcome::Success(response) => Ok(response),
            Outcome::NeedsReauth => Err(Error::Auth("not logged in".into())),
            Outcome::Failed(e) => Err(e.into()),
        }
    }
}

/// Token endpoint payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Map a raw response onto the status classes.
pub fn classify(response: RemoteResponse) -> Result<RemoteResponse, RemoteError> {
    match response.status.as_u16() {
        0..=399 => Ok(response),
        404 => Err(RemoteError::NotFound(response)),
        401 | 403 => Err(RemoteError::Auth(response)),
        500.. => Err(RemoteError::Server(response)),
        _ => Err(RemoteError::Client(response)),
    }
}

/// HTTP client for the content and account APIs.
///
/// Cheap to clone; clones share the transport and the token store.
#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
    db: Db,
    token_url: String,
    client_id: String,
}

impl RemoteClient {
    pub fn new(transport: Arc<dyn Transport>, db: Db, config: &AppConfig) -> Self {
        Self {
            transport,
            db,
            token_url: format!("{}oauth2/access-tokens", config.account_api_url()),
            client_id: config.oauth2_client_id().to_string(),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn send(&self, request: &RemoteRequest) -> Result<RemoteResponse, RemoteError> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RemoteError::Transport(e.0))?;
        classify(response)
    }

    /// Send a request.
    ///
    /// # Errors
    ///
    /// Only storage failures (reading or clearing tokens) are returned as
    /// `Err`; every remote failure is reported through [`Outcome`].
    pub async fn request(&self, request: RemoteRequest) -> Result<Outcome, Error> {
        if !request.authorized {
            return Ok(match self.send(&request).await {
                Ok(response) => Outcome::Success(response),
                Err(e) => Outcome::Failed(e),
            });
        }

        let Some(token) = self.db.access_token().await? else {
            return Ok(Outcome::NeedsReauth);
        };

        match self.send(&request.with_bearer(&token)?).await {
            Ok(response) => Ok(Outcome::Success(response)),
            Err(e) if e.is_auth() => self.refresh_and_retry(&request).await,
            Err(e) => Ok(Outcome::Failed(e)),
        }
    }

    async fn refresh_and_retry(&self, request: &RemoteRequest) -> Result<Outcome, Error> {
        if let Some(token) = self.refresh_access_token().await? {
            match self.send(&request.with_bearer(&token)?).await {
                Ok(response) => return Ok(Outcome::Success(response)),
                Err(e) if !e.is_auth() => return Ok(Outcome::Failed(e)),
                Err(_) => {}
            }
        }

        tracing::warn!(url = %request.url, "credentials rejected after refresh, signing out");
        self.db.clear_tokens().await?;
        Ok(Outcome::NeedsReauth)
    }

    /// Trade the stored refresh token for a new access token.
    ///
    /// Returns `None` when there is no refresh token or the grant fails; the
    /// new token is persisted before it is returned.
    pub async fn refresh_access_token(&self) -> Result<Option<String>, Error> {
        let Some(refresh_token) = self.db.refresh_token().await? else {
            return Ok(None);
        };

        tracing::debug!("refreshing access token");

        let form = vec![
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.clone()),
            ("grant_type", "refresh_token".to_string()),
        ];
        let Some(tokens) = self.token_grant(form).await else {
            return Ok(None);
        };

        self.db
            .store_tokens(&tokens.access_token, tokens.refresh_token.as_deref())
            .await?;
        Ok(Some(tokens.access_token))
    }

    /// POST a grant to the token endpoint, retrying once on a server error.
    pub(crate) async fn token_grant(&self, form: Vec<(&str, String)>) -> Option<TokenResponse> {
        let request = RemoteRequest::post(&self.token_url).form(form);

        for attempt in 0..2 {
            match self.send(&request).await {
                Ok(response) => {
                    return response
                        .json::<TokenResponse>()
                        .inspect_err(|e| tracing::debug!(error = %e, "undecodable token response"))
                        .ok();
                }
                Err(e) if e.is_server() && attempt == 0 => {
                    tracing::debug!(error = %e, "token endpoint failed, retrying");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "token grant failed");
                    return None;
                }
            }
        }

        None
    }
}
