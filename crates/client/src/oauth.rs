//! OAuth2 authorization-code sign-in with PKCE.
//!
//! The verifier is persisted between [`RemoteClient::begin_authorization`]
//! and [`RemoteClient::complete_authorization`] and deleted once the code
//! has been exchanged.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pagemirror_core::Error;
use pagemirror_core::store::OptionKey;
use rand::Rng;
use sha2::{Digest, Sha256};
use url::Url;

use crate::remote::RemoteClient;

const VERIFIER_LEN: usize = 43;
const VERIFIER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Scope requested at sign-in.
pub const SCOPE: &str = "content-r";

/// A fresh PKCE code verifier.
pub fn generate_code_verifier() -> String {
    let mut rng = rand::thread_rng();
    (0..VERIFIER_LEN)
        .map(|_| VERIFIER_CHARSET[rng.gen_range(0..VERIFIER_CHARSET.len())] as char)
        .collect()
}

/// S256 challenge for `verifier`.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// The platform login URL that starts the authorization code flow.
pub fn authorize_url(login_url: &str, client_id: &str, redirect_uri: &str, challenge: &str) -> Result<String, Error> {
    let base = format!("{}/oauth2-login", login_url.trim_end_matches('/'));
    let mut url = Url::parse(&base).map_err(|e| Error::Validation(format!("invalid login url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", SCOPE)
        .append_pair("code_challenge", challenge);
    Ok(url.into())
}

impl RemoteClient {
    /// Start a sign-in: store a new verifier and return the login URL.
    ///
    /// # Errors
    ///
    /// `Error::Validation` when the site has no permalink structure, since
    /// the callback route cannot be reached with plain permalinks.
    pub async fn begin_authorization(&self, login_url: &str, redirect_uri: &str) -> Result<String, Error> {
        if self.db().permalink_structure().await?.is_empty() {
            return Err(Error::Validation("permalink structure can not be 'plain'".into()));
        }

        let verifier = generate_code_verifier();
        let url = authorize_url(login_url, self.client_id(), redirect_uri, &code_challenge(&verifier))?;
        self.db().set_option(OptionKey::CodeVerifier, &verifier).await?;
        Ok(url)
    }

    /// Exchange an authorization code for tokens and store them.
    ///
    /// Returns `false` when the platform rejects the code.
    pub async fn complete_authorization(&self, code: &str, redirect_uri: &str) -> Result<bool, Error> {
        let verifier = self.db().get_option(OptionKey::CodeVerifier).await?.unwrap_or_default();

        let form = vec![
            ("code", code.to_string()),
            ("code_verifier", verifier),
            ("client_id", self.client_id().to_string()),
            ("grant_type", "authorization_code".to_string()),
            ("redirect_uri", redirect_uri.to_string()),
        ];

        let Some(tokens) = self.token_grant(form).await else {
            tracing::debug!("authorization code rejected");
            return Ok(false);
        };

        self.db()
            .store_tokens(&tokens.access_token, tokens.refresh_token.as_deref())
            .await?;
        self.db().delete_option(OptionKey::CodeVerifier).await?;

        tracing::info!("signed in to the content platform");
        Ok(true)
    }

    /// Forget both tokens.
    pub async fn sign_out(&self) -> Result<(), Error> {
        self.db().clear_tokens().await
    }
}
