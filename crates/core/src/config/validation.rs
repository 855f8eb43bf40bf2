//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;
use url::Url;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 300_000;
const MAX_TTL_SECS: u64 = 7 * 24 * 3600;

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if value < MIN_TIMEOUT_MS {
        return Err(invalid(field, "must be at least 100ms"));
    }
    if value > MAX_TIMEOUT_MS {
        return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
    }
    Ok(())
}

fn check_http_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| invalid(field, format!("not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(field, format!("unsupported scheme '{other}'"))),
    }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - a timeout is below 100ms or above 5 minutes
    /// - `cache_ttl_secs` is 0 or exceeds 7 days
    /// - `cache_purge_interval_secs` is 0
    /// - `user_agent` is empty
    /// - a remote or site URL is not an absolute http(s) URL
    /// - `account_api_url` does not end with `/`
    ///
    /// Returns `ConfigError::Missing` if `oauth2_client_id` resolves to an
    /// empty string.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_timeout("page_fetch_timeout_ms", self.page_fetch_timeout_ms)?;
        check_timeout("sync_timeout_ms", self.sync_timeout_ms)?;

        if self.cache_ttl_secs == 0 {
            return Err(invalid("cache_ttl_secs", "must be at least 1 second"));
        }
        if self.cache_ttl_secs > MAX_TTL_SECS {
            return Err(invalid("cache_ttl_secs", "must not exceed 7 days (604800s)"));
        }
        if self.cache_purge_interval_secs == 0 {
            return Err(invalid("cache_purge_interval_secs", "must be greater than 0"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        check_http_url("site_url", &self.site_url)?;
        check_http_url("admin_redirect_url", &self.admin_redirect_url)?;
        check_http_url("account_api_url", self.account_api_url())?;
        check_http_url("pages_api_url", self.pages_api_url())?;
        check_http_url("login_url", self.login_url())?;

        if !self.account_api_url().ends_with('/') {
            return Err(invalid("account_api_url", "must end with '/'"));
        }

        if self.oauth2_client_id().is_empty() {
            return Err(ConfigError::Missing {
                field: "oauth2_client_id".into(),
                hint: "Set PAGEMIRROR_OAUTH2_CLIENT_ID environment variable".into(),
            });
        }

        if self.permalink_structure.as_deref().is_some_and(str::is_empty) {
            tracing::warn!("permalink_structure is empty; sign-in will be refused until it is set");
        }

        Ok(())
    }
}
