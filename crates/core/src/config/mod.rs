//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PAGEMIRROR_*)
//! 2. TOML config file (if PAGEMIRROR_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Which deployment of the remote platform to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
    Local,
}

/// Remote endpoints and client id for one environment.
struct Endpoints {
    login_url: &'static str,
    account_api_url: &'static str,
    pages_api_url: &'static str,
    oauth2_client_id: &'static str,
}

impl Environment {
    fn endpoints(self) -> Endpoints {
        match self {
            Environment::Production => Endpoints {
                login_url: "https://my.leadpages.com/",
                account_api_url: "https://api.leadpages.io/account/v1/",
                pages_api_url: "https://api.leadpages.io/content/v1/leadpages",
                oauth2_client_id: "4PrRFNNQ6HZofeobzC67ES",
            },
            Environment::Development => Endpoints {
                login_url: "https://my.leadpagestest.com/",
                account_api_url: "https://api-test.leadpages.io/account/v1/",
                pages_api_url: "https://api-test.leadpages.io/content/v1/leadpages",
                oauth2_client_id: "umiUUQDm9bQZUYSjHnQSNe",
            },
            Environment::Local => Endpoints {
                login_url: "http://leadpages.docker/",
                account_api_url: "http://stargate.docker/account/v1/",
                pages_api_url: "http://stargate.docker/content/v1/leadpages",
                oauth2_client_id: "not-set",
            },
        }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PAGEMIRROR_*)
/// 2. TOML config file (if PAGEMIRROR_CONFIG_FILE set)
/// 3. Built-in defaults
///
/// The remote endpoint fields default to the values of the selected
/// [`Environment`]; setting one explicitly overrides just that endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Set via PAGEMIRROR_ENVIRONMENT.
    #[serde(default)]
    pub environment: Environment,

    /// Path to the SQLite database.
    ///
    /// Set via PAGEMIRROR_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Socket address the HTTP server listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Public base URL of this site, with a trailing slash.
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Seed for the persisted permalink structure option.
    #[serde(default)]
    pub permalink_structure: Option<String>,

    #[serde(default)]
    pub account_api_url: Option<String>,

    #[serde(default)]
    pub pages_api_url: Option<String>,

    #[serde(default)]
    pub login_url: Option<String>,

    #[serde(default)]
    pub oauth2_client_id: Option<String>,

    /// Where the OAuth2 callback sends the browser after sign-in.
    #[serde(default = "default_admin_redirect_url")]
    pub admin_redirect_url: String,

    /// User-Agent string for outbound requests.
    ///
    /// Set via PAGEMIRROR_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for fetching a published page, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub page_fetch_timeout_ms: u64,

    /// Timeout for each content API call made during sync, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Lifetime of a cached page response.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// How often expired cache rows are purged.
    #[serde(default = "default_cache_purge_interval_secs")]
    pub cache_purge_interval_secs: u64,

    /// Whether the deletion feed is ordered newest-deleted first, which lets
    /// the deletion pass stop at the first item at or before the watermark.
    #[serde(default = "default_true")]
    pub deletion_feed_ordered: bool,

    /// Verbose diagnostics.
    #[serde(default)]
    pub debug: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./pagemirror.sqlite")
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_site_url() -> String {
    "http://localhost:8080/".into()
}

fn default_admin_redirect_url() -> String {
    "http://localhost:8080/admin/pagemirror".into()
}

fn default_user_agent() -> String {
    "pagemirror/0.1".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_cache_ttl_secs() -> u64 {
    86_400
}

fn default_cache_purge_interval_secs() -> u64 {
    3_600
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            site_url: default_site_url(),
            permalink_structure: None,
            account_api_url: None,
            pages_api_url: None,
            login_url: None,
            oauth2_client_id: None,
            admin_redirect_url: default_admin_redirect_url(),
            user_agent: default_user_agent(),
            page_fetch_timeout_ms: default_timeout_ms(),
            sync_timeout_ms: default_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_purge_interval_secs: default_cache_purge_interval_secs(),
            deletion_feed_ordered: true,
            debug: false,
        }
    }
}

impl AppConfig {
    pub fn page_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.page_fetch_timeout_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_purge_interval(&self) -> Duration {
        Duration::from_secs(self.cache_purge_interval_secs)
    }

    /// Account API base (token endpoint lives under it). Ends with `/`.
    pub fn account_api_url(&self) -> &str {
        self.account_api_url.as_deref().unwrap_or(self.environment.endpoints().account_api_url)
    }

    /// Content API listing endpoint.
    pub fn pages_api_url(&self) -> &str {
        self.pages_api_url.as_deref().unwrap_or(self.environment.endpoints().pages_api_url)
    }

    /// Base of the platform's login page.
    pub fn login_url(&self) -> &str {
        self.login_url.as_deref().unwrap_or(self.environment.endpoints().login_url)
    }

    pub fn oauth2_client_id(&self) -> &str {
        self.oauth2_client_id.as_deref().unwrap_or(self.environment.endpoints().oauth2_client_id)
    }

    /// Callback URL registered with the platform for the authorization code grant.
    pub fn oauth2_redirect_uri(&self) -> String {
        format!("{}/api/v1/oauth2", self.site_url.trim_end_matches('/'))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PAGEMIRROR_`
    /// 2. TOML file from `PAGEMIRROR_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PAGEMIRROR_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PAGEMIRROR_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
