//! Persisted settings: OAuth tokens, the sync watermark, the permalink
//! structure and the single-use PKCE verifier.

use chrono::{DateTime, Utc};
use tokio_rusqlite::{params, rusqlite};

use super::connection::Db;
use super::pages::{format_timestamp, parse_timestamp};
use crate::Error;

/// Typed option names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKey {
    /// Completion time of the last successful sync.
    LastPageSync,
    PermalinkStructure,
    CodeVerifier,
    RefreshToken,
    AccessToken,
}

impl OptionKey {
    pub fn as_str(self) -> &'static str {
        match self {
            OptionKey::LastPageSync => "last_page_sync_date",
            OptionKey::PermalinkStructure => "permalink_structure",
            OptionKey::CodeVerifier => "code_verifier",
            OptionKey::RefreshToken => "refresh_token",
            OptionKey::AccessToken => "access_token",
        }
    }
}

impl Db {
    /// Read an option value.
    pub async fn get_option(&self, key: OptionKey) -> Result<Option<String>, Error> {
        let name = key.as_str();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let mut stmt = conn.prepare("SELECT value FROM options WHERE name = ?1")?;
                match stmt.query_row(params![name], |row| row.get(0)) {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Write an option value, replacing any previous one.
    pub async fn set_option(&self, key: OptionKey, value: &str) -> Result<(), Error> {
        let name = key.as_str();
        let value = value.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO options (name, value, updated_at)
                     VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                     ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![name, value],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove an option. Removing an absent option is not an error.
    pub async fn delete_option(&self, key: OptionKey) -> Result<bool, Error> {
        let name = key.as_str();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let rows = conn.execute("DELETE FROM options WHERE name = ?1", params![name])?;
                Ok(rows > 0)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn access_token(&self) -> Result<Option<String>, Error> {
        Ok(self.get_option(OptionKey::AccessToken).await?.filter(|t| !t.is_empty()))
    }

    pub async fn refresh_token(&self) -> Result<Option<String>, Error> {
        Ok(self.get_option(OptionKey::RefreshToken).await?.filter(|t| !t.is_empty()))
    }

    /// Store a token pair. The refresh token is left alone when `None`.
    pub async fn store_tokens(&self, access_token: &str, refresh_token: Option<&str>) -> Result<(), Error> {
        self.set_option(OptionKey::AccessToken, access_token).await?;
        if let Some(refresh_token) = refresh_token {
            self.set_option(OptionKey::RefreshToken, refresh_token).await?;
        }
        Ok(())
    }

    /// Both tokens present and non-empty.
    pub async fn is_logged_in(&self) -> Result<bool, Error> {
        Ok(self.access_token().await?.is_some() && self.refresh_token().await?.is_some())
    }

    /// Forget both tokens. Afterwards every caller is logged out.
    pub async fn clear_tokens(&self) -> Result<(), Error> {
        self.delete_option(OptionKey::AccessToken).await?;
        self.delete_option(OptionKey::RefreshToken).await?;
        Ok(())
    }

    /// Completion time of the last successful sync, absent before the first one.
    pub async fn watermark(&self) -> Result<Option<DateTime<Utc>>, Error> {
        self.get_option(OptionKey::LastPageSync)
            .await?
            .as_deref()
            .map(parse_timestamp)
            .transpose()
    }

    pub async fn set_watermark(&self, at: DateTime<Utc>) -> Result<(), Error> {
        self.set_option(OptionKey::LastPageSync, &format_timestamp(&at)).await
    }

    /// The host's permalink template, empty when unset.
    pub async fn permalink_structure(&self) -> Result<String, Error> {
        Ok(self.get_option(OptionKey::PermalinkStructure).await?.unwrap_or_default())
    }
}
