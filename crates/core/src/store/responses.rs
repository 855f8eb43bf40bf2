//! Whole-response cache keyed by local serving slug.
//!
//! Entries hold the raw upstream response (status, content type, cookies and
//! body) so a hit can be rendered exactly as a fresh fetch would be. Expired
//! rows are ignored on read and removed by [`Db::purge_expired_responses`].

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

use super::connection::Db;
use super::pages::format_timestamp;
use crate::Error;

/// Prefix for page cache keys.
pub const PAGE_KEY_PREFIX: &str = "pagemirror_page_";

/// Cache key for the page served under `slug`.
pub fn page_key(slug: &str) -> String {
    format!("{PAGE_KEY_PREFIX}{slug}")
}

/// A cookie returned by the upstream platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    /// Raw `Expires` attribute, if the upstream sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

/// A cached upstream response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub cookies: Vec<ResponseCookie>,
    pub body: String,
}

impl CachedResponse {
    pub fn cookie(&self, name: &str) -> Option<&ResponseCookie> {
        self.cookies.iter().find(|c| c.name == name)
    }
}

impl Db {
    /// Get a live cache entry.
    pub async fn get_cached_response(&self, key: &str) -> Result<Option<CachedResponse>, Error> {
        let key = key.to_string();
        let now = format_timestamp(&Utc::now());

        let row = self
            .conn
            .call(move |conn| -> Result<Option<(u16, Option<String>, String, String)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT status, content_type, cookies_json, body
                     FROM response_cache WHERE cache_key = ?1 AND expires_at > ?2",
                )?;
                let row = stmt.query_row(params![key, now], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                });
                match row {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((status, content_type, cookies_json, body)) = row else {
            return Ok(None);
        };

        let cookies = serde_json::from_str(&cookies_json)
            .map_err(|e| Error::InvalidData(format!("bad cached cookies: {e}")))?;

        Ok(Some(CachedResponse { status, content_type, cookies, body }))
    }

    /// Store an entry that expires after `ttl`, replacing any previous one.
    pub async fn set_cached_response(&self, key: &str, response: &CachedResponse, ttl: Duration) -> Result<(), Error> {
        let key = key.to_string();
        let response = response.clone();
        let cookies_json = serde_json::to_string(&response.cookies)
            .map_err(|e| Error::InvalidData(format!("unserializable cookies: {e}")))?;

        let cached_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = cached_at.checked_add_signed(ttl).unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);
        let cached_at = format_timestamp(&cached_at);
        let expires_at = format_timestamp(&expires_at);

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO response_cache (cache_key, status, content_type, cookies_json, body, cached_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(cache_key) DO UPDATE SET
                        status = excluded.status,
                        content_type = excluded.content_type,
                        cookies_json = excluded.cookies_json,
                        body = excluded.body,
                        cached_at = excluded.cached_at,
                        expires_at = excluded.expires_at",
                    params![
                        key,
                        response.status,
                        response.content_type,
                        cookies_json,
                        response.body,
                        cached_at,
                        expires_at
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Drop an entry. Returns whether one existed.
    pub async fn delete_cached_response(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let rows = conn.execute("DELETE FROM response_cache WHERE cache_key = ?1", params![key])?;
                Ok(rows > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove every expired entry, returning how many were removed.
    pub async fn purge_expired_responses(&self) -> Result<usize, Error> {
        let now = format_timestamp(&Utc::now());
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                Ok(conn.execute("DELETE FROM response_cache WHERE expires_at <= ?1", params![now])?)
            })
            .await
            .map_err(Error::from)
    }
}
