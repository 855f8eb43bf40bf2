//! Content API access: page listings and the lazy cursor feed over them.
//!
//! Listings are cursor-paginated. Each response carries `_items` and
//! `_meta { total, cursor }`; more items remain while `total > cursor`, and
//! the next request passes the returned cursor back.

mod wire;

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use pagemirror_core::{AppConfig, Error};

use crate::remote::{Outcome, RemoteClient, RemoteRequest};

pub use wire::{ListingMeta, PageContent, PageListing, PageMeta, RemotePage, SPLIT_TEST_KIND, parse_remote_timestamp};

/// Items requested per listing call.
pub const PAGE_SIZE: u32 = 100;

/// Filters for a page listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    params: Vec<(String, String)>,
}

impl PageQuery {
    fn new() -> Self {
        Self { params: vec![("limit".into(), PAGE_SIZE.to_string())] }
    }

    fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    fn updated_after(self, watermark: Option<DateTime<Utc>>) -> Self {
        match watermark {
            Some(ts) => self.param("updated[gt]", ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => self,
        }
    }

    /// Visible pages, most recently updated first.
    pub fn visible(watermark: Option<DateTime<Utc>>) -> Self {
        Self::new().param("order_by", "-updated").updated_after(watermark)
    }

    /// Pages hidden from the platform's own listing, split-test variations
    /// among them.
    pub fn hidden(watermark: Option<DateTime<Utc>>) -> Self {
        Self::new().param("visible[ne]", "1").updated_after(watermark)
    }

    /// Deleted pages, most recently deleted first.
    pub fn deleted() -> Self {
        Self::new().param("deleted", "1")
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Authorized access to the content API.
#[derive(Clone)]
pub struct ContentApi {
    client: RemoteClient,
    url: String,
    timeout: Duration,
}

impl ContentApi {
    pub fn new(client: RemoteClient, config: &AppConfig) -> Self {
        Self { client, url: config.pages_api_url().to_string(), timeout: config.sync_timeout() }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    /// Fetch one listing page starting at `cursor`.
    ///
    /// Retries once on any failure except an authentication one, which is
    /// returned immediately as `Error::Auth`.
    pub async fn list_pages(&self, query: &PageQuery, cursor: u64) -> Result<PageListing, Error> {
        let mut request = RemoteRequest::get(&self.url).authorized().timeout(self.timeout);
        for (key, value) in query.params() {
            request = request.query(key, value);
        }
        request = request.query("cursor", cursor.to_string());

        let mut retried = false;
        loop {
            match self.client.request(request.clone()).await? {
                Outcome::Success(response) => return response.json(),
                Outcome::NeedsReauth => {
                    return Err(Error::Auth("content platform credentials are no longer valid".into()));
                }
                Outcome::Failed(e) if e.is_auth() || retried => return Err(e.into()),
                Outcome::Failed(e) => {
                    tracing::debug!(error = %e, cursor, "page listing failed, retrying");
                    retried = true;
                }
            }
        }
    }

    /// A lazy feed over every page matching `query`.
    pub fn feed(&self, query: PageQuery) -> PageFeed<'_> {
        PageFeed { api: self, query, cursor: 0, exhausted: false }
    }
}

/// Cursor over a listing; each call to [`next_batch`](PageFeed::next_batch)
/// pulls one more page from the API. A fresh feed from [`ContentApi::feed`]
/// starts over at cursor 0.
pub struct PageFeed<'a> {
    api: &'a ContentApi,
    query: PageQuery,
    cursor: u64,
    exhausted: bool,
}

impl PageFeed<'_> {
    /// The next batch of items, or `None` once the server reports none remain.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<RemotePage>>, Error> {
        if self.exhausted {
            return Ok(None);
        }

        let listing = self.api.list_pages(&self.query, self.cursor).await?;
        let next = listing.meta.cursor;

        if !listing.has_more() {
            self.exhausted = true;
        } else if next <= self.cursor {
            tracing::warn!(cursor = next, total = listing.meta.total, "listing cursor did not advance, stopping");
            self.exhausted = true;
        }
        self.cursor = next;

        Ok(Some(listing.items))
    }
}
