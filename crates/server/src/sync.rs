//! Sync engine: mirrors the content platform's page list into the page store.
//!
//! A run has two update passes (visible pages, then hidden pages such as
//! split-test variations) and, once a watermark exists, a deletion pass. The
//! watermark only advances after every pass succeeded, so a failed run is
//! retried over the same window next time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pagemirror_client::{ContentApi, PageQuery, RemotePage};
use pagemirror_core::store::{LocalFields, PageRecord, PageRef, PageUpdate, RemoteFields};
use pagemirror_core::{AppConfig, Db, Error, page_key};
use serde::Serialize;
use tokio::sync::Mutex;

/// Counters for one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    /// Records disconnected because they became variations or were unpublished.
    pub demoted: usize,
    pub deleted: usize,
}

#[derive(Clone)]
pub struct SyncEngine {
    api: ContentApi,
    db: Db,
    deletion_feed_ordered: bool,
    guard: Arc<Mutex<()>>,
}

impl SyncEngine {
    pub fn new(api: ContentApi, db: Db, config: &AppConfig) -> Self {
        Self { api, db, deletion_feed_ordered: config.deletion_feed_ordered, guard: Arc::new(Mutex::new(())) }
    }

    /// Run a full sync.
    ///
    /// # Errors
    ///
    /// - `Error::SyncInProgress` when another run holds the guard
    /// - `Error::Auth` when not signed in or the platform rejects the tokens
    /// - any remote or storage error, which aborts the run
    pub async fn run(&self) -> Result<SyncReport, Error> {
        let _running = self.guard.try_lock().map_err(|_| Error::SyncInProgress)?;

        if !self.db.is_logged_in().await? {
            return Err(Error::Auth("not logged in".into()));
        }

        let watermark = self.db.watermark().await?;
        tracing::info!(watermark = ?watermark, "page sync started");

        let mut report = SyncReport::default();
        self.update_pass(PageQuery::visible(watermark), &mut report).await?;
        self.update_pass(PageQuery::hidden(watermark), &mut report).await?;

        match watermark {
            Some(watermark) => self.deletion_pass(watermark, &mut report).await?,
            None => tracing::debug!("no watermark yet, skipping deletion pass"),
        }

        self.db.set_watermark(Utc::now()).await?;
        tracing::info!(
            created = report.created,
            updated = report.updated,
            demoted = report.demoted,
            deleted = report.deleted,
            "page sync finished"
        );
        Ok(report)
    }

    async fn update_pass(&self, query: PageQuery, report: &mut SyncReport) -> Result<(), Error> {
        let mut feed = self.api.feed(query);
        while let Some(batch) = feed.next_batch().await? {
            for page in batch {
                self.apply_update(page, report).await?;
            }
        }
        Ok(())
    }

    async fn apply_update(&self, page: RemotePage, report: &mut SyncReport) -> Result<(), Error> {
        let uuid = page.uuid().to_string();
        let fields = RemoteFields::from(page);

        let Some(existing) = self.db.get_page_by_uuid(&uuid).await? else {
            self.db.create_page(&fields).await?;
            report.created += 1;
            return Ok(());
        };

        let became_variation = fields.is_split_test_variation() && existing.connected && existing.local_slug.is_some();
        let unpublished = fields.current_edition.is_none();

        self.db.update_page(PageRef::Uuid(&uuid), PageUpdate::Remote(fields)).await?;
        report.updated += 1;

        if became_variation || unpublished {
            if existing.connected {
                tracing::debug!(uuid = existing.uuid.as_str(), became_variation, unpublished, "demoting page");
                report.demoted += 1;
            }
            self.disconnect(&existing).await?;
        }
        Ok(())
    }

    async fn deletion_pass(&self, watermark: DateTime<Utc>, report: &mut SyncReport) -> Result<(), Error> {
        let mut feed = self.api.feed(PageQuery::deleted());

        'feed: while let Some(batch) = feed.next_batch().await? {
            for page in batch {
                let Some(deleted_at) = page.meta.deleted else {
                    continue;
                };
                if deleted_at <= watermark {
                    if self.deletion_feed_ordered {
                        tracing::debug!(uuid = page.uuid(), "reached deletions older than watermark");
                        break 'feed;
                    }
                    continue;
                }

                let Some(existing) = self.db.get_page_by_uuid(page.uuid()).await? else {
                    continue;
                };

                self.db
                    .update_page(PageRef::Id(existing.id), PageUpdate::Remote(RemoteFields::from(page)))
                    .await?;
                report.deleted += 1;

                if existing.connected && existing.local_slug.is_some() {
                    self.disconnect(&existing).await?;
                }
            }
        }
        Ok(())
    }

    /// Clear the record's cached page and its serving fields.
    async fn disconnect(&self, record: &PageRecord) -> Result<(), Error> {
        if let Some(slug) = record.local_slug.as_deref() {
            self.db.delete_cached_response(&page_key(slug)).await?;
        }
        self.db
            .update_page(PageRef::Id(record.id), PageUpdate::Local(LocalFields::disconnected()))
            .await?;
        Ok(())
    }
}
