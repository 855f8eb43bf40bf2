//! Index of the host site's own posts and pages.
//!
//! Only consulted to keep a mirrored page from shadowing host content under
//! the same path.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

use super::connection::Db;
use crate::Error;
use crate::slug::normalize_slug;

/// A piece of host content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteContent {
    pub id: i64,
    pub title: String,
    pub slug: String,
    /// `post`, `page`, or any other host content type.
    pub content_type: String,
}

impl Db {
    /// Register or replace a host content item. The slug is stored normalized.
    pub async fn upsert_site_content(&self, item: &SiteContent) -> Result<(), Error> {
        let item = SiteContent { slug: normalize_slug(&item.slug), ..item.clone() };
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO site_content (id, title, slug, content_type) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        title = excluded.title, slug = excluded.slug, content_type = excluded.content_type",
                    params![item.id, item.title, item.slug, item.content_type],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Posts and pages already living under `slug`.
    pub async fn find_slug_collisions(&self, slug: &str) -> Result<Vec<SiteContent>, Error> {
        let slug = normalize_slug(slug);
        self.conn
            .call(move |conn| -> Result<Vec<SiteContent>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, title, slug, content_type FROM site_content
                     WHERE slug = ?1 AND content_type IN ('post', 'page')
                     ORDER BY id",
                )?;
                let items = stmt
                    .query_map(params![slug], |row| {
                        Ok(SiteContent {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            slug: row.get(2)?,
                            content_type: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, title: &str, slug: &str, content_type: &str) -> SiteContent {
        SiteContent { id, title: title.into(), slug: slug.into(), content_type: content_type.into() }
    }

    #[tokio::test]
    async fn test_collisions_match_posts_and_pages() {
        let db = Db::open_in_memory().await.unwrap();
        db.upsert_site_content(&item(1, "Existing Post", "existing-post", "post")).await.unwrap();
        db.upsert_site_content(&item(2, "An Attachment", "existing-post", "attachment")).await.unwrap();
        db.upsert_site_content(&item(3, "About", "about", "page")).await.unwrap();

        let hits = db.find_slug_collisions("existing-post").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Existing Post");

        let hits = db.find_slug_collisions("/About/").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 3);

        assert!(db.find_slug_collisions("nothing-here").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_normalizes() {
        let db = Db::open_in_memory().await.unwrap();
        db.upsert_site_content(&item(1, "Draft", "Old Slug", "post")).await.unwrap();
        assert_eq!(db.find_slug_collisions("old-slug").await.unwrap().len(), 1);

        db.upsert_site_content(&item(1, "Final", "new-slug", "post")).await.unwrap();
        assert!(db.find_slug_collisions("old-slug").await.unwrap().is_empty());
        assert_eq!(db.find_slug_collisions("new-slug").await.unwrap()[0].title, "Final");
    }
}
