//! Content API payloads.

use chrono::{DateTime, NaiveDateTime, Utc};
use pagemirror_core::store::{PageKind, RemoteFields};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Remote kind of a split-test root page.
pub const SPLIT_TEST_KIND: &str = "LeadpageSplitTestV2";

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PageListing {
    #[serde(rename = "_items", default)]
    pub items: Vec<RemotePage>,
    #[serde(rename = "_meta")]
    pub meta: ListingMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingMeta {
    #[serde(default)]
    pub total: u64,
    #[serde(default, deserialize_with = "cursor")]
    pub cursor: u64,
}

impl PageListing {
    pub fn has_more(&self) -> bool {
        self.meta.total > self.meta.cursor
    }
}

/// A page as the content API describes it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePage {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(rename = "_meta")]
    pub meta: PageMeta,
    pub content: PageContent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    pub id: String,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp")]
    pub deleted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub published_url: Option<String>,
    #[serde(default)]
    pub redirect: Option<Value>,
    #[serde(default)]
    pub slug: String,
    #[serde(default, deserialize_with = "timestamp")]
    pub last_published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_edition: Option<String>,
    #[serde(default)]
    pub split_test: Option<Value>,
    #[serde(default)]
    pub variations: Option<Value>,
    #[serde(default)]
    pub conversion_rate: Option<f64>,
    #[serde(default)]
    pub lead_value: Option<f64>,
    #[serde(default)]
    pub conversions: Option<i64>,
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub visitors: Option<i64>,
}

impl RemotePage {
    pub fn uuid(&self) -> &str {
        &self.meta.id
    }

    pub fn page_kind(&self) -> PageKind {
        match self.kind.as_deref() {
            Some(SPLIT_TEST_KIND) => PageKind::SplitTestRoot,
            _ => PageKind::Standard,
        }
    }
}

impl From<RemotePage> for RemoteFields {
    fn from(page: RemotePage) -> Self {
        let kind = Some(page.page_kind());
        let RemotePage { meta, content, .. } = page;
        RemoteFields {
            uuid: meta.id,
            name: content.name,
            published_url: content.published_url,
            redirect_rules: content.redirect,
            remote_slug: content.slug,
            last_published: content.last_published,
            current_edition: content.current_edition,
            split_test_info: content.split_test,
            variation_refs: content.variations,
            kind,
            conversion_rate: content.conversion_rate,
            lead_value: content.lead_value,
            conversions: content.conversions,
            views: content.views,
            visitors: content.visitors,
            remote_updated_at: meta.updated,
            remote_deleted_at: meta.deleted,
        }
    }
}

/// Parse the timestamp shapes the content API has been seen to emit.
pub fn parse_remote_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => parse_remote_timestamp(s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {s}"))),
    }
}

/// Cursors arrive as numbers or numeric strings.
fn cursor<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Ok(n),
        Some(Raw::Text(s)) if s.is_empty() => Ok(0),
        Some(Raw::Text(s)) => s.parse().map_err(serde::de::Error::custom),
        None => Ok(0),
    }
}
