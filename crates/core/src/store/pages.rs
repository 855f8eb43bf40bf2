//! Page store.
//!
//! Local records of pages synced from the remote content platform, plus the
//! local-only serving fields (`connected`, `local_slug`, `page_type`) that the
//! admin surface controls.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_rusqlite::{params, params_from_iter, rusqlite};

use super::connection::Db;
use crate::Error;
use crate::slug::normalize_slug;

const PAGE_COLUMNS: &str = "id, uuid, name, published_url, redirect_rules, remote_slug, last_published,
    current_edition, split_test_info, variation_refs, kind, conversion_rate, lead_value,
    conversions, views, visitors, remote_updated_at, remote_deleted_at, connected, page_type, local_slug";

/// Whether a page is a plain page or the root of a split test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Standard,
    SplitTestRoot,
}

impl PageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PageKind::Standard => "standard",
            PageKind::SplitTestRoot => "split_test_root",
        }
    }
}

impl FromStr for PageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(PageKind::Standard),
            "split_test_root" => Ok(PageKind::SplitTestRoot),
            other => Err(Error::InvalidData(format!("unknown page kind: {other}"))),
        }
    }
}

/// Special role a connected page can be served as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageType {
    #[serde(rename = "404")]
    NotFound,
    #[serde(rename = "home")]
    Home,
    #[serde(rename = "welcome")]
    Welcome,
}

impl PageType {
    pub fn as_str(self) -> &'static str {
        match self {
            PageType::NotFound => "404",
            PageType::Home => "home",
            PageType::Welcome => "welcome",
        }
    }
}

impl FromStr for PageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "404" => Ok(PageType::NotFound),
            "home" => Ok(PageType::Home),
            "welcome" => Ok(PageType::Welcome),
            other => Err(Error::Validation(format!("unknown page type: {other}"))),
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally stored page record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub published_url: Option<String>,
    pub redirect_rules: Option<Value>,
    pub remote_slug: String,
    pub last_published: Option<DateTime<Utc>>,
    /// `None` means the page is not published on the remote platform.
    pub current_edition: Option<String>,
    /// Present only on split-test variations.
    pub split_test_info: Option<Value>,
    /// Present only on split-test roots.
    pub variation_refs: Option<Value>,
    pub kind: PageKind,
    pub conversion_rate: Option<f64>,
    pub lead_value: Option<f64>,
    pub conversions: Option<i64>,
    pub views: Option<i64>,
    pub visitors: Option<i64>,
    pub remote_updated_at: Option<DateTime<Utc>>,
    pub remote_deleted_at: Option<DateTime<Utc>>,
    pub connected: bool,
    pub page_type: Option<PageType>,
    pub local_slug: Option<String>,
}

impl PageRecord {
    /// A record can be served only when it is connected, published upstream,
    /// not deleted and not a split-test variation.
    pub fn is_servable(&self) -> bool {
        self.connected
            && self.current_edition.is_some()
            && self.remote_deleted_at.is_none()
            && self.split_test_info.is_none()
    }

    /// Split-test roots vary per visitor and are never cached whole.
    pub fn is_cacheable(&self) -> bool {
        self.kind != PageKind::SplitTestRoot
    }
}

/// The remote-sourced part of a page record, written by sync.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteFields {
    pub uuid: String,
    pub name: String,
    pub published_url: Option<String>,
    pub redirect_rules: Option<Value>,
    pub remote_slug: String,
    pub last_published: Option<DateTime<Utc>>,
    pub current_edition: Option<String>,
    pub split_test_info: Option<Value>,
    pub variation_refs: Option<Value>,
    pub kind: Option<PageKind>,
    pub conversion_rate: Option<f64>,
    pub lead_value: Option<f64>,
    pub conversions: Option<i64>,
    pub views: Option<i64>,
    pub visitors: Option<i64>,
    pub remote_updated_at: Option<DateTime<Utc>>,
    pub remote_deleted_at: Option<DateTime<Utc>>,
}

impl RemoteFields {
    pub fn is_split_test_variation(&self) -> bool {
        self.split_test_info.is_some()
    }
}

/// The local-only serving fields, written by the admin surface.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalFields {
    pub local_slug: Option<String>,
    pub connected: bool,
    pub page_type: Option<PageType>,
}

impl LocalFields {
    /// Disconnected, no slug, no page type.
    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// Which record an update targets.
#[derive(Debug, Clone, Copy)]
pub enum PageRef<'a> {
    Id(i64),
    Uuid(&'a str),
}

impl PageRef<'_> {
    fn column(&self) -> &'static str {
        match self {
            PageRef::Id(_) => "id",
            PageRef::Uuid(_) => "uuid",
        }
    }

    fn value(&self) -> rusqlite::types::Value {
        match self {
            PageRef::Id(id) => rusqlite::types::Value::Integer(*id),
            PageRef::Uuid(uuid) => rusqlite::types::Value::Text((*uuid).to_string()),
        }
    }
}

/// A partial update applied to a page record.
#[derive(Debug, Clone)]
pub enum PageUpdate {
    /// Overwrite the remote-sourced fields (the uuid is never changed).
    Remote(RemoteFields),
    /// Overwrite the local serving fields.
    Local(LocalFields),
}

/// Sort column for page listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrder {
    /// Remote update time.
    #[default]
    Date,
    Name,
}

/// Sort direction for page listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

/// Listing parameters.
#[derive(Debug, Clone)]
pub struct PageListQuery {
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
    /// `Some(true)` keeps only connected pages, `Some(false)` only disconnected ones.
    pub connected: Option<bool>,
    pub order_by: PageOrder,
    pub direction: Direction,
    /// Substring match on name.
    pub search: Option<String>,
}

impl Default for PageListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            connected: None,
            order_by: PageOrder::Date,
            direction: Direction::Desc,
            search: None,
        }
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::InvalidData(format!("bad timestamp {raw:?}: {e}")))
}

fn encode_json(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(Value::to_string)
}

fn decode_json(raw: Option<String>) -> Result<Option<Value>, Error> {
    raw.map(|s| serde_json::from_str(&s).map_err(|e| Error::InvalidData(format!("bad json column: {e}"))))
        .transpose()
}

fn decode_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>, Error> {
    raw.as_deref().map(parse_timestamp).transpose()
}

/// Raw column values, decoded into a [`PageRecord`] outside the row callback.
struct PageRow {
    id: i64,
    uuid: String,
    name: String,
    published_url: Option<String>,
    redirect_rules: Option<String>,
    remote_slug: String,
    last_published: Option<String>,
    current_edition: Option<String>,
    split_test_info: Option<String>,
    variation_refs: Option<String>,
    kind: String,
    conversion_rate: Option<f64>,
    lead_value: Option<f64>,
    conversions: Option<i64>,
    views: Option<i64>,
    visitors: Option<i64>,
    remote_updated_at: Option<String>,
    remote_deleted_at: Option<String>,
    connected: bool,
    page_type: Option<String>,
    local_slug: Option<String>,
}

impl PageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            published_url: row.get(3)?,
            redirect_rules: row.get(4)?,
            remote_slug: row.get(5)?,
            last_published: row.get(6)?,
            current_edition: row.get(7)?,
            split_test_info: row.get(8)?,
            variation_refs: row.get(9)?,
            kind: row.get(10)?,
            conversion_rate: row.get(11)?,
            lead_value: row.get(12)?,
            conversions: row.get(13)?,
            views: row.get(14)?,
            visitors: row.get(15)?,
            remote_updated_at: row.get(16)?,
            remote_deleted_at: row.get(17)?,
            connected: row.get::<_, i64>(18)? != 0,
            page_type: row.get(19)?,
            local_slug: row.get(20)?,
        })
    }
}

impl TryFrom<PageRow> for PageRecord {
    type Error = Error;

    fn try_from(row: PageRow) -> Result<Self, Self::Error> {
        let page_type = row
            .page_type
            .as_deref()
            .map(|s| s.parse::<PageType>().map_err(|_| Error::InvalidData(format!("unknown page type: {s}"))))
            .transpose()?;

        Ok(PageRecord {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            published_url: row.published_url,
            redirect_rules: decode_json(row.redirect_rules)?,
            remote_slug: row.remote_slug,
            last_published: decode_timestamp(row.last_published)?,
            current_edition: row.current_edition,
            split_test_info: decode_json(row.split_test_info)?,
            variation_refs: decode_json(row.variation_refs)?,
            kind: row.kind.parse()?,
            conversion_rate: row.conversion_rate,
            lead_value: row.lead_value,
            conversions: row.conversions,
            views: row.views,
            visitors: row.visitors,
            remote_updated_at: decode_timestamp(row.remote_updated_at)?,
            remote_deleted_at: decode_timestamp(row.remote_deleted_at)?,
            connected: row.connected,
            page_type,
            local_slug: row.local_slug,
        })
    }
}

/// Remote fields flattened into SQL parameters, in column order after uuid.
fn remote_params(fields: &RemoteFields) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value as Sql;

    fn text(v: Option<String>) -> Sql {
        v.map(Sql::Text).unwrap_or(Sql::Null)
    }
    fn real(v: Option<f64>) -> Sql {
        v.map(Sql::Real).unwrap_or(Sql::Null)
    }
    fn int(v: Option<i64>) -> Sql {
        v.map(Sql::Integer).unwrap_or(Sql::Null)
    }

    vec![
        Sql::Text(fields.name.clone()),
        text(fields.published_url.clone()),
        text(encode_json(&fields.redirect_rules)),
        Sql::Text(fields.remote_slug.clone()),
        text(fields.last_published.as_ref().map(format_timestamp)),
        text(fields.current_edition.clone()),
        text(encode_json(&fields.split_test_info)),
        text(encode_json(&fields.variation_refs)),
        Sql::Text(fields.kind.unwrap_or(PageKind::Standard).as_str().to_string()),
        real(fields.conversion_rate),
        real(fields.lead_value),
        int(fields.conversions),
        int(fields.views),
        int(fields.visitors),
        text(fields.remote_updated_at.as_ref().map(format_timestamp)),
        text(fields.remote_deleted_at.as_ref().map(format_timestamp)),
    ]
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `\` as the escape character.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

impl Db {
    /// Insert a page observed for the first time during sync.
    ///
    /// Returns the local id of the new record.
    pub async fn create_page(&self, fields: &RemoteFields) -> Result<i64, Error> {
        let uuid = fields.uuid.clone();
        let mut values = vec![rusqlite::types::Value::Text(uuid)];
        values.extend(remote_params(fields));

        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO pages (
                        uuid, name, published_url, redirect_rules, remote_slug, last_published,
                        current_edition, split_test_info, variation_refs, kind, conversion_rate,
                        lead_value, conversions, views, visitors, remote_updated_at, remote_deleted_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                    params_from_iter(values),
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// Apply a partial update to the record identified by `target`.
    ///
    /// Returns the number of rows changed (0 when no such record exists).
    pub async fn update_page(&self, target: PageRef<'_>, update: PageUpdate) -> Result<usize, Error> {
        let column = target.column();
        let key = target.value();

        let (sql, mut values) = match update {
            PageUpdate::Remote(fields) => (
                format!(
                    "UPDATE pages SET
                        name = ?1, published_url = ?2, redirect_rules = ?3, remote_slug = ?4,
                        last_published = ?5, current_edition = ?6, split_test_info = ?7,
                        variation_refs = ?8, kind = ?9, conversion_rate = ?10, lead_value = ?11,
                        conversions = ?12, views = ?13, visitors = ?14, remote_updated_at = ?15,
                        remote_deleted_at = ?16
                    WHERE {column} = ?17"
                ),
                remote_params(&fields),
            ),
            PageUpdate::Local(fields) => {
                use rusqlite::types::Value as Sql;
                (
                    format!("UPDATE pages SET local_slug = ?1, connected = ?2, page_type = ?3 WHERE {column} = ?4"),
                    vec![
                        fields.local_slug.map(Sql::Text).unwrap_or(Sql::Null),
                        Sql::Integer(i64::from(fields.connected)),
                        fields
                            .page_type
                            .map(|t| Sql::Text(t.as_str().to_string()))
                            .unwrap_or(Sql::Null),
                    ],
                )
            }
        };
        values.push(key);

        self.conn
            .call(move |conn| -> Result<usize, Error> { Ok(conn.execute(&sql, params_from_iter(values))?) })
            .await
            .map_err(Error::from)
    }

    /// Get a page by its local id.
    pub async fn get_page_by_id(&self, id: i64) -> Result<Option<PageRecord>, Error> {
        self.query_one_page(
            format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?1"),
            rusqlite::types::Value::Integer(id),
        )
        .await
    }

    /// Get a page by its remote uuid.
    pub async fn get_page_by_uuid(&self, uuid: &str) -> Result<Option<PageRecord>, Error> {
        self.query_one_page(
            format!("SELECT {PAGE_COLUMNS} FROM pages WHERE uuid = ?1"),
            rusqlite::types::Value::Text(uuid.to_string()),
        )
        .await
    }

    /// Get the connected, non-deleted page served under `slug`.
    pub async fn get_page_by_local_slug(&self, slug: &str) -> Result<Option<PageRecord>, Error> {
        let slug = normalize_slug(slug);
        if slug.is_empty() {
            return Ok(None);
        }
        self.query_one_page(
            format!(
                "SELECT {PAGE_COLUMNS} FROM pages
                 WHERE connected = 1 AND remote_deleted_at IS NULL AND local_slug = ?1"
            ),
            rusqlite::types::Value::Text(slug),
        )
        .await
    }

    async fn query_one_page(&self, sql: String, key: rusqlite::types::Value) -> Result<Option<PageRecord>, Error> {
        let row = self
            .conn
            .call(move |conn| -> Result<Option<PageRow>, Error> {
                let mut stmt = conn.prepare(&sql)?;
                match stmt.query_row(params![key], PageRow::from_row) {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(PageRecord::try_from).transpose()
    }

    /// List pages for the admin table.
    ///
    /// Split-test variations, deleted pages and pages unpublished upstream are
    /// always excluded. Returns the requested page of records and the total
    /// number of matching records.
    pub async fn list_pages(&self, query: &PageListQuery) -> Result<(Vec<PageRecord>, u64), Error> {
        use rusqlite::types::Value as Sql;

        let mut filter = String::from(
            "WHERE current_edition IS NOT NULL AND remote_deleted_at IS NULL AND split_test_info IS NULL",
        );
        let mut values: Vec<Sql> = Vec::new();

        if let Some(connected) = query.connected {
            values.push(Sql::Integer(i64::from(connected)));
            filter.push_str(&format!(" AND connected = ?{}", values.len()));
        }

        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            values.push(Sql::Text(format!("%{}%", escape_like(search))));
            filter.push_str(&format!(" AND name LIKE ?{} ESCAPE '\\'", values.len()));
        }

        let column = match query.order_by {
            PageOrder::Date => "remote_updated_at",
            PageOrder::Name => "name",
        };
        let direction = match query.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };

        let per_page = i64::from(query.per_page.max(1));
        let offset = i64::from(query.page.max(1) - 1) * per_page;

        let count_sql = format!("SELECT COUNT(*) FROM pages {filter}");
        let page_sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages {filter} ORDER BY {column} {direction}, id {direction} LIMIT {per_page} OFFSET {offset}"
        );

        let (rows, total) = self
            .conn
            .call(move |conn| -> Result<(Vec<PageRow>, u64), Error> {
                let total: i64 = conn.query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))?;
                if total == 0 {
                    return Ok((Vec::new(), 0));
                }

                let mut stmt = conn.prepare(&page_sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values.iter()), PageRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rows, total as u64))
            })
            .await
            .map_err(Error::from)?;

        let records = rows
            .into_iter()
            .map(PageRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((records, total))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn remote_fields(uuid: &str, name: &str) -> RemoteFields {
        RemoteFields {
            uuid: uuid.to_string(),
            name: name.to_string(),
            published_url: Some(format!("https://pages.example.com/{uuid}")),
            redirect_rules: None,
            remote_slug: name.to_lowercase().replace(' ', "-"),
            last_published: Some(Utc::now()),
            current_edition: Some("v1".to_string()),
            split_test_info: None,
            variation_refs: None,
            kind: Some(PageKind::Standard),
            conversion_rate: Some(0.25),
            lead_value: None,
            conversions: Some(3),
            views: Some(12),
            visitors: Some(10),
            remote_updated_at: Some(Utc::now()),
            remote_deleted_at: None,
        }
    }

    pub(crate) async fn connect(db: &Db, id: i64, slug: &str) {
        db.update_page(
            PageRef::Id(id),
            PageUpdate::Local(LocalFields { local_slug: Some(slug.to_string()), connected: true, page_type: None }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = Db::open_in_memory().await.unwrap();
        let mut fields = remote_fields("abc", "Spring Promo");
        fields.redirect_rules = Some(json!({"target": "https://example.com"}));

        let id = db.create_page(&fields).await.unwrap();

        let by_id = db.get_page_by_id(id).await.unwrap().unwrap();
        assert_eq!(by_id.uuid, "abc");
        assert_eq!(by_id.name, "Spring Promo");
        assert_eq!(by_id.redirect_rules, Some(json!({"target": "https://example.com"})));
        assert_eq!(by_id.kind, PageKind::Standard);
        assert!(!by_id.connected);
        assert!(by_id.local_slug.is_none());

        let by_uuid = db.get_page_by_uuid("abc").await.unwrap().unwrap();
        assert_eq!(by_uuid, by_id);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = Db::open_in_memory().await.unwrap();
        assert!(db.get_page_by_id(42).await.unwrap().is_none());
        assert!(db.get_page_by_uuid("nope").await.unwrap().is_none());
        assert!(db.get_page_by_local_slug("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_uuid_rejected() {
        let db = Db::open_in_memory().await.unwrap();
        db.create_page(&remote_fields("abc", "One")).await.unwrap();
        let err = db.create_page(&remote_fields("abc", "Two")).await.unwrap_err();
        assert!(err.is_storage());
        assert!(err.is_constraint_violation());
    }

    #[tokio::test]
    async fn test_update_remote_by_uuid_keeps_local_fields() {
        let db = Db::open_in_memory().await.unwrap();
        let id = db.create_page(&remote_fields("abc", "Promo")).await.unwrap();
        connect(&db, id, "promo").await;

        let mut fields = remote_fields("abc", "Promo Renamed");
        fields.current_edition = Some("v2".to_string());
        let changed = db.update_page(PageRef::Uuid("abc"), PageUpdate::Remote(fields)).await.unwrap();
        assert_eq!(changed, 1);

        let page = db.get_page_by_id(id).await.unwrap().unwrap();
        assert_eq!(page.name, "Promo Renamed");
        assert_eq!(page.current_edition.as_deref(), Some("v2"));
        assert!(page.connected);
        assert_eq!(page.local_slug.as_deref(), Some("promo"));
    }

    #[tokio::test]
    async fn test_update_missing_changes_nothing() {
        let db = Db::open_in_memory().await.unwrap();
        let changed = db
            .update_page(PageRef::Uuid("ghost"), PageUpdate::Remote(remote_fields("ghost", "Ghost")))
            .await
            .unwrap();
        assert_eq!(changed, 0);
    }

    #[tokio::test]
    async fn test_local_slug_round_trip() {
        let db = Db::open_in_memory().await.unwrap();
        let id = db.create_page(&remote_fields("abc", "Promo")).await.unwrap();
        connect(&db, id, "promo").await;

        let page = db.get_page_by_local_slug("promo").await.unwrap().unwrap();
        assert_eq!(page.id, id);
        assert!(page.is_servable());

        let page = db.get_page_by_local_slug("/Promo/").await.unwrap().unwrap();
        assert_eq!(page.id, id);
    }

    #[tokio::test]
    async fn test_local_slug_lookup_ignores_disconnected_and_deleted() {
        let db = Db::open_in_memory().await.unwrap();
        let id = db.create_page(&remote_fields("abc", "Promo")).await.unwrap();
        db.update_page(
            PageRef::Id(id),
            PageUpdate::Local(LocalFields { local_slug: Some("promo".into()), connected: false, page_type: None }),
        )
        .await
        .unwrap();
        assert!(db.get_page_by_local_slug("promo").await.unwrap().is_none());

        connect(&db, id, "promo").await;
        let mut fields = remote_fields("abc", "Promo");
        fields.remote_deleted_at = Some(Utc::now());
        db.update_page(PageRef::Uuid("abc"), PageUpdate::Remote(fields)).await.unwrap();
        assert!(db.get_page_by_local_slug("promo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_slug_unique_among_connected() {
        let db = Db::open_in_memory().await.unwrap();
        let a = db.create_page(&remote_fields("a", "A")).await.unwrap();
        let b = db.create_page(&remote_fields("b", "B")).await.unwrap();
        connect(&db, a, "promo").await;

        let err = db
            .update_page(
                PageRef::Id(b),
                PageUpdate::Local(LocalFields { local_slug: Some("promo".into()), connected: true, page_type: None }),
            )
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());

        let ok = db
            .update_page(
                PageRef::Id(b),
                PageUpdate::Local(LocalFields { local_slug: Some("promo".into()), connected: false, page_type: None }),
            )
            .await
            .unwrap();
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn test_servability() {
        let db = Db::open_in_memory().await.unwrap();
        let id = db.create_page(&remote_fields("abc", "Promo")).await.unwrap();
        connect(&db, id, "promo").await;
        let page = db.get_page_by_id(id).await.unwrap().unwrap();
        assert!(page.is_servable());
        assert!(page.is_cacheable());

        let mut variation = page.clone();
        variation.split_test_info = Some(json!({"parent": "root"}));
        assert!(!variation.is_servable());

        let mut unpublished = page.clone();
        unpublished.current_edition = None;
        assert!(!unpublished.is_servable());

        let mut root = page;
        root.kind = PageKind::SplitTestRoot;
        assert!(root.is_servable());
        assert!(!root.is_cacheable());
    }

    #[tokio::test]
    async fn test_list_excludes_hidden_records() {
        let db = Db::open_in_memory().await.unwrap();
        db.create_page(&remote_fields("visible", "Visible")).await.unwrap();

        let mut variation = remote_fields("variation", "Variation");
        variation.split_test_info = Some(json!({"id": "root"}));
        db.create_page(&variation).await.unwrap();

        let mut deleted = remote_fields("deleted", "Deleted");
        deleted.remote_deleted_at = Some(Utc::now());
        db.create_page(&deleted).await.unwrap();

        let mut draft = remote_fields("draft", "Draft");
        draft.current_edition = None;
        db.create_page(&draft).await.unwrap();

        let (items, total) = db.list_pages(&PageListQuery::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].uuid, "visible");
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_pages() {
        let db = Db::open_in_memory().await.unwrap();
        let mut ids = Vec::new();
        for (i, name) in ["Charlie", "alpha sale", "Bravo Sale"].iter().enumerate() {
            let mut fields = remote_fields(&format!("p{i}"), name);
            fields.remote_updated_at = Some(Utc::now() + chrono::Duration::seconds(i as i64));
            ids.push(db.create_page(&fields).await.unwrap());
        }
        connect(&db, ids[0], "charlie").await;

        let (items, total) = db
            .list_pages(&PageListQuery { connected: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].name, "Charlie");

        let (items, total) = db
            .list_pages(&PageListQuery { connected: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].name, "Bravo Sale");

        let query = PageListQuery {
            search: Some("sale".into()),
            order_by: PageOrder::Name,
            direction: Direction::Asc,
            ..Default::default()
        };
        let (items, total) = db.list_pages(&query).await.unwrap();
        assert_eq!(total, 2);
        let names: Vec<_> = items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Bravo Sale", "alpha sale"]);

        let (items, total) = db
            .list_pages(&PageListQuery { page: 2, per_page: 2, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Charlie");
    }

    #[tokio::test]
    async fn test_list_search_escapes_wildcards() {
        let db = Db::open_in_memory().await.unwrap();
        db.create_page(&remote_fields("a", "100% off")).await.unwrap();
        db.create_page(&remote_fields("b", "1000 off")).await.unwrap();

        let (items, total) = db
            .list_pages(&PageListQuery { search: Some("0%".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].uuid, "a");
    }

    #[test]
    fn test_page_type_parse() {
        assert_eq!("404".parse::<PageType>().unwrap(), PageType::NotFound);
        assert_eq!("home".parse::<PageType>().unwrap(), PageType::Home);
        assert!("landing".parse::<PageType>().is_err());
        assert_eq!(serde_json::to_string(&PageType::NotFound).unwrap(), "\"404\"");
    }
}
