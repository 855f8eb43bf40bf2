//! Page administration handlers.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use pagemirror_core::slug::normalize_slug;
use pagemirror_core::store::{Direction, LocalFields, PageListQuery, PageOrder, PageRef, PageType, PageUpdate};
use pagemirror_core::{PageRecord, page_key};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_PER_PAGE: u32 = 100;
const MAX_SEARCH_LEN: usize = 200;
const MAX_SLUG_LEN: usize = 100;
const FORBIDDEN_SLUG_CHARS: &[char] = &[
    ':', '"', '?', '#', '[', ']', '@', '!', '$', '&', '\'', '(', ')', '*', '+', ',', ';', '=', ' ',
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    /// Connected pages only.
    Published,
    Unpublished,
}

impl StatusFilter {
    fn connected(self) -> Option<bool> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Published => Some(true),
            StatusFilter::Unpublished => Some(false),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[serde(default)]
    pub status: StatusFilter,
    #[serde(default)]
    pub order_by: PageOrder,
    #[serde(default)]
    pub direction: Direction,
    pub search: Option<String>,
}

impl ListParams {
    fn into_query(self) -> ApiResult<PageListQuery> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(ApiError::InvalidParam("page must be at least 1".into()));
        }

        let per_page = self.per_page.unwrap_or(10);
        if !(1..=MAX_PER_PAGE).contains(&per_page) {
            return Err(ApiError::InvalidParam(format!("perPage must be between 1 and {MAX_PER_PAGE}")));
        }

        let search = self.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        if search.as_ref().is_some_and(|s| s.chars().count() > MAX_SEARCH_LEN) {
            return Err(ApiError::InvalidParam(format!("search must be at most {MAX_SEARCH_LEN} characters")));
        }

        Ok(PageListQuery {
            page,
            per_page,
            connected: self.status.connected(),
            order_by: self.order_by,
            direction: self.direction,
            search,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageList {
    pub data: Vec<PageRecord>,
    pub meta: ListMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    #[serde(default)]
    pub slug: Option<String>,
    pub published: bool,
    #[serde(default)]
    pub page_type: Option<String>,
}

/// Validate an admin-supplied slug and return it normalized.
pub fn validate_slug(raw: &str) -> ApiResult<String> {
    let len = raw.chars().count();
    if len == 0 || len > MAX_SLUG_LEN {
        return Err(ApiError::InvalidParam(format!("slug must be between 1 and {MAX_SLUG_LEN} characters")));
    }
    if let Some(c) = raw.chars().find(|c| FORBIDDEN_SLUG_CHARS.contains(c)) {
        return Err(ApiError::InvalidParam(format!("slug may not contain {c:?}")));
    }

    let slug = normalize_slug(raw);
    if slug.is_empty() {
        return Err(ApiError::InvalidParam("slug is empty after normalization".into()));
    }
    Ok(slug)
}

fn page_id(path: Result<Path<i64>, PathRejection>) -> ApiResult<i64> {
    path.map(|Path(id)| id).map_err(|e| ApiError::InvalidParam(e.body_text()))
}

/// GET /api/v1/pages - List pages.
pub async fn list_pages(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<PageList>> {
    let Query(params) = params.map_err(|e| ApiError::InvalidParam(e.body_text()))?;
    let query = params.into_query()?;

    let (data, total) = state.db.list_pages(&query).await?;
    Ok(Json(PageList { data, meta: ListMeta { total, page: query.page, per_page: query.per_page } }))
}

/// POST /api/v1/pages - Sync pages from the content platform.
pub async fn sync_pages(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.sync.run().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/pages/{id} - Get one page.
pub async fn get_page(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<PageRecord>> {
    let id = page_id(path)?;
    let page = state
        .db
        .get_page_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no page with id {id}")))?;
    Ok(Json(page))
}

/// PUT /api/v1/pages/{id} - Update a page's slug, publish state and page type.
pub async fn update_page(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateBody>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let id = page_id(path)?;
    let Json(body) = body.map_err(|e| ApiError::InvalidParam(e.body_text()))?;

    let existing = state
        .db
        .get_page_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no page with id {id}")))?;

    let slug = body.slug.as_deref().map(validate_slug).transpose()?;
    let page_type = body.page_type.as_deref().map(str::parse::<PageType>).transpose()?;

    if body.published && slug.is_none() {
        return Err(ApiError::InvalidParam("a slug is required to publish a page".into()));
    }

    if let Some(slug) = slug.as_deref() {
        if let Some(content) = state.db.find_slug_collisions(slug).await?.into_iter().next() {
            return Err(ApiError::Conflict(format!(
                "post or page {} titled `{}` is already published under this slug",
                content.id, content.title
            )));
        }
        if let Some(other) = state.db.get_page_by_local_slug(slug).await?.filter(|p| p.id != id) {
            return Err(ApiError::Conflict(format!(
                "Landing page `{}` is already published under this slug",
                other.name
            )));
        }
    }

    let local = LocalFields { local_slug: slug.clone(), connected: body.published, page_type };
    state.db.update_page(PageRef::Id(id), PageUpdate::Local(local)).await?;

    if let Some(old) = existing.local_slug.as_deref()
        && (!body.published || slug.as_deref() != Some(old))
    {
        state.db.delete_cached_response(&page_key(old)).await?;
    }

    tracing::info!(id, slug = ?slug, published = body.published, "page updated");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/pages/{id}/cache - Drop a page's cached response.
pub async fn delete_page_cache(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let id = page_id(path)?;
    if let Some(slug) = state.db.get_page_by_id(id).await?.and_then(|p| p.local_slug) {
        state.db.delete_cached_response(&page_key(&slug)).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_slug() {
        assert_eq!(validate_slug("Spring Sale").unwrap_err().to_string(), "slug may not contain ' '");
        assert_eq!(validate_slug("/Promo/Spring.Sale/").unwrap(), "promo/spring-sale");
        assert!(validate_slug("").is_err());
        assert!(validate_slug("promo?x").is_err());
        assert!(validate_slug("---").is_err());
        assert!(validate_slug(&"a".repeat(101)).is_err());
        assert!(validate_slug(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn test_list_params() {
        let query = ListParams::default().into_query().unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.per_page, 10);
        assert_eq!(query.connected, None);

        let params = ListParams { status: StatusFilter::Published, search: Some("  ".into()), ..Default::default() };
        let query = params.into_query().unwrap();
        assert_eq!(query.connected, Some(true));
        assert!(query.search.is_none());

        assert!(ListParams { page: Some(0), ..Default::default() }.into_query().is_err());
        assert!(ListParams { per_page: Some(101), ..Default::default() }.into_query().is_err());
        assert!(ListParams { search: Some("x".repeat(201)), ..Default::default() }.into_query().is_err());
    }
}
