//! Proxy engine: serves mirrored pages under their local slugs.
//!
//! ### Per-request flow (GET only)
//! 1. Derive the candidate slug from the site-relative path
//! 2. Cache hit: render the cached response
//! 3. Otherwise look up a servable page by local slug; none means pass through
//! 4. Fetch the published URL (one retry on 5xx), forwarding the `variation` cookie
//! 5. Cache the raw response unless the page is a split-test root, then render it
//!
//! Rendering inserts the serving tag and points `og:url` at the current URL.
//! Any internal failure degrades to pass-through.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use pagemirror_client::html::{insert_serving_tag, rewrite_og_url};
use pagemirror_client::url::{current_url, fetch_target, site_relative_path};
use pagemirror_client::{Outcome, RemoteClient, RemoteError, RemoteRequest, RemoteResponse};
use pagemirror_core::slug::candidate_slug;
use pagemirror_core::store::{CachedResponse, ResponseCookie};
use pagemirror_core::{AppConfig, Db, Error, PageRecord, page_key};
use url::Url;

use crate::interceptor::{InboundRequest, Interception, Interceptor};

/// Cookie pinning a visitor to a split-test bucket.
pub const VARIATION_COOKIE: &str = "variation";

const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// A page ready to send to the visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedPage {
    pub status: u16,
    pub content_type: Option<String>,
    pub variation: Option<ResponseCookie>,
    pub body: String,
}

impl IntoResponse for ServedPage {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let content_type = self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);

        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        if let Some(cookie) = self.variation {
            let mut raw = format!("{}={}; Path=/", cookie.name, cookie.value);
            if let Some(expires) = cookie.expires {
                raw.push_str(&format!("; Expires={expires}"));
            }
            if let Ok(value) = HeaderValue::from_str(&raw) {
                headers.append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

/// Terminal state of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// Not ours; pass through untouched.
    Unmatched,
    CacheHit(ServedPage),
    Fetched(ServedPage),
    /// A servable page exists but could not be fetched; pass through.
    FetchFailed,
}

/// Serves mirrored pages.
#[derive(Clone)]
pub struct ProxyEngine {
    db: Db,
    client: RemoteClient,
    site_url: Url,
    cache_ttl: Duration,
    fetch_timeout: Duration,
}

impl ProxyEngine {
    pub fn new(db: Db, client: RemoteClient, config: &AppConfig) -> Result<Self, Error> {
        let site_url = Url::parse(&config.site_url).map_err(|e| Error::Validation(format!("invalid site_url: {e}")))?;
        Ok(Self {
            db,
            client,
            site_url,
            cache_ttl: config.cache_ttl(),
            fetch_timeout: config.page_fetch_timeout(),
        })
    }

    /// Handle one inbound request.
    pub async fn serve(&self, request: &InboundRequest) -> ProxyOutcome {
        if request.method != Method::GET {
            return ProxyOutcome::Unmatched;
        }

        let start = Instant::now();
        let outcome = match self.resolve(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(error = %e, path = request.path(), "proxy failed, passing through");
                ProxyOutcome::Unmatched
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            ProxyOutcome::CacheHit(_) => tracing::debug!(path = request.path(), elapsed_ms, "served page from cache"),
            ProxyOutcome::Fetched(_) => tracing::debug!(path = request.path(), elapsed_ms, "served page from remote"),
            ProxyOutcome::FetchFailed => tracing::debug!(path = request.path(), elapsed_ms, "page fetch failed"),
            ProxyOutcome::Unmatched => {}
        }
        outcome
    }

    async fn resolve(&self, request: &InboundRequest) -> Result<ProxyOutcome, Error> {
        let permalink = self.db.permalink_structure().await?;
        let slug = candidate_slug(site_relative_path(&self.site_url, request.path()), &permalink);
        if slug.is_empty() {
            return Ok(ProxyOutcome::Unmatched);
        }

        let key = page_key(&slug);
        if let Some(cached) = self.db.get_cached_response(&key).await? {
            return Ok(ProxyOutcome::CacheHit(self.render(cached, request)));
        }

        let Some(page) = self.db.get_page_by_local_slug(&slug).await?.filter(PageRecord::is_servable) else {
            tracing::debug!(slug, "no servable page");
            return Ok(ProxyOutcome::Unmatched);
        };
        let Some(target) = page.published_url.as_deref() else {
            tracing::debug!(slug, uuid = page.uuid.as_str(), "page has no published url");
            return Ok(ProxyOutcome::Unmatched);
        };
        let target = fetch_target(target).map_err(|e| Error::Validation(e.to_string()))?;

        tracing::debug!(slug, target = %target, "proxying page");
        let Some(fetched) = self.fetch(target.as_str(), request.cookie(VARIATION_COOKIE)).await? else {
            return Ok(ProxyOutcome::FetchFailed);
        };
        let fetched = cached_response(&fetched);

        if page.is_cacheable()
            && let Err(e) = self.db.set_cached_response(&key, &fetched, self.cache_ttl).await
        {
            tracing::warn!(error = %e, slug, "failed to cache page");
        }

        Ok(ProxyOutcome::Fetched(self.render(fetched, request)))
    }

    /// GET the published page, retrying once on a server error.
    ///
    /// A remote 404 is a renderable response; every other failure is `None`.
    async fn fetch(&self, url: &str, variation: Option<String>) -> Result<Option<RemoteResponse>, Error> {
        let mut request = RemoteRequest::get(url).timeout(self.fetch_timeout);
        if let Some(variation) = variation {
            request = request.cookie(VARIATION_COOKIE, variation);
        }

        for attempt in 0..2 {
            match self.client.request(request.clone()).await? {
                Outcome::Success(response) | Outcome::Failed(RemoteError::NotFound(response)) => {
                    return Ok(Some(response));
                }
                Outcome::Failed(e) if e.is_server() && attempt == 0 => {
                    tracing::debug!(error = %e, url, "page fetch failed, retrying");
                }
                Outcome::Failed(e) => {
                    tracing::debug!(error = %e, url, "page fetch failed");
                    return Ok(None);
                }
                Outcome::NeedsReauth => return Ok(None),
            }
        }
        Ok(None)
    }

    fn render(&self, cached: CachedResponse, request: &InboundRequest) -> ServedPage {
        let url = current_url(&self.site_url, request.path_and_query());
        let tagged = insert_serving_tag(&cached.body);
        let body = rewrite_og_url(&tagged, &url).into_owned();
        let variation = cached.cookie(VARIATION_COOKIE).cloned();

        ServedPage { status: cached.status, content_type: cached.content_type, variation, body }
    }
}

fn cached_response(response: &RemoteResponse) -> CachedResponse {
    CachedResponse {
        status: response.status.as_u16(),
        content_type: response.content_type(),
        cookies: response.cookies(),
        body: response.text(),
    }
}

#[async_trait]
impl Interceptor for ProxyEngine {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn intercept(&self, request: &InboundRequest) -> Interception {
        match self.serve(request).await {
            ProxyOutcome::CacheHit(page) | ProxyOutcome::Fetched(page) => Interception::Respond(page.into_response()),
            ProxyOutcome::Unmatched | ProxyOutcome::FetchFailed => Interception::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Uri};
    use pagemirror_client::html::SERVING_TAG;
    use pagemirror_client::testing::ScriptedTransport;
    use pagemirror_core::store::{LocalFields, OptionKey, PageKind, PageRef, PageUpdate, RemoteFields};
    use std::sync::Arc;

    const PAGE_HTML: &str =
        r#"<html><head><meta property="og:url" content="https://pages.example.com/promo"></head><body>hi</body></html>"#;

    struct Fixture {
        db: Db,
        transport: Arc<ScriptedTransport>,
        engine: ProxyEngine,
    }

    async fn fixture() -> Fixture {
        let db = Db::open_in_memory().await.unwrap();
        db.set_option(OptionKey::PermalinkStructure, "/%postname%/").await.unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let config = AppConfig { site_url: "https://example.com/".into(), ..Default::default() };
        let client = RemoteClient::new(transport.clone(), db.clone(), &config);
        let engine = ProxyEngine::new(db.clone(), client, &config).unwrap();
        Fixture { db, transport, engine }
    }

    async fn connected_page(db: &Db, uuid: &str, slug: &str, kind: PageKind) -> i64 {
        let fields = RemoteFields {
            uuid: uuid.into(),
            name: format!("Page {uuid}"),
            published_url: Some(format!("https://pages.example.com/{uuid}")),
            remote_slug: uuid.into(),
            current_edition: Some("v3".into()),
            kind: Some(kind),
            ..Default::default()
        };
        let id = db.create_page(&fields).await.unwrap();
        db.update_page(
            PageRef::Id(id),
            PageUpdate::Local(LocalFields { local_slug: Some(slug.into()), connected: true, page_type: None }),
        )
        .await
        .unwrap();
        id
    }

    fn get(uri: &'static str) -> InboundRequest {
        InboundRequest::new(Method::GET, Uri::from_static(uri), HeaderMap::new())
    }

    #[tokio::test]
    async fn test_unknown_slug_passes_through() {
        let f = fixture().await;
        assert_eq!(f.engine.serve(&get("/nothing-here")).await, ProxyOutcome::Unmatched);
        assert_eq!(f.transport.request_count(), 0);
        assert!(f.db.get_cached_response(&page_key("nothing-here")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let f = fixture().await;
        connected_page(&f.db, "abc", "promo", PageKind::Standard).await;
        let request = InboundRequest::new(Method::POST, Uri::from_static("/promo"), HeaderMap::new());
        assert_eq!(f.engine.serve(&request).await, ProxyOutcome::Unmatched);
        assert_eq!(f.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_root_passes_through() {
        let f = fixture().await;
        assert_eq!(f.engine.serve(&get("/")).await, ProxyOutcome::Unmatched);
    }

    #[tokio::test]
    async fn test_cache_hit_does_not_fetch() {
        let f = fixture().await;
        connected_page(&f.db, "abc", "promo", PageKind::Standard).await;
        let cached = CachedResponse {
            status: 200,
            content_type: None,
            cookies: Vec::new(),
            body: "<html><head></head><body>cached</body></html>".into(),
        };
        f.db.set_cached_response(&page_key("promo"), &cached, Duration::from_secs(60)).await.unwrap();

        let ProxyOutcome::CacheHit(page) = f.engine.serve(&get("/promo")).await else {
            panic!("expected a cache hit");
        };
        assert_eq!(page.status, 200);
        assert_eq!(page.body, format!("<html><head>{SERVING_TAG}</head><body>cached</body></html>"));
        assert_eq!(f.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_then_cache() {
        let f = fixture().await;
        connected_page(&f.db, "abc", "promo", PageKind::Standard).await;
        f.transport.respond(200, PAGE_HTML);

        let ProxyOutcome::Fetched(first) = f.engine.serve(&get("/promo/?utm=1")).await else {
            panic!("expected a fetch");
        };
        assert!(first.body.contains(SERVING_TAG));
        assert!(first.body.contains(r#"content="https://example.com/promo/?utm=1""#));

        let cached = f.db.get_cached_response(&page_key("promo")).await.unwrap().unwrap();
        assert_eq!(cached.body, PAGE_HTML);

        let ProxyOutcome::CacheHit(second) = f.engine.serve(&get("/promo/?utm=1")).await else {
            panic!("expected a cache hit");
        };
        assert_eq!(second.body, first.body);
        assert_eq!(f.transport.request_count(), 1);
        assert_eq!(f.transport.requests()[0].url, "https://pages.example.com/abc");
    }

    #[tokio::test]
    async fn test_split_test_root_never_cached() {
        let f = fixture().await;
        connected_page(&f.db, "root", "ab-test", PageKind::SplitTestRoot).await;
        f.transport.respond(200, PAGE_HTML).respond(200, PAGE_HTML);

        assert!(matches!(f.engine.serve(&get("/ab-test")).await, ProxyOutcome::Fetched(_)));
        assert!(matches!(f.engine.serve(&get("/ab-test")).await, ProxyOutcome::Fetched(_)));
        assert!(f.db.get_cached_response(&page_key("ab-test")).await.unwrap().is_none());
        assert_eq!(f.transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_variation_cookie_round_trip() {
        let f = fixture().await;
        connected_page(&f.db, "root", "ab-test", PageKind::SplitTestRoot).await;
        f.transport.push(
            RemoteResponse::new(StatusCode::OK, "", PAGE_HTML)
                .with_header(header::SET_COOKIE, "variation=bucket-b; Expires=Wed, 21 Oct 2026 07:28:00 GMT"),
        );

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("variation=bucket-a; other=1"));
        let request = InboundRequest::new(Method::GET, Uri::from_static("/ab-test"), headers);

        let ProxyOutcome::Fetched(page) = f.engine.serve(&request).await else {
            panic!("expected a fetch");
        };
        assert_eq!(
            f.transport.requests()[0].cookies,
            vec![(VARIATION_COOKIE.to_string(), "bucket-a".to_string())]
        );
        assert_eq!(page.variation.as_ref().map(|c| c.value.as_str()), Some("bucket-b"));

        let response = page.into_response();
        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("variation=bucket-b; Path=/"));
        assert!(set_cookie.contains("Expires=Wed, 21 Oct 2026 07:28:00 GMT"));
    }

    #[tokio::test]
    async fn test_server_error_retried_once() {
        let f = fixture().await;
        connected_page(&f.db, "abc", "promo", PageKind::Standard).await;
        f.transport.respond(503, "").respond(200, PAGE_HTML);

        assert!(matches!(f.engine.serve(&get("/promo")).await, ProxyOutcome::Fetched(_)));
        assert_eq!(f.transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_passes_through() {
        let f = fixture().await;
        connected_page(&f.db, "abc", "promo", PageKind::Standard).await;
        f.transport.respond(500, "").respond(502, "");

        assert_eq!(f.engine.serve(&get("/promo")).await, ProxyOutcome::FetchFailed);
        assert_eq!(f.transport.request_count(), 2);
        assert!(f.db.get_cached_response(&page_key("promo")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let f = fixture().await;
        connected_page(&f.db, "abc", "promo", PageKind::Standard).await;
        f.transport.respond(410, "gone");

        assert_eq!(f.engine.serve(&get("/promo")).await, ProxyOutcome::FetchFailed);
        assert_eq!(f.transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_remote_not_found_is_rendered() {
        let f = fixture().await;
        connected_page(&f.db, "abc", "promo", PageKind::Standard).await;
        f.transport.respond(404, "<html><head></head>missing</html>");

        let ProxyOutcome::Fetched(page) = f.engine.serve(&get("/promo")).await else {
            panic!("expected the 404 page to be rendered");
        };
        assert_eq!(page.status, 404);
        assert!(page.body.contains(SERVING_TAG));
    }

    #[tokio::test]
    async fn test_disconnected_or_unpublished_not_served() {
        let f = fixture().await;
        let id = connected_page(&f.db, "abc", "promo", PageKind::Standard).await;
        f.db.update_page(
            PageRef::Id(id),
            PageUpdate::Local(LocalFields { local_slug: Some("promo".into()), connected: false, page_type: None }),
        )
        .await
        .unwrap();
        assert_eq!(f.engine.serve(&get("/promo")).await, ProxyOutcome::Unmatched);

        let id = connected_page(&f.db, "draft", "draft", PageKind::Standard).await;
        let mut fields = RemoteFields { uuid: "draft".into(), current_edition: None, ..Default::default() };
        fields.published_url = Some("https://pages.example.com/draft".into());
        f.db.update_page(PageRef::Id(id), PageUpdate::Remote(fields)).await.unwrap();
        assert_eq!(f.engine.serve(&get("/draft")).await, ProxyOutcome::Unmatched);

        assert_eq!(f.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_percent_encoded_unicode_slug_is_served() {
        let f = fixture().await;
        connected_page(&f.db, "abc", "café", PageKind::Standard).await;
        f.transport.respond(200, PAGE_HTML);

        assert!(matches!(f.engine.serve(&get("/caf%C3%A9")).await, ProxyOutcome::Fetched(_)));
        assert!(f.db.get_cached_response(&page_key("café")).await.unwrap().is_some());
        assert!(matches!(f.engine.serve(&get("/caf%C3%A9/")).await, ProxyOutcome::CacheHit(_)));
        assert_eq!(f.transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_path_passes_through() {
        let f = fixture().await;
        connected_page(&f.db, "abc", "promo", PageKind::Standard).await;
        assert_eq!(f.engine.serve(&get("/promo%FF")).await, ProxyOutcome::Unmatched);
        assert_eq!(f.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_permalink_literals_are_stripped() {
        let f = fixture().await;
        f.db.set_option(OptionKey::PermalinkStructure, "/blog/%postname%/").await.unwrap();
        connected_page(&f.db, "abc", "promo", PageKind::Standard).await;
        f.transport.respond(200, PAGE_HTML);

        assert!(matches!(f.engine.serve(&get("/blog/promo")).await, ProxyOutcome::Fetched(_)));
    }
}
