//! Priority-ordered request interceptors.
//!
//! Interceptors run before the site's own handlers. The first one that
//! answers with [`Interception::Respond`] owns the response and nothing after
//! it runs; when every interceptor continues, the request reaches the next
//! handler untouched.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, Uri, header};
use axum::middleware::Next;
use axum::response::Response;

/// The parts of an inbound request interceptors may inspect.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl InboundRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self { method, uri, headers }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn path_and_query(&self) -> &str {
        self.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    }

    /// Value of a request cookie.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }
}

/// What an interceptor decided.
pub enum Interception {
    /// Let the request continue down the chain.
    Continue,
    /// Answer the request; later interceptors and handlers do not run.
    Respond(Response),
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs earlier.
    fn priority(&self) -> i32 {
        100
    }

    async fn intercept(&self, request: &InboundRequest) -> Interception;
}

/// Interceptors sorted by priority. Cheap to clone.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interceptor. Equal priorities keep registration order.
    pub fn with(self, interceptor: Arc<dyn Interceptor>) -> Self {
        let mut interceptors: Vec<_> = self.interceptors.iter().cloned().collect();
        interceptors.push(interceptor);
        interceptors.sort_by_key(|i| i.priority());
        Self { interceptors: Arc::new(interceptors) }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run the chain; `Some` when an interceptor answered.
    pub async fn run(&self, request: &InboundRequest) -> Option<Response> {
        for interceptor in self.interceptors.iter() {
            if let Interception::Respond(response) = interceptor.intercept(request).await {
                tracing::debug!(interceptor = interceptor.name(), path = request.path(), "request intercepted");
                return Some(response);
            }
        }
        None
    }
}

/// axum middleware running the chain in front of the wrapped handlers.
pub async fn intercept(State(chain): State<InterceptorChain>, request: Request, next: Next) -> Response {
    let inbound = InboundRequest::new(request.method().clone(), request.uri().clone(), request.headers().clone());

    match chain.run(&inbound).await {
        Some(response) => response,
        None => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request as HttpRequest, StatusCode};
    use axum::middleware;
    use axum::response::IntoResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct Fixed {
        name: &'static str,
        priority: i32,
        path: &'static str,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, priority: i32, path: &'static str) -> Arc<Self> {
            Arc::new(Self { name, priority, path, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl Interceptor for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn intercept(&self, request: &InboundRequest) -> Interception {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.path() == self.path {
                Interception::Respond((StatusCode::OK, self.name).into_response())
            } else {
                Interception::Continue
            }
        }
    }

    fn app(chain: InterceptorChain) -> Router {
        Router::new()
            .fallback(|| async { (StatusCode::NOT_FOUND, "host") })
            .layer(middleware::from_fn_with_state(chain, intercept))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_lower_priority_runs_first() {
        let late = Fixed::new("late", 50, "/promo");
        let early = Fixed::new("early", 10, "/promo");
        let chain = InterceptorChain::new().with(late.clone()).with(early.clone());

        let request = HttpRequest::builder().uri("/promo").body(Body::empty()).unwrap();
        let response = app(chain).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "early");
        assert_eq!(early.calls.load(Ordering::SeqCst), 1);
        assert_eq!(late.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pass_through_reaches_host() {
        let only = Fixed::new("only", 10, "/promo");
        let chain = InterceptorChain::new().with(only.clone());

        let request = HttpRequest::builder().uri("/about").body(Body::empty()).unwrap();
        let response = app(chain).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "host");
        assert_eq!(only.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; variation=xyz"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2"));
        let request = InboundRequest::new(Method::GET, Uri::from_static("/promo?x=1"), headers);

        assert_eq!(request.cookie("variation").as_deref(), Some("xyz"));
        assert_eq!(request.cookie("b").as_deref(), Some("2"));
        assert!(request.cookie("missing").is_none());
        assert_eq!(request.path_and_query(), "/promo?x=1");
    }
}
