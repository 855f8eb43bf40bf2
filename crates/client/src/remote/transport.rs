//! The HTTP seam between the remote client and the network.
//!
//! [`Transport`] sends one fully-formed request and reports whatever came
//! back; status classification, retries and token refresh live above it in
//! [`RemoteClient`](super::RemoteClient). [`ReqwestTransport`] is the real
//! implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use pagemirror_core::store::ResponseCookie;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use pagemirror_core::Error;

/// A request as the remote client describes it.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    /// Sent as `application/x-www-form-urlencoded` when present.
    pub form: Option<Vec<(String, String)>>,
    pub cookies: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    /// Attach the stored access token and allow one refresh-and-retry.
    pub authorized: bool,
}

impl RemoteRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            form: None,
            cookies: Vec::new(),
            timeout: None,
            authorized: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn form<K: Into<String>, V: Into<String>>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        self.form = Some(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn authorized(mut self) -> Self {
        self.authorized = true;
        self
    }

    /// Copy of this request carrying `Authorization: Bearer <token>`.
    pub(crate) fn with_bearer(&self, token: &str) -> Result<Self, Error> {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Auth("stored access token is not a valid header value".into()))?;
        let mut request = self.clone();
        request.headers.insert(header::AUTHORIZATION, value);
        Ok(request)
    }

    pub fn has_authorization(&self) -> bool {
        self.headers.contains_key(header::AUTHORIZATION)
    }
}

/// Whatever the remote sent back, regardless of status.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: StatusCode,
    /// Final URL after redirects.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RemoteResponse {
    pub fn new(status: StatusCode, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self { status, url: url.into(), headers: HeaderMap::new(), body: Bytes::from(body.into()) }
    }

    /// Builder used mostly by tests; invalid header values are skipped.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::InvalidResponse(format!("{}: {e}", self.url)))
    }

    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Cookies set by the response.
    pub fn cookies(&self) -> Vec<ResponseCookie> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<ResponseCookie> {
        self.cookies().into_iter().find(|c| c.name == name)
    }
}

/// Parse the name, value and `Expires` attribute out of a `Set-Cookie` value.
fn parse_set_cookie(raw: &str) -> Option<ResponseCookie> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let expires = parts.find_map(|attr| {
        let (key, value) = attr.split_once('=')?;
        key.trim().eq_ignore_ascii_case("expires").then(|| value.trim().to_string())
    });

    Some(ResponseCookie { name: name.to_string(), value: value.trim().to_string(), expires })
}

/// No response was received.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Sends a single request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RemoteRequest) -> Result<RemoteResponse, TransportError>;
}

/// [`Transport`] over reqwest.
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Build the underlying HTTP client.
    pub fn new(user_agent: &str) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RemoteRequest) -> Result<RemoteResponse, TransportError> {
        let start = Instant::now();

        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }
        if !request.cookies.is_empty() {
            let cookie = request
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError(format!("request to {} timed out", request.url))
            } else {
                TransportError(format!("network error: {e}"))
            }
        })?;

        let status = response.status();
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(format!("failed to read response: {e}")))?;

        tracing::debug!(
            method = %request.method,
            url = %url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "remote request"
        );

        Ok(RemoteResponse { status, url, headers, body })
    }
}
