//! URL handling for page fetches and inbound request paths.

use url::Url;

/// Error type for URL handling failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Validate a page's published URL before fetching it.
///
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Only http and https are accepted
/// 4. Remove fragment (#...)
/// 5. Keep query string intact
pub fn fetch_target(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Strip the site's base path from an inbound request path.
///
/// With a site at `https://example.com/blog/`, `/blog/promo` becomes `promo`.
/// Paths outside the base are returned without their leading slash.
pub fn site_relative_path<'a>(site_url: &Url, path: &'a str) -> &'a str {
    let base = site_url.path().trim_end_matches('/');
    let relative = path.strip_prefix(base).filter(|rest| rest.is_empty() || rest.starts_with('/')).unwrap_or(path);
    relative.trim_start_matches('/')
}

/// The fully qualified URL of an inbound request.
pub fn current_url(site_url: &Url, path_and_query: &str) -> String {
    let origin = site_url.origin().ascii_serialization();
    if path_and_query.starts_with('/') {
        format!("{origin}{path_and_query}")
    } else {
        format!("{origin}/{path_and_query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_target_basic() {
        let url = fetch_target("https://pages.example.com/promo?x=1#top").unwrap();
        assert_eq!(url.as_str(), "https://pages.example.com/promo?x=1");
    }

    #[test]
    fn test_fetch_target_default_scheme() {
        let url = fetch_target("  pages.example.com/promo ").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_fetch_target_rejects() {
        assert!(matches!(fetch_target(""), Err(UrlError::Empty)));
        assert!(matches!(fetch_target("ftp://example.com"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(fetch_target("https://"), Err(UrlError::InvalidUrl(_))));
    }

    #[test]
    fn test_site_relative_path() {
        let root = Url::parse("https://example.com/").unwrap();
        assert_eq!(site_relative_path(&root, "/promo/"), "promo/");

        let sub = Url::parse("https://example.com/blog/").unwrap();
        assert_eq!(site_relative_path(&sub, "/blog/promo"), "promo");
        assert_eq!(site_relative_path(&sub, "/blog"), "");
        assert_eq!(site_relative_path(&sub, "/blogger/promo"), "blogger/promo");
        assert_eq!(site_relative_path(&sub, "/other"), "other");
    }

    #[test]
    fn test_current_url() {
        let site = Url::parse("https://example.com/blog/").unwrap();
        assert_eq!(current_url(&site, "/blog/promo?a=1"), "https://example.com/blog/promo?a=1");

        let site = Url::parse("http://localhost:8080/").unwrap();
        assert_eq!(current_url(&site, "promo"), "http://localhost:8080/promo");
    }
}
