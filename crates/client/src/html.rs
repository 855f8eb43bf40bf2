//! HTML fragment rewrites applied to pages before they reach the visitor.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Identifies pages served through this integration.
pub const SERVING_TAG: &str = r#"<meta name="leadpages-serving-tags" content="wordpress-official">"#;

static HEAD_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</head\s*>").expect("valid regex"));

static SERVING_TAG_PRESENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+name\s*=\s*["']leadpages-serving-tags["']"#).expect("valid regex")
});

static OG_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(<meta\s+property\s*=\s*["']og:url["']\s+content\s*=\s*")[^"]*(")"#).expect("valid regex")
});

/// Insert [`SERVING_TAG`] right before the first `</head>`.
///
/// Bodies that already carry the tag, or that have no `</head>`, are
/// returned unchanged.
pub fn insert_serving_tag(html: &str) -> Cow<'_, str> {
    if SERVING_TAG_PRESENT.is_match(html) {
        return Cow::Borrowed(html);
    }
    match HEAD_CLOSE.find(html) {
        Some(m) => {
            let mut out = String::with_capacity(html.len() + SERVING_TAG.len());
            out.push_str(&html[..m.start()]);
            out.push_str(SERVING_TAG);
            out.push_str(&html[m.start()..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(html),
    }
}

/// Point every `og:url` meta tag at `current_url`.
pub fn rewrite_og_url<'a>(html: &'a str, current_url: &str) -> Cow<'a, str> {
    let escaped = escape_attr(current_url);
    OG_URL.replace_all(html, |caps: &Captures<'_>| format!("{}{}{}", &caps[1], escaped, &caps[2]))
}

/// Escape a value for use inside a double-quoted HTML attribute.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}
