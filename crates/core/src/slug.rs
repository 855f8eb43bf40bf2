//! Slug normalization shared by inbound request matching, admin slug
//! assignment and local-slug lookups.
//!
//! A slug is a `/`-joined list of segments. Each segment is lowercased,
//! `.` and whitespace become `-`, anything outside `[a-z0-9_-]` (or a
//! non-ASCII alphanumeric) is dropped, and runs of dashes collapse.

use percent_encoding::percent_decode_str;

/// Normalize a single path segment.
pub fn normalize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut last_dash = true;

    for ch in segment.chars().flat_map(char::to_lowercase) {
        let mapped = match ch {
            'a'..='z' | '0'..='9' | '_' => Some(ch),
            '-' | '.' => Some('-'),
            c if c.is_whitespace() => Some('-'),
            c if !c.is_ascii() && c.is_alphanumeric() => Some(c),
            _ => None,
        };

        match mapped {
            Some('-') if last_dash => {}
            Some('-') => {
                out.push('-');
                last_dash = true;
            }
            Some(c) => {
                out.push(c);
                last_dash = false;
            }
            None => {}
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    out
}

/// Normalize a full slug, segment by segment, dropping empty segments.
pub fn normalize_slug(slug: &str) -> String {
    slug.split('/')
        .map(normalize_segment)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Literal segments of a permalink structure template.
///
/// Segments containing a `%placeholder%` token are excluded, as are empty
/// segments; what remains are the fixed path parts the host inserts in front
/// of its own content (for example `blog` in `/blog/%postname%/`).
pub fn permalink_literals(structure: &str) -> Vec<&str> {
    structure
        .split('/')
        .filter(|s| !s.is_empty() && !s.contains('%'))
        .collect()
}

/// Derive the candidate serving slug from a site-relative request path.
///
/// The query string is discarded and each segment is percent-decoded.
/// Segments that literally appear in the permalink template are removed, and
/// the rest are normalized and rejoined. A segment that does not decode to
/// UTF-8 yields an empty slug, which matches no page.
pub fn candidate_slug(path: &str, permalink_structure: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let literals = permalink_literals(permalink_structure);

    let mut segments = Vec::new();
    for token in path.split('/') {
        let Ok(token) = percent_decode_str(token).decode_utf8() else {
            return String::new();
        };
        if literals.contains(&token.as_ref()) {
            continue;
        }
        let segment = normalize_segment(&token);
        if !segment.is_empty() {
            segments.push(segment);
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_segment_basic() {
        assert_eq!(normalize_segment("Promo"), "promo");
        assert_eq!(normalize_segment("Summer Sale 2024"), "summer-sale-2024");
        assert_eq!(normalize_segment("v1.2"), "v1-2");
        assert_eq!(normalize_segment("--a---b--"), "a-b");
        assert_eq!(normalize_segment("what?!"), "what");
        assert_eq!(normalize_segment("snake_case"), "snake_case");
    }

    #[test]
    fn test_normalize_segment_unicode() {
        assert_eq!(normalize_segment("Café"), "café");
        assert_eq!(normalize_segment("***"), "");
    }

    #[test]
    fn test_normalize_slug_keeps_segments() {
        assert_eq!(normalize_slug("/Offers/Spring Deal/"), "offers/spring-deal");
        assert_eq!(normalize_slug("a//b"), "a/b");
        assert_eq!(normalize_slug(""), "");
    }

    #[test]
    fn test_permalink_literals() {
        assert_eq!(permalink_literals("/blog/%postname%/"), vec!["blog"]);
        assert_eq!(permalink_literals("/%year%/%monthnum%/%postname%/"), Vec::<&str>::new());
        assert_eq!(permalink_literals("/archives/%post_id%"), vec!["archives"]);
        assert!(permalink_literals("").is_empty());
    }

    #[test]
    fn test_candidate_slug_strips_query_and_literals() {
        assert_eq!(candidate_slug("/promo", "/%postname%/"), "promo");
        assert_eq!(candidate_slug("/promo/?utm_source=x", "/%postname%/"), "promo");
        assert_eq!(candidate_slug("/blog/promo/", "/blog/%postname%/"), "promo");
        assert_eq!(candidate_slug("/Deals/Big Sale", "/%postname%/"), "deals/big-sale");
    }

    #[test]
    fn test_candidate_slug_placeholder_segments_are_not_stripped() {
        assert_eq!(candidate_slug("/%postname%/promo", "/%postname%/"), "postname/promo");
    }

    #[test]
    fn test_candidate_slug_decodes_segments() {
        assert_eq!(candidate_slug("/caf%C3%A9", "/%postname%/"), "café");
        assert_eq!(candidate_slug("/Spring%20Sale/", "/%postname%/"), "spring-sale");
        assert_eq!(candidate_slug("/bl%6Fg/promo", "/blog/%postname%/"), "promo");
        assert_eq!(candidate_slug("/promo%FF", "/%postname%/"), "");
    }

    #[test]
    fn test_candidate_slug_empty() {
        assert_eq!(candidate_slug("/", "/%postname%/"), "");
        assert_eq!(candidate_slug("", ""), "");
    }
}
