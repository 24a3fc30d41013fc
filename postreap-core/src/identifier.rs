//! Candidate identifier normalization
//!
//! Turns a raw href as it appears in the page into the key used for
//! deduplication:
//! - surrounding whitespace is trimmed; inner whitespace is kept
//! - relative links get the site origin prefixed
//! - everything from the first `?` on is dropped
//! - the result is compared byte-for-byte (no case folding, no slash rules)

/// Normalize a raw link against `origin`.
///
/// Never fails: any input produces some string, even an empty one.
pub fn normalize(raw: &str, origin: &str) -> String {
    let raw = raw.trim();
    let origin = origin.trim_end_matches('/');

    let absolute = if has_scheme(raw) {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("//") {
        format!("{}://{}", scheme_of(origin), rest)
    } else if raw.starts_with('/') {
        format!("{}{}", origin, raw)
    } else {
        format!("{}/{}", origin, raw)
    };

    strip_query(&absolute).to_string()
}

/// Drop the query string (and anything after it)
pub fn strip_query(url: &str) -> &str {
    match url.find('?') {
        Some(idx) => &url[..idx],
        None => url,
    }
}

/// True if `s` starts with `scheme://`
fn has_scheme(s: &str) -> bool {
    let Some(idx) = s.find("://") else {
        return false;
    };
    let scheme = &s[..idx];

    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn scheme_of(origin: &str) -> &str {
    match origin.find("://") {
        Some(idx) if has_scheme(origin) => &origin[..idx],
        _ => "https",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://example.com";

    #[test]
    fn test_relative_link_gets_origin() {
        assert_eq!(
            normalize("/posts/123?utm=x", ORIGIN),
            "https://example.com/posts/123"
        );
    }

    #[test]
    fn test_absolute_link_loses_query() {
        assert_eq!(
            normalize("https://example.com/posts/123?x=1", ORIGIN),
            "https://example.com/posts/123"
        );
    }

    #[test]
    fn test_no_case_or_slash_folding() {
        let a = normalize("/Posts/1/", ORIGIN);
        let b = normalize("/posts/1", ORIGIN);
        assert_eq!(a, "https://example.com/Posts/1/");
        assert_ne!(a, b);
    }

    #[test]
    fn test_bare_path_and_protocol_relative() {
        assert_eq!(normalize("feed/update/9", ORIGIN), "https://example.com/feed/update/9");
        assert_eq!(
            normalize("//cdn.example.com/posts/5?a=b", "http://example.com/"),
            "http://cdn.example.com/posts/5"
        );
    }

    #[test]
    fn test_trailing_origin_slash_is_ignored() {
        assert_eq!(normalize("/posts/7", "https://example.com/"), "https://example.com/posts/7");
    }

    #[test]
    fn test_scheme_detection() {
        assert!(has_scheme("https://a"));
        assert!(has_scheme("git+ssh://a"));
        assert!(!has_scheme("/redirect?to=https://a"));
        assert!(!has_scheme("1http://a"));
        assert_eq!(
            normalize("/redirect?to=https://a", ORIGIN),
            "https://example.com/redirect"
        );
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        assert_eq!(
            normalize("\n  /posts/123?utm=x \t", ORIGIN),
            normalize("/posts/123", ORIGIN)
        );
        assert_eq!(
            normalize(" https://example.com/posts/9 ", ORIGIN),
            "https://example.com/posts/9"
        );
        assert_eq!(normalize("/posts/a b", ORIGIN), "https://example.com/posts/a b");
    }

    #[test]
    fn test_total_on_odd_input() {
        assert_eq!(normalize("", ORIGIN), "https://example.com/");
        assert_eq!(normalize("?only=query", ORIGIN), "https://example.com/");
    }
}
