use url::Url;

/// Canonicalizes a raw href into an absolute, comparable URL string
///
/// # Canonicalization Steps
///
/// 1. Trim surrounding whitespace; reject if empty
/// 2. Resolve against the base URL when one is given, otherwise parse as
///    absolute (dot segments are collapsed during resolution)
/// 3. Reject anything that is not http or https (mailto:, javascript:, ...)
/// 4. Reject URLs without a host
/// 5. Lowercase scheme and host, drop default ports
/// 6. Remove the fragment
/// 7. Sort query parameters by key, then value
/// 8. Remove an empty query string (trailing ?)
///
/// Returns `None` for anything unresolvable or out of scheme; callers drop
/// such links silently.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use orbweaver::url::canonicalize;
///
/// let base = Url::parse("https://example.com/dir/page.html").unwrap();
/// assert_eq!(
///     canonicalize("other.html#top", Some(&base)),
///     Some("https://example.com/dir/other.html".to_string())
/// );
/// assert_eq!(canonicalize("mailto:me@example.com", Some(&base)), None);
/// ```
pub fn canonicalize(href: &str, base: Option<&Url>) -> Option<String> {
    let trimmed = href.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut url = match base {
        Some(base) => base.join(trimmed).ok()?,
        None => Url::parse(trimmed).ok()?,
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.host_str()?;

    url.set_fragment(None);
    normalize_query(&mut url);

    Some(url.into())
}

/// Sorts query pairs for stable comparison and drops an empty query
fn normalize_query(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
        return;
    }

    pairs.sort();
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        query.append_pair(key, value);
    }
    url.set_query(Some(&query.finish()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://a.test/dir/page.html").unwrap()
    }

    #[test]
    fn test_absolute_url_without_base() {
        assert_eq!(
            canonicalize("https://b.test/x", None),
            Some("https://b.test/x".to_string())
        );
    }

    #[test]
    fn test_relative_without_base_is_rejected() {
        assert_eq!(canonicalize("other.html", None), None);
    }

    #[test]
    fn test_relative_resolution() {
        assert_eq!(
            canonicalize("other.html", Some(&base())),
            Some("https://a.test/dir/other.html".to_string())
        );
    }

    #[test]
    fn test_parent_relative_resolution() {
        assert_eq!(
            canonicalize("../up.html", Some(&base())),
            Some("https://a.test/up.html".to_string())
        );
    }

    #[test]
    fn test_protocol_relative() {
        assert_eq!(
            canonicalize("//cdn.test/lib.js", Some(&base())),
            Some("https://cdn.test/lib.js".to_string())
        );
    }

    #[test]
    fn test_fragment_removed() {
        assert_eq!(
            canonicalize("https://a.test/page#section-2", None),
            Some("https://a.test/page".to_string())
        );
    }

    #[test]
    fn test_fragment_only_href_resolves_to_base() {
        assert_eq!(
            canonicalize("#top", Some(&base())),
            Some("https://a.test/dir/page.html".to_string())
        );
    }

    #[test]
    fn test_non_http_schemes_rejected() {
        assert_eq!(canonicalize("mailto:me@a.test", Some(&base())), None);
        assert_eq!(canonicalize("javascript:void(0)", Some(&base())), None);
        assert_eq!(canonicalize("ftp://a.test/file", None), None);
        assert_eq!(canonicalize("tel:+15551234", Some(&base())), None);
    }

    #[test]
    fn test_empty_and_whitespace_rejected() {
        assert_eq!(canonicalize("", Some(&base())), None);
        assert_eq!(canonicalize("   ", Some(&base())), None);
    }

    #[test]
    fn test_host_lowercased() {
        assert_eq!(
            canonicalize("HTTP://WWW.A.TEST/Path", None),
            Some("http://www.a.test/Path".to_string())
        );
    }

    #[test]
    fn test_default_port_dropped() {
        assert_eq!(
            canonicalize("http://a.test:80/x", None),
            Some("http://a.test/x".to_string())
        );
        assert_eq!(
            canonicalize("https://a.test:443/x", None),
            Some("https://a.test/x".to_string())
        );
    }

    #[test]
    fn test_explicit_port_kept() {
        assert_eq!(
            canonicalize("http://a.test:8080/x", None),
            Some("http://a.test:8080/x".to_string())
        );
    }

    #[test]
    fn test_query_sorted() {
        assert_eq!(
            canonicalize("https://a.test/p?b=2&a=1&c=3", None),
            Some("https://a.test/p?a=1&b=2&c=3".to_string())
        );
    }

    #[test]
    fn test_empty_query_dropped() {
        assert_eq!(
            canonicalize("https://a.test/p?", None),
            Some("https://a.test/p".to_string())
        );
    }

    #[test]
    fn test_dot_segments_collapsed() {
        assert_eq!(
            canonicalize("https://a.test/a/./b/../c", None),
            Some("https://a.test/a/c".to_string())
        );
    }

    #[test]
    fn test_empty_path_becomes_root() {
        assert_eq!(
            canonicalize("https://a.test", None),
            Some("https://a.test/".to_string())
        );
    }

    #[test]
    fn test_trailing_slash_preserved() {
        assert_eq!(
            canonicalize("https://a.test/dir/", None),
            Some("https://a.test/dir/".to_string())
        );
    }

    #[test]
    fn test_surrounding_whitespace_trimmed() {
        assert_eq!(
            canonicalize("  https://a.test/x  ", None),
            Some("https://a.test/x".to_string())
        );
    }
}
