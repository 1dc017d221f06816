//! Href classification shared by the snapshot analyzer and the extractor.

use url::Url;

use crate::types::LinkType;

/// Classify `href` relative to the page at `base`.
///
/// `#...` is an anchor. Absolute URLs are internal only when they are
/// http(s) and share `base`'s host; any other scheme (`mailto:`, `tel:`) is
/// external. Relative references are internal.
pub fn classify_href(href: &str, base: Option<&Url>) -> LinkType {
    let href = href.trim();
    if href.starts_with('#') {
        return LinkType::Anchor;
    }

    let resolved = match Url::parse(href) {
        Ok(abs) => abs,
        Err(_) if href.starts_with("//") => match base.and_then(|b| b.join(href).ok()) {
            Some(abs) => abs,
            None => return LinkType::External,
        },
        Err(_) => return LinkType::Internal,
    };

    if !matches!(resolved.scheme(), "http" | "https") {
        return LinkType::External;
    }

    match base.and_then(Url::host_str) {
        Some(host) if resolved.host_str() == Some(host) => LinkType::Internal,
        _ => LinkType::External,
    }
}

/// The site-local path an internal href points at, without query or fragment.
///
/// Relative hrefs resolve against `base` (or the site root when there is no
/// base), so dot segments are normalized and the result never climbs above
/// `/`. Returns `None` for hrefs that are not internal.
pub fn internal_path(href: &str, base: Option<&Url>) -> Option<String> {
    if classify_href(href, base) != LinkType::Internal {
        return None;
    }

    let href = href.trim();
    let resolved = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse("http://localhost/").ok()?.join(href).ok()?,
    };

    Some(resolved.path().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/tools").unwrap()
    }

    #[test]
    fn classifies_anchor_external_internal() {
        let base = base();
        assert_eq!(classify_href("#pricing", Some(&base)), LinkType::Anchor);
        assert_eq!(classify_href("/about", Some(&base)), LinkType::Internal);
        assert_eq!(classify_href("docs/start", Some(&base)), LinkType::Internal);
        assert_eq!(
            classify_href("https://example.com/blog", Some(&base)),
            LinkType::Internal
        );
        assert_eq!(
            classify_href("https://github.com/acme", Some(&base)),
            LinkType::External
        );
        assert_eq!(
            classify_href("mailto:hi@example.com", Some(&base)),
            LinkType::External
        );
        assert_eq!(
            classify_href("//cdn.other.net/a.js", Some(&base)),
            LinkType::External
        );
    }

    #[test]
    fn absolute_without_base_is_external() {
        assert_eq!(classify_href("https://example.com/", None), LinkType::External);
        assert_eq!(classify_href("/local", None), LinkType::Internal);
    }

    #[test]
    fn internal_path_strips_query_and_fragment() {
        let base = base();
        assert_eq!(
            internal_path("https://example.com/pricing?plan=pro#faq", Some(&base)).as_deref(),
            Some("/pricing")
        );
        assert_eq!(internal_path("blog?page=2", Some(&base)).as_deref(), Some("/blog"));
        assert_eq!(internal_path("https://github.com/x", Some(&base)), None);
        assert_eq!(internal_path("#top", Some(&base)), None);
    }

    #[test]
    fn relative_hrefs_resolve_against_the_page() {
        let page = Url::parse("https://example.com/tools/notion").unwrap();
        assert_eq!(
            internal_path("pricing", Some(&page)).as_deref(),
            Some("/tools/pricing")
        );
        assert_eq!(
            internal_path("./coda?ref=nav", Some(&page)).as_deref(),
            Some("/tools/coda")
        );
        assert_eq!(
            internal_path("../categories/productivity", Some(&page)).as_deref(),
            Some("/categories/productivity")
        );
    }

    #[test]
    fn dot_segments_never_climb_above_root() {
        let page = Url::parse("https://example.com/tools/notion").unwrap();
        assert_eq!(
            internal_path("../../escape", Some(&page)).as_deref(),
            Some("/escape")
        );
        assert_eq!(
            internal_path("/a/../../../escape", Some(&page)).as_deref(),
            Some("/escape")
        );
        assert_eq!(internal_path("../../escape", None).as_deref(), Some("/escape"));
        assert_eq!(internal_path("docs/start", None).as_deref(), Some("/docs/start"));
    }
}
