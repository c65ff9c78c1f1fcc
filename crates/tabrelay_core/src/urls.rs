use url::Url;

/// Canonical form used for the visited set: parsed, fragment dropped.
///
/// Scheme and host are lowercased and default ports removed by the parser.
/// Strings that do not parse as absolute URLs are kept trimmed as-is so they
/// still dedupe against themselves.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.into()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// Host (with port if non-default) of an absolute URL.
pub fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

/// Resolve a link reported by the agent against the page it came from.
///
/// Fragment-only, query-only and `javascript:` references are dropped, as are
/// non-http(s) schemes such as `mailto:`.
pub fn resolve_link(reference: &str, page_url: Option<&str>) -> Option<String> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#') || lower.starts_with('?') || lower.starts_with("javascript:") {
        return None;
    }
    let resolved = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => page_url
            .and_then(|base| Url::parse(base).ok())
            .and_then(|base| base.join(trimmed).ok())?,
    };
    match resolved.scheme() {
        "http" | "https" => Some(resolved.into()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_fragment_and_lowercases_host() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/a?b=1#top"),
            "https://example.com/a?b=1"
        );
        assert_eq!(normalize_url("https://example.com"), "https://example.com/");
    }

    #[test]
    fn normalize_keeps_unparsable_input() {
        assert_eq!(normalize_url("  not a url "), "not a url");
    }

    #[test]
    fn host_includes_non_default_port() {
        assert_eq!(host_of("http://127.0.0.1:8080/x").as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(host_of("https://a.example.com:443/").as_deref(), Some("a.example.com"));
        assert_eq!(host_of("nope"), None);
    }

    #[test]
    fn relative_links_resolve_against_page() {
        assert_eq!(
            resolve_link("./b", Some("https://example.com/docs/a")).as_deref(),
            Some("https://example.com/docs/b")
        );
        assert_eq!(resolve_link("#top", Some("https://example.com/")), None);
        assert_eq!(resolve_link("mailto:x@example.com", None), None);
        assert_eq!(resolve_link("/rel", None), None);
    }
}
