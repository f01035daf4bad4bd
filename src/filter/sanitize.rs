//! Sanitization of extracted URLs for one item

use crate::config::AssetsConfig;
use crate::urls::normalize;
use crate::util::file_extension;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::trace;
use url::Url;

static UNWANTED_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(data|file|javascript|mailto|sms|tel):").expect("static regex")
});

/// Role of an extracted URL relative to the item it was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Asset,
    Outlink,
}

/// Filter the resolved URLs found in `item`, keeping extraction order.
///
/// Drops the item's own URL, non-web schemes and duplicates, rewrites the
/// `&amp;` left in Reddit markup, applies the file-type rules to assets and
/// truncates to the configured cap.
pub fn sanitize(urls: Vec<Url>, item: &Url, kind: LinkKind, config: &AssetsConfig) -> Vec<Url> {
    let reddit = item.host_str().is_some_and(|h| h.contains("reddit.com"));
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(urls.len());

    for url in urls {
        if url.as_str() == item.as_str() || UNWANTED_SCHEME.is_match(url.as_str()) {
            continue;
        }

        let url = if reddit && url.as_str().contains("&amp;") {
            match normalize(&url.as_str().replace("&amp;", "&"), None) {
                Ok(fixed) => fixed,
                Err(e) => {
                    trace!(url = %url, error = %e, "Dropping URL after &amp; fixup");
                    continue;
                }
            }
        } else {
            url
        };

        if kind == LinkKind::Asset && !file_type_allowed(&url, config) {
            continue;
        }
        if !seen.insert(url.as_str().to_string()) {
            continue;
        }
        kept.push(url);
    }

    let cap = match kind {
        LinkKind::Asset => config.max_assets,
        LinkKind::Outlink => config.max_outlinks,
    };
    if cap > 0 && kept.len() > cap {
        kept.truncate(cap);
    }
    kept
}

/// Allow list wins over the deny list when both are set
fn file_type_allowed(url: &Url, config: &AssetsConfig) -> bool {
    let ext = file_extension(url);
    let listed = |list: &[String]| {
        ext.as_deref()
            .is_some_and(|ext| list.iter().any(|t| t.trim().eq_ignore_ascii_case(ext)))
    };

    if !config.allowed_file_types.is_empty() {
        listed(&config.allowed_file_types)
    } else {
        !listed(&config.disallowed_file_types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(raw: &[&str]) -> Vec<Url> {
        raw.iter().map(|u| Url::parse(u).unwrap()).collect()
    }

    fn strings(urls: &[Url]) -> Vec<&str> {
        urls.iter().map(Url::as_str).collect()
    }

    #[test]
    fn drops_self_and_unwanted_schemes() {
        let item = Url::parse("http://example.com").unwrap();
        let kept = sanitize(
            urls(&["http://a1.com", "mailto:info@archive.org", "http://example.com"]),
            &item,
            LinkKind::Outlink,
            &AssetsConfig::default(),
        );
        assert_eq!(strings(&kept), vec!["http://a1.com/"]);
    }

    #[test]
    fn reddit_amp_fixup() {
        let item = Url::parse("https://reddit.com/").unwrap();
        let kept = sanitize(
            urls(&["http://reddit.com/asset?a=1&b=2&amp;c=3"]),
            &item,
            LinkKind::Asset,
            &AssetsConfig::default(),
        );
        assert_eq!(strings(&kept), vec!["http://reddit.com/asset?a=1&b=2&c=3"]);
    }

    #[test]
    fn amp_is_kept_outside_reddit() {
        let item = Url::parse("https://example.com/").unwrap();
        let kept = sanitize(
            urls(&["http://example.com/asset?a=1&amp;c=3"]),
            &item,
            LinkKind::Asset,
            &AssetsConfig::default(),
        );
        assert_eq!(strings(&kept), vec!["http://example.com/asset?a=1&amp;c=3"]);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let item = Url::parse("https://example.com/").unwrap();
        let kept = sanitize(
            urls(&["https://example.com/b", "https://example.com/a", "https://example.com/b"]),
            &item,
            LinkKind::Outlink,
            &AssetsConfig::default(),
        );
        assert_eq!(strings(&kept), vec!["https://example.com/b", "https://example.com/a"]);
    }

    #[test]
    fn allow_list_overrides_deny_list() {
        let item = Url::parse("https://example.com/").unwrap();
        let config = AssetsConfig {
            allowed_file_types: vec!["css".into()],
            disallowed_file_types: vec!["css".into(), "png".into()],
            ..AssetsConfig::default()
        };
        let kept = sanitize(
            urls(&["https://example.com/a.css", "https://example.com/b.png", "https://example.com/c"]),
            &item,
            LinkKind::Asset,
            &config,
        );
        assert_eq!(strings(&kept), vec!["https://example.com/a.css"]);
    }

    #[test]
    fn deny_list_applies_to_assets_only() {
        let item = Url::parse("https://example.com/").unwrap();
        let config = AssetsConfig {
            disallowed_file_types: vec!["MP4".into()],
            ..AssetsConfig::default()
        };
        let input = urls(&["https://example.com/v.mp4", "https://example.com/i.jpg"]);
        let assets = sanitize(input.clone(), &item, LinkKind::Asset, &config);
        assert_eq!(strings(&assets), vec!["https://example.com/i.jpg"]);
        let outlinks = sanitize(input, &item, LinkKind::Outlink, &config);
        assert_eq!(outlinks.len(), 2);
    }

    #[test]
    fn caps_truncate_in_order() {
        let item = Url::parse("https://example.com/").unwrap();
        let config = AssetsConfig {
            max_assets: 2,
            max_outlinks: 1,
            ..AssetsConfig::default()
        };
        let input = urls(&["https://example.com/1", "https://example.com/2", "https://example.com/3"]);
        let assets = sanitize(input.clone(), &item, LinkKind::Asset, &config);
        assert_eq!(strings(&assets), vec!["https://example.com/1", "https://example.com/2"]);
        let outlinks = sanitize(input, &item, LinkKind::Outlink, &config);
        assert_eq!(strings(&outlinks), vec!["https://example.com/1"]);
    }
}
