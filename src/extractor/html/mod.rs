//! HTML extraction
//!
//! One pass over the DOM. A fixed tag and attribute table yields assets,
//! `<a>` attributes yield outlinks, and script and style contents are
//! scanned with the CSS, JSON and URL-regex helpers. Every tag is skipped
//! when listed in `disable_html_tag`.

mod srcset;

pub use srcset::parse_srcset;

use super::css::extract_css;
use super::json::collect_urls;
use super::text::{assigned_json_urls, find_urls};
use super::{ExtractError, Extracted, Extractor, Mode};
use crate::config::{AssetsConfig, Config};
use crate::urls::mime::ContentKind;
use crate::urls::CrawlUrl;
use crate::util::file_extension;
use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// Path fragments that mark an `<a>` target as a static resource
const ASSET_FOLDERS: [&str; 12] = [
    "static/",
    "assets/",
    "images/",
    "img/",
    "css/",
    "fonts/",
    "scripts/",
    "js/",
    "media/",
    "uploads/",
    "wp-content/",
    "wp-includes/",
];

/// `<a>` attributes read for assets when the value looks like a resource
const ANCHOR_ASSET_ATTRS: [&str; 7] = [
    "href",
    "data-href",
    "data-src",
    "data-srcset",
    "data-lazy-src",
    "src",
    "srcset",
];

/// `<a>` attributes read for outlinks
const ANCHOR_OUTLINK_ATTRS: [&str; 8] = [
    "href",
    "data-href",
    "data-url",
    "data-link",
    "data-redirect-url",
    "ping",
    "router-link",
    "to",
];

/// Inline style values that are layout numbers or design tokens, not URLs
const STYLE_SKIP_PREFIXES: [&str; 6] = ["0.", "--font", "--size", "--color", "--shreddit", "100vh"];

static ONCLICK_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.location(?:\.href)?\s*=\s*['"]([^'"]+)['"]"#).expect("static regex")
});

pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn name(&self) -> &'static str {
        "html"
    }

    fn supports(&self, _mode: Mode) -> bool {
        true
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        ContentKind::from_mime(&url.mime_type()) == ContentKind::Html
    }

    fn extract(&self, url: &CrawlUrl, config: &Config) -> Result<Extracted, ExtractError> {
        extract_html(url, config)
    }
}

/// Decode the document, honour `<base>` and walk every element
pub fn extract_html(url: &CrawlUrl, config: &Config) -> Result<Extracted, ExtractError> {
    let document = url.transform_document()?;
    let html = document.parse();

    if !config.assets.is_tag_disabled("base") {
        apply_base(&html, url);
    }

    let mut extracted = Extracted::default();
    for element in html.root_element().descendants().filter_map(ElementRef::wrap) {
        visit(element, &config.assets, &mut extracted);
    }

    debug!(
        url = %url,
        assets = extracted.assets.len(),
        outlinks = extracted.outlinks.len(),
        "HTML extraction done"
    );
    Ok(extracted)
}

/// Record the first usable `<base href>` as the URL's resolution base
fn apply_base(html: &Html, url: &CrawlUrl) {
    let Ok(selector) = Selector::parse("base[href]") else {
        return;
    };
    let Some(href) = html
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr("href"))
    else {
        return;
    };

    // ASCII whitespace only; other Unicode spaces are part of the value
    let href = href.trim_matches(|c| matches!(c, '\t' | '\n' | '\x0C' | '\r' | ' '));
    let Ok(base) = url.parsed().join(href) else {
        return;
    };
    if matches!(base.scheme(), "data" | "javascript") {
        return;
    }
    url.set_base(base);
}

fn visit(element: ElementRef<'_>, config: &AssetsConfig, out: &mut Extracted) {
    let el = element.value();
    let tag = el.name();
    if config.is_tag_disabled(tag) {
        return;
    }

    match tag {
        "img" => {
            push_attrs(el, &["src", "data-src", "data-lazy-src"], &mut out.assets);
            push_srcsets(el, &["srcset", "data-srcset"], &mut out.assets);
        }
        "video" | "audio" => push_attrs(el, &["src"], &mut out.assets),
        "source" => {
            push_attrs(el, &["src"], &mut out.assets);
            push_srcsets(el, &["srcset", "data-srcset"], &mut out.assets);
        }
        "link" => push_attrs(el, &["href"], &mut out.assets),
        "meta" => {
            if let Some(content) = el.attr("content").map(str::trim) {
                if ["http", "/", "./", "../"].iter().any(|p| content.starts_with(p)) {
                    out.assets.push(content.to_string());
                }
            }
            push_attrs(el, &["href"], &mut out.assets);
        }
        "script" => {
            push_attrs(el, &["src"], &mut out.assets);
            let text: String = element.text().collect();
            if !text.trim().is_empty() {
                let is_json = el
                    .attr("type")
                    .is_some_and(|t| t.to_ascii_lowercase().contains("json"));
                out.merge(script_urls(&text, is_json, config.strict_regex));
            }
        }
        "style" => {
            let text: String = element.text().collect();
            let css = extract_css(&text, false);
            out.assets.extend(css.links);
            out.assets.extend(css.at_import_links);
        }
        "a" => anchor(element, out),
        _ => {}
    }

    if let Some(style) = el.attr("style") {
        for link in extract_css(style, true).links {
            if !skip_style_value(&link) {
                out.assets.push(link);
            }
        }
    }

    if let Some(item) = el.attr("data-item") {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(item) {
            collect_urls(&value, &mut out.assets);
        }
    }

    push_attrs(el, &["data-preview"], &mut out.assets);

    if let Some(onclick) = el.attr("onclick") {
        for caps in ONCLICK_LOCATION.captures_iter(onclick) {
            if let Some(target) = caps.get(1) {
                out.outlinks.push(target.as_str().trim().to_string());
            }
        }
    }
}

fn push_attrs(el: &Element, attrs: &[&str], out: &mut Vec<String>) {
    for attr in attrs {
        if let Some(value) = el.attr(attr).map(str::trim) {
            if !value.is_empty() {
                out.push(value.to_string());
            }
        }
    }
}

fn push_srcsets(el: &Element, attrs: &[&str], out: &mut Vec<String>) {
    for attr in attrs {
        if let Some(value) = el.attr(attr) {
            out.extend(parse_srcset(value));
        }
    }
}

fn anchor(element: ElementRef<'_>, out: &mut Extracted) {
    let el = element.value();
    let mut as_asset: Vec<&str> = Vec::new();

    for attr in ANCHOR_ASSET_ATTRS {
        let Some(value) = el.attr(attr) else {
            continue;
        };
        let candidates = if attr.ends_with("srcset") {
            parse_srcset(value)
        } else {
            vec![value.trim().to_string()]
        };
        for candidate in candidates {
            if has_asset_folder(&candidate) {
                out.assets.push(candidate);
                as_asset.push(attr);
            }
        }
    }

    for attr in ANCHOR_OUTLINK_ATTRS {
        if as_asset.contains(&attr) {
            continue;
        }
        let Some(value) = el.attr(attr) else {
            continue;
        };
        if attr == "ping" {
            out.outlinks
                .extend(value.split_ascii_whitespace().map(str::to_string));
        } else if !value.trim().is_empty() {
            out.outlinks.push(value.trim().to_string());
        }
    }
}

fn has_asset_folder(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    ASSET_FOLDERS.iter().any(|folder| lower.contains(folder))
}

fn skip_style_value(value: &str) -> bool {
    value.contains('%') || STYLE_SKIP_PREFIXES.iter().any(|p| value.starts_with(p))
}

/// URLs in a `<script>` body. JSON-typed scripts are walked as JSON; other
/// scripts go through the URL regex and the assignment heuristic. Results
/// that name a file are assets, the rest outlinks.
fn script_urls(text: &str, is_json: bool, strict: bool) -> Extracted {
    let mut urls = Vec::new();
    if is_json {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
            collect_urls(&value, &mut urls);
        }
    } else {
        urls.extend(find_urls(text, strict));
        urls.extend(assigned_json_urls(text));
    }

    let mut extracted = Extracted::default();
    for raw in urls {
        if looks_like_file(&raw) {
            extracted.assets.push(raw);
        } else {
            extracted.outlinks.push(raw);
        }
    }
    extracted
}

/// Extension check that also works for relative references
fn looks_like_file(raw: &str) -> bool {
    if let Ok(url) = Url::parse(raw) {
        return file_extension(&url).is_some();
    }
    let path = raw.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && (1..=8).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::testing::archived;

    fn html(body: &str) -> CrawlUrl {
        archived("http://example.com", &[("Content-Type", "text/html")], body.as_bytes())
    }

    fn run(url: &CrawlUrl, config: &Config) -> Extracted {
        HtmlExtractor.extract(url, config).unwrap()
    }

    #[test]
    fn minimal_document() {
        let url = html(r#"<html><head><link href="style.css"></head><body><img src="img.png"></body></html>"#);
        let extracted = run(&url, &Config::default());
        assert!(extracted.assets.contains(&"style.css".to_string()));
        assert!(extracted.assets.contains(&"img.png".to_string()));
        assert!(extracted.outlinks.is_empty());

        let resolved: Vec<String> = extracted
            .assets
            .iter()
            .map(|a| url.resolve(a).unwrap().to_string())
            .collect();
        assert!(resolved.contains(&"http://example.com/img.png".to_string()));
        assert!(resolved.contains(&"http://example.com/style.css".to_string()));
        assert_eq!(url.body_position(), Some(0));
    }

    #[test]
    fn tag_table_attributes() {
        let url = html(
            r#"<img data-src="lazy.png" srcset="a.png 1x, b.png 2x">
<video src="v.mp4"></video><audio src="a.mp3"></audio>
<picture><source srcset="s.webp"></picture>
<meta property="og:image" content="https://cdn.example.com/og.jpg">
<meta name="description" content="not a url">
<script src="app.js"></script>
<style>@import "theme.css"; body { background: url(bg.png) }</style>
<div style="background-image: url('div.png'); width: 50%"></div>
<div data-item='{"image": "https://example.com/item.jpg"}' data-preview="preview.gif"></div>"#,
        );
        let assets = run(&url, &Config::default()).assets;
        for expected in [
            "lazy.png",
            "a.png",
            "b.png",
            "v.mp4",
            "a.mp3",
            "s.webp",
            "https://cdn.example.com/og.jpg",
            "app.js",
            "bg.png",
            "theme.css",
            "div.png",
            "https://example.com/item.jpg",
            "preview.gif",
        ] {
            assert!(assets.contains(&expected.to_string()), "missing {}", expected);
        }
        assert!(!assets.contains(&"not a url".to_string()));
    }

    #[test]
    fn anchors_split_between_assets_and_outlinks() {
        let url = html(
            r#"<a href="/page">page</a>
<a href="/static/report.pdf">download</a>
<a data-url="https://other.org/x" ping="/p1 /p2">x</a>
<span onclick="window.location.href = '/clicked';">go</span>"#,
        );
        let extracted = run(&url, &Config::default());
        assert_eq!(extracted.assets, vec!["/static/report.pdf".to_string()]);
        assert_eq!(
            extracted.outlinks,
            vec![
                "/page".to_string(),
                "https://other.org/x".to_string(),
                "/p1".to_string(),
                "/p2".to_string(),
                "/clicked".to_string(),
            ]
        );
    }

    #[test]
    fn base_href_changes_resolution() {
        let url = html(r#"<html><head><base href=" https://cdn.example.com/dir/ "></head><body><img src="x.png"></body></html>"#);
        run(&url, &Config::default());
        assert_eq!(url.resolve("x.png").unwrap().as_str(), "https://cdn.example.com/dir/x.png");
    }

    #[test]
    fn javascript_base_is_ignored() {
        let url = html(r#"<base href="javascript:alert(1)"><img src="x.png">"#);
        run(&url, &Config::default());
        assert!(url.base().is_none());
    }

    #[test]
    fn disabled_tags_are_skipped() {
        let url = html(r#"<img src="i.png"><a href="/page">p</a><script src="s.js"></script>"#);
        let mut config = Config::default();
        config.assets.disable_html_tag = vec!["a".into(), "script".into()];
        let extracted = run(&url, &config);
        assert_eq!(extracted.assets, vec!["i.png".to_string()]);
        assert!(extracted.outlinks.is_empty());
    }

    #[test]
    fn script_text_regex_and_json() {
        let url = html(
            r#"<script>var cfg = {"api": "https://api.example.com/v1", "logo": "https://example.com/logo.svg"};</script>
<script type="application/ld+json">{"@type": "Article", "url": "https://example.com/article", "image": "https://example.com/a.jpg"}</script>"#,
        );
        let extracted = run(&url, &Config::default());
        assert!(extracted.assets.contains(&"https://example.com/logo.svg".to_string()));
        assert!(extracted.assets.contains(&"https://example.com/a.jpg".to_string()));
        assert!(extracted.outlinks.contains(&"https://api.example.com/v1".to_string()));
        assert!(extracted.outlinks.contains(&"https://example.com/article".to_string()));
    }

    #[test]
    fn inline_style_design_tokens_are_skipped() {
        assert!(skip_style_value("50%"));
        assert!(skip_style_value("--font-body"));
        assert!(skip_style_value("0.5"));
        assert!(!skip_style_value("bg.png"));
    }

    #[test]
    fn file_detection_for_relative_references() {
        assert!(looks_like_file("/js/app.min.js?v=3"));
        assert!(!looks_like_file("/api/v1"));
        assert!(!looks_like_file("https://example.com/"));
        assert!(!looks_like_file("https://example.com"));
    }
}
