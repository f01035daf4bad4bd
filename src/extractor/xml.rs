//! Generic XML and sitemap extraction
//!
//! A raw event walk: attribute values and text nodes starting with `http`
//! are taken as-is, other text is scanned with the relaxed URL regex.

use super::text::find_urls;
use super::{ExtractError, Extracted, Extractor};
use crate::config::Config;
use crate::urls::mime::ContentKind;
use crate::urls::CrawlUrl;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Marker identifying sitemap documents
pub const SITEMAP_MARKER: &[u8] = b"sitemaps.org/schemas/sitemap/";

/// Collect URLs from an XML document.
///
/// A malformed document keeps what was read before the error; it is only a
/// parse error when nothing was found.
pub fn extract_xml(bytes: &[u8]) -> Result<Extracted, ExtractError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut urls = Vec::new();
    let mut buf = Vec::new();
    let mut failure = None;

    loop {
        buf.clear();
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                failure = Some(format!(
                    "XML error at position {}: {}",
                    reader.error_position(),
                    e
                ));
                break;
            }
        };

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref().starts_with(b"xmlns") {
                        continue;
                    }
                    if let Ok(value) = attr.unescape_value() {
                        let value = value.trim();
                        if starts_with_http(value) {
                            urls.push(value.to_string());
                        }
                    }
                }
            }
            Event::Text(ref e) => {
                if let Ok(text) = e.unescape() {
                    collect_text(&text, &mut urls);
                }
            }
            Event::CData(ref e) => {
                let text = String::from_utf8_lossy(e);
                collect_text(&text, &mut urls);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match failure {
        Some(reason) if urls.is_empty() => Err(ExtractError::parse("xml", reason)),
        Some(reason) => ExtractError::partial(Extracted::partition_by_extension(urls), vec![reason]),
        None => Ok(Extracted::partition_by_extension(urls)),
    }
}

fn collect_text(text: &str, urls: &mut Vec<String>) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if starts_with_http(text) && !text.contains(char::is_whitespace) {
        urls.push(text.to_string());
    } else {
        urls.extend(find_urls(text, false));
    }
}

fn starts_with_http(s: &str) -> bool {
    s.len() >= 4 && s[..4].eq_ignore_ascii_case("http")
}

fn is_xml(url: &CrawlUrl) -> bool {
    ContentKind::from_mime(&url.mime_type()) == ContentKind::Xml
}

/// Sitemaps (`urlset` / `sitemapindex`)
pub struct SitemapExtractor;

impl Extractor for SitemapExtractor {
    fn name(&self) -> &'static str {
        "sitemap"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        is_xml(url) && url.body_contains(SITEMAP_MARKER)
    }

    fn extract(&self, url: &CrawlUrl, _config: &Config) -> Result<Extracted, ExtractError> {
        let bytes = url.read_body()?.unwrap_or_default();
        extract_xml(&bytes)
    }
}

/// Any other XML document
pub struct XmlExtractor;

impl Extractor for XmlExtractor {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        is_xml(url)
    }

    fn extract(&self, url: &CrawlUrl, _config: &Config) -> Result<Extracted, ExtractError> {
        let bytes = url.read_body()?.unwrap_or_default();
        extract_xml(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::testing::archived;

    const SITEMAP: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/page</loc></url>
  <url><loc>https://example.com/doc.pdf</loc></url>
</urlset>"#;

    #[test]
    fn sitemap_locs_are_partitioned() {
        let url = archived("https://example.com/sitemap.xml", &[("Content-Type", "text/xml")], SITEMAP);
        assert!(SitemapExtractor.matches(&url));
        let extracted = SitemapExtractor.extract(&url, &Config::default()).unwrap();
        assert_eq!(extracted.assets, vec!["https://example.com/doc.pdf".to_string()]);
        assert_eq!(
            extracted.outlinks,
            vec!["https://example.com/page".to_string()]
        );
        assert_eq!(url.body_position(), Some(0));
    }

    #[test]
    fn generic_xml_scans_attributes_and_text() {
        let body = br#"<feed><link href="https://example.com/a"/><entry>See https://example.com/b.png now</entry><![CDATA[https://example.com/c]]></feed>"#;
        let extracted = extract_xml(body).unwrap();
        assert_eq!(extracted.assets, vec!["https://example.com/b.png".to_string()]);
        assert_eq!(
            extracted.outlinks,
            vec!["https://example.com/a".to_string(), "https://example.com/c".to_string()]
        );
    }

    #[test]
    fn malformed_xml_keeps_earlier_urls() {
        let body = b"<a href=\"https://example.com/x\"><b></c>";
        match extract_xml(body) {
            Err(ExtractError::Partial { extracted, .. }) => {
                assert_eq!(extracted.outlinks, vec!["https://example.com/x".to_string()]);
            }
            other => panic!("expected partial extraction, got {:?}", other),
        }
        assert!(matches!(extract_xml(b"<a></b>"), Err(ExtractError::Parse { .. })));
    }
}
