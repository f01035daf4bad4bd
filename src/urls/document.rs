//! HTML document transform
//!
//! Detects the character set of an HTML body, transcodes it to UTF-8 and
//! caches the result on the URL. `scraper::Html` is not `Send`, so the cache
//! holds the decoded source and each caller parses its own DOM.

use super::{mime, CrawlUrl};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use regex::bytes::Regex;
use scraper::Html;
use std::io;
use std::sync::{Arc, LazyLock};
use tracing::warn;
use url::Url;

/// Bytes inspected for `<meta charset>`
const PRESCAN_LEN: usize = 1024;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]*?charset\s*=\s*["']?\s*([a-zA-Z0-9_:.\-]+)"#)
        .expect("static regex")
});

/// Transcoded HTML source and the encoding it came from
#[derive(Debug)]
pub struct HtmlDocument {
    source: Arc<str>,
    encoding: &'static Encoding,
}

impl HtmlDocument {
    /// Decode raw bytes with a known encoding
    pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> Self {
        let (text, actual, had_errors) = encoding.decode(bytes);
        if had_errors {
            warn!(
                encoding = actual.name(),
                "Transcode error in document, continuing with replacement characters"
            );
        }
        Self {
            source: Arc::from(text.as_ref()),
            encoding: actual,
        }
    }

    /// UTF-8 source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Encoding detected for the original bytes
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn is_utf8(&self) -> bool {
        self.encoding == UTF_8
    }

    /// Parse a fresh DOM
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.source)
    }
}

/// Determine the encoding of an HTML body: BOM, then the `Content-Type`
/// charset, then `<meta charset>` in the first 1024 bytes, then UTF-8.
pub fn detect_encoding(content_type: Option<&str>, prefix: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(prefix) {
        return encoding;
    }

    if let Some(encoding) = content_type
        .and_then(mime::charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return encoding;
    }

    let prefix = &prefix[..prefix.len().min(PRESCAN_LEN)];
    if let Some(encoding) = META_CHARSET
        .captures(prefix)
        .and_then(|caps| caps.get(1))
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        // A meta declaration cannot describe a UTF-16 byte stream
        if encoding == UTF_16BE || encoding == UTF_16LE {
            return UTF_8;
        }
        return encoding;
    }

    UTF_8
}

/// Re-encode percent-escaped UTF-8 in the query into `encoding`.
///
/// Servers expect query parameters in the page's own encoding. Escapes that
/// are not valid UTF-8, or characters the target encoding cannot represent,
/// are left untouched.
pub fn encode_query(url: &mut Url, encoding: &'static Encoding) {
    if encoding == UTF_8 || encoding.output_encoding() == UTF_8 {
        return;
    }
    let Some(query) = url.query() else {
        return;
    };
    if !query.contains('%') {
        return;
    }

    let bytes = query.as_bytes();
    let mut out = String::with_capacity(query.len());
    let mut changed = false;
    let mut i = 0;

    while i < bytes.len() {
        let mut run = Vec::new();
        let mut j = i;
        while let Some(byte) = high_escape(bytes, j) {
            run.push(byte);
            j += 3;
        }

        if run.is_empty() {
            out.push(bytes[i] as char);
            i += 1;
            continue;
        }

        match std::str::from_utf8(&run) {
            Ok(text) => {
                let (encoded, _, unmappable) = encoding.encode(text);
                if unmappable {
                    out.push_str(&query[i..j]);
                } else {
                    out.extend(percent_encode(&encoded, NON_ALPHANUMERIC));
                    changed = true;
                }
            }
            Err(_) => out.push_str(&query[i..j]),
        }
        i = j;
    }

    if changed {
        url.set_query(Some(&out));
    }
}

fn high_escape(bytes: &[u8], at: usize) -> Option<u8> {
    if bytes.get(at) != Some(&b'%') {
        return None;
    }
    let hex = std::str::from_utf8(bytes.get(at + 1..at + 3)?).ok()?;
    let value = u8::from_str_radix(hex, 16).ok()?;
    (value >= 0x80).then_some(value)
}

impl CrawlUrl {
    /// Decode the body as HTML and cache it. Idempotent.
    pub fn transform_document(&self) -> io::Result<Arc<HtmlDocument>> {
        if let Some(document) = self.state.lock().document.clone() {
            return Ok(document);
        }

        let bytes = self.read_body()?.unwrap_or_default();
        let encoding = detect_encoding(self.content_type(), &bytes[..bytes.len().min(PRESCAN_LEN)]);
        let document = Arc::new(HtmlDocument::decode(&bytes, encoding));

        let mut state = self.state.lock();
        // Another caller may have won the race; keep the first
        if let Some(existing) = state.document.clone() {
            return Ok(existing);
        }
        state.encoding = Some(document.encoding());
        state.document = Some(document.clone());
        Ok(document)
    }

    /// Encoding of the transformed document, if any
    pub fn document_encoding(&self) -> Option<&'static Encoding> {
        self.state.lock().encoding
    }

    /// Drop the cached document, keeping the body
    pub fn release_document(&self) {
        self.state.lock().document = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urls::{Body, Response};
    use encoding_rs::{SHIFT_JIS, WINDOWS_1252};

    #[test]
    fn header_charset_beats_meta() {
        let body = b"<html><head><meta charset=\"shift_jis\"></head></html>";
        assert_eq!(detect_encoding(Some("text/html; charset=windows-1252"), body), WINDOWS_1252);
        assert_eq!(detect_encoding(Some("text/html"), body), SHIFT_JIS);
    }

    #[test]
    fn bom_wins_and_default_is_utf8() {
        assert_eq!(detect_encoding(Some("text/html; charset=latin1"), b"\xEF\xBB\xBF<html>"), UTF_8);
        assert_eq!(detect_encoding(None, b"<html><body>plain</body></html>"), UTF_8);
    }

    #[test]
    fn meta_http_equiv_form_is_recognised() {
        let body = br#"<meta http-equiv="Content-Type" content="text/html; charset=ISO-8859-1">"#;
        assert_eq!(detect_encoding(None, body), WINDOWS_1252);
    }

    #[test]
    fn meta_utf16_declaration_means_utf8() {
        assert_eq!(detect_encoding(None, b"<meta charset=utf-16>"), UTF_8);
    }

    #[test]
    fn transform_decodes_and_caches() {
        let mut url = CrawlUrl::parse("http://example.com/").unwrap();
        url.set_response(
            Response::new(200, url.parsed().clone())
                .with_header("Content-Type", "text/html; charset=windows-1252"),
        );
        url.set_body(Body::from_bytes(b"<html><body>caf\xE9</body></html>").unwrap());

        let first = url.transform_document().unwrap();
        assert!(first.source().contains("café"));
        assert_eq!(url.document_encoding(), Some(WINDOWS_1252));
        assert_eq!(url.body_position(), Some(0));

        let second = url.transform_document().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        url.release_document();
        let third = url.transform_document().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn query_is_reencoded_into_document_encoding() {
        let mut url = Url::parse("http://example.com/search?q=é&lang=fr").unwrap();
        assert_eq!(url.query(), Some("q=%C3%A9&lang=fr"));
        encode_query(&mut url, WINDOWS_1252);
        assert_eq!(url.as_str(), "http://example.com/search?q=%E9&lang=fr");
    }

    #[test]
    fn query_left_alone_for_utf8_or_unmappable() {
        let mut url = Url::parse("http://example.com/?q=é").unwrap();
        encode_query(&mut url, UTF_8);
        assert_eq!(url.query(), Some("q=%C3%A9"));

        let mut url = Url::parse("http://example.com/?q=日本").unwrap();
        encode_query(&mut url, WINDOWS_1252);
        assert_eq!(url.query(), Some("q=%E6%97%A5%E6%9C%AC"));
    }
}
