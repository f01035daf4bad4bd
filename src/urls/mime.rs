//! Media type classification from `Content-Type` and body sniffing

/// Media types the sniffer recognises
pub const TEXT_HTML: &str = "text/html";
pub const TEXT_CSS: &str = "text/css";
pub const TEXT_XML: &str = "text/xml";
pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_PDF: &str = "application/pdf";
pub const APPLICATION_EPUB: &str = "application/epub+zip";
pub const APPLICATION_ZIP: &str = "application/zip";
pub const APPLICATION_MPEGURL: &str = "application/x-mpegurl";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// Bytes of body considered by [`sniff`]
pub const SNIFF_LEN: usize = 512;

/// Coarse content families used by extractor matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    Json,
    Xml,
    M3u8,
    Pdf,
    Epub,
    Other,
}

impl ContentKind {
    /// Classify a media type string
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("html") {
            ContentKind::Html
        } else if mime.contains("css") {
            ContentKind::Css
        } else if mime.contains("mpegurl") {
            ContentKind::M3u8
        } else if mime.contains("json") {
            ContentKind::Json
        } else if mime.contains("epub") {
            ContentKind::Epub
        } else if mime.contains("pdf") {
            ContentKind::Pdf
        } else if mime.contains("xml") {
            ContentKind::Xml
        } else {
            ContentKind::Other
        }
    }
}

/// Media type essence of a `Content-Type` value: `Text/HTML; charset=x` gives `text/html`
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// `charset` parameter of a `Content-Type` value
pub fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

/// Best-effort media type from body bytes
pub fn sniff(body: &[u8]) -> &'static str {
    let truncated = body.len() > SNIFF_LEN;
    let body = &body[..body.len().min(SNIFF_LEN)];

    if body.starts_with(b"%PDF-") {
        return APPLICATION_PDF;
    }
    if body.starts_with(b"PK\x03\x04") {
        if body.len() >= 58 && &body[30..58] == b"mimetypeapplication/epub+zip" {
            return APPLICATION_EPUB;
        }
        return APPLICATION_ZIP;
    }

    let text = strip_bom(body);
    let trimmed = trim_ascii_start(text);

    if trimmed.starts_with(b"#EXTM3U") {
        return APPLICATION_MPEGURL;
    }
    if starts_with_ignore_case(trimmed, b"<?xml") {
        // XHTML documents often carry an XML declaration
        if contains_ignore_case(trimmed, b"<html") {
            return TEXT_HTML;
        }
        return TEXT_XML;
    }
    const HTML_SIGNATURES: &[&[u8]] = &[
        b"<!doctype html",
        b"<html",
        b"<head",
        b"<body",
        b"<script",
        b"<iframe",
        b"<title",
        b"<div",
        b"<table",
        b"<style",
        b"<a ",
        b"<p>",
        b"<br",
        b"<h1",
        b"<!--",
    ];
    if HTML_SIGNATURES
        .iter()
        .any(|sig| starts_with_ignore_case(trimmed, sig))
    {
        return TEXT_HTML;
    }
    if matches!(trimmed.first(), Some(b'{') | Some(b'['))
        && (truncated || serde_json::from_slice::<serde_json::Value>(text).is_ok())
    {
        return APPLICATION_JSON;
    }
    if trimmed.first() == Some(&b'<') {
        return TEXT_XML;
    }
    if !trimmed.is_empty() && std::str::from_utf8(text).is_ok() {
        return TEXT_PLAIN;
    }
    APPLICATION_OCTET_STREAM
}

/// Combine header and sniffed type.
///
/// A specific header wins; generic headers (`text/plain`,
/// `application/octet-stream`, missing) defer to the sniffer.
pub fn detect(content_type: Option<&str>, body_prefix: &[u8]) -> String {
    let header = content_type.map(essence).unwrap_or_default();
    let generic = header.is_empty()
        || header == TEXT_PLAIN
        || header == APPLICATION_OCTET_STREAM
        || header == "binary/octet-stream";
    if !generic {
        return header;
    }
    let sniffed = sniff(body_prefix);
    if sniffed == APPLICATION_OCTET_STREAM && !header.is_empty() {
        header
    } else {
        sniffed.to_string()
    }
}

fn strip_bom(body: &[u8]) -> &[u8] {
    body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body)
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}
