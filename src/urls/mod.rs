//! URL value type carried through the postprocessing pipeline
//!
//! A [`CrawlUrl`] couples the raw and parsed forms of a URL with the crawl
//! counters (hops, redirects) and, once archived, the response metadata and
//! the buffered body. Body access, the cached document and the detected
//! encoding sit behind a per-URL mutex.

mod body;
mod document;
pub mod mime;

pub use body::{Body, RewindGuard, SPOOL_THRESHOLD};
pub use document::{detect_encoding, encode_query, HtmlDocument};

use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use url::{Host, Url};

/// Reasons a URL is rejected at construction
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),
    #[error("Host has no TLD: {0}")]
    NoTld(String),
}

/// HTTP status codes treated as redirects
pub const REDIRECT_STATUSES: [u16; 6] = [300, 301, 302, 303, 307, 308];

/// Response metadata attached by the archiver
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers in arrival order
    pub headers: Vec<(String, String)>,
    /// URL the request was sent to
    pub request_url: Url,
}

impl Response {
    pub fn new(status: u16, request_url: Url) -> Self {
        Self {
            status,
            headers: Vec::new(),
            request_url,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Get a header value (case-insensitive name)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a repeated header
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_redirect(&self) -> bool {
        REDIRECT_STATUSES.contains(&self.status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Mutable per-URL state guarded by the URL's mutex
#[derive(Debug, Default)]
struct UrlState {
    body: Option<Body>,
    document: Option<Arc<HtmlDocument>>,
    encoding: Option<&'static encoding_rs::Encoding>,
    mime: Option<String>,
    base: Option<Url>,
}

/// A URL discovered or fetched by the crawler
#[derive(Debug)]
pub struct CrawlUrl {
    raw: String,
    parsed: Url,
    hops: u32,
    redirects: u32,
    response: Option<Response>,
    state: Mutex<UrlState>,
}

/// Parse and normalize a raw URL, optionally relative to `parent`.
///
/// Surrounding quotes are trimmed, relative references are resolved against
/// the parent, scheme-less input without a parent is assumed `http`, the
/// fragment is dropped and hosts are IDNA-encoded. Only `http(s)` URLs with a
/// dotted, non-loopback host (or a bracketed IPv6) are accepted.
pub fn normalize(raw: &str, parent: Option<&Url>) -> Result<Url, UrlError> {
    let trimmed = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();

    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => match parent {
            Some(parent) => parent.join(trimmed)?,
            None => Url::parse(&format!("http://{}", trimmed))?,
        },
        Err(e) => return Err(e.into()),
    };

    url.set_fragment(None);

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
    }

    match url.host() {
        None => return Err(UrlError::UnsupportedHost(url.to_string())),
        Some(Host::Domain(domain)) => {
            if domain.eq_ignore_ascii_case("localhost") {
                return Err(UrlError::UnsupportedHost(domain.to_string()));
            }
            if !domain.contains('.') {
                return Err(UrlError::NoTld(domain.to_string()));
            }
        }
        Some(Host::Ipv4(ip)) => {
            if ip == std::net::Ipv4Addr::LOCALHOST {
                return Err(UrlError::UnsupportedHost(ip.to_string()));
            }
        }
        Some(Host::Ipv6(_)) => {}
    }

    Ok(url)
}

impl CrawlUrl {
    /// Parse an absolute (or scheme-less) URL
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        Ok(Self::from_url(normalize(raw, None)?))
    }

    /// Parse a URL relative to a parent
    pub fn parse_with_parent(raw: &str, parent: &Url) -> Result<Self, UrlError> {
        Ok(Self::from_url(normalize(raw, Some(parent))?))
    }

    /// Wrap an already-normalized URL
    pub fn from_url(parsed: Url) -> Self {
        Self {
            raw: parsed.to_string(),
            parsed,
            hops: 0,
            redirects: 0,
            response: None,
            state: Mutex::new(UrlState::default()),
        }
    }

    pub fn with_hops(mut self, hops: u32) -> Self {
        self.hops = hops;
        self
    }

    pub fn with_redirects(mut self, redirects: u32) -> Self {
        self.redirects = redirects;
        self
    }

    /// Canonical serialization
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn parsed(&self) -> &Url {
        &self.parsed
    }

    pub fn host(&self) -> &str {
        self.parsed.host_str().unwrap_or_default()
    }

    pub fn hops(&self) -> u32 {
        self.hops
    }

    pub fn set_hops(&mut self, hops: u32) {
        self.hops = hops;
    }

    pub fn redirects(&self) -> u32 {
        self.redirects
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Attach the response metadata (archiver side)
    pub fn set_response(&mut self, response: Response) {
        self.response = Some(response);
        self.state.get_mut().mime = None;
    }

    /// Attach the buffered body (archiver side)
    pub fn set_body(&self, body: Body) {
        let mut state = self.state.lock();
        state.body = Some(body);
        state.mime = None;
        state.document = None;
    }

    pub fn has_body(&self) -> bool {
        self.state.lock().body.is_some()
    }

    /// Read the whole body; the body is rewound afterwards
    pub fn read_body(&self) -> io::Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        match state.body.as_mut() {
            Some(body) => body.read_all().map(Some),
            None => Ok(None),
        }
    }

    /// Read up to `limit` bytes from the start of the body
    pub fn read_body_prefix(&self, limit: usize) -> io::Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        match state.body.as_mut() {
            Some(body) => body.read_prefix(limit).map(Some),
            None => Ok(None),
        }
    }

    /// Current body read position
    pub fn body_position(&self) -> Option<u64> {
        let mut state = self.state.lock();
        state.body.as_mut().and_then(|b| b.position().ok())
    }

    /// Whether the body contains a byte string
    pub fn body_contains(&self, needle: &[u8]) -> bool {
        match self.read_body() {
            Ok(Some(bytes)) => !needle.is_empty() && bytes.windows(needle.len()).any(|w| w == needle),
            _ => false,
        }
    }

    /// Raw `Content-Type` header
    pub fn content_type(&self) -> Option<&str> {
        self.response.as_ref().and_then(|r| r.header("content-type"))
    }

    /// Media type from the header and a body sniff, computed once
    pub fn mime_type(&self) -> String {
        if let Some(mime) = self.state.lock().mime.clone() {
            return mime;
        }
        let prefix = self
            .read_body_prefix(mime::SNIFF_LEN)
            .ok()
            .flatten()
            .unwrap_or_default();
        let detected = mime::detect(self.content_type(), &prefix);
        self.state.lock().mime = Some(detected.clone());
        detected
    }

    /// `<base href>` override recorded during HTML extraction
    pub fn base(&self) -> Option<Url> {
        self.state.lock().base.clone()
    }

    pub fn set_base(&self, base: Url) {
        self.state.lock().base = Some(base);
    }

    /// URL that relative references resolve against
    pub fn resolution_base(&self) -> Url {
        self.base().unwrap_or_else(|| self.parsed.clone())
    }

    /// Resolve a raw reference found in this URL's document
    pub fn resolve(&self, raw: &str) -> Result<Url, UrlError> {
        normalize(raw, Some(&self.resolution_base()))
    }

    /// Drop the body and the cached document once postprocessing is done
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.body = None;
        state.document = None;
    }
}

impl Clone for CrawlUrl {
    /// Clones the URL and its counters; body and document cache are not shared
    fn clone(&self) -> Self {
        let state = self.state.lock();
        Self {
            raw: self.raw.clone(),
            parsed: self.parsed.clone(),
            hops: self.hops,
            redirects: self.redirects,
            response: self.response.clone(),
            state: Mutex::new(UrlState {
                mime: state.mime.clone(),
                base: state.base.clone(),
                encoding: state.encoding,
                ..UrlState::default()
            }),
        }
    }
}

impl fmt::Display for CrawlUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
