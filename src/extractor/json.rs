//! JSON bodies: every string that parses as a URL with a host

use super::{ExtractError, Extracted, Extractor};
use crate::config::Config;
use crate::urls::mime::ContentKind;
use crate::urls::CrawlUrl;
use serde_json::Value;
use url::Url;

/// Collect URL-shaped strings from a JSON value, depth first
pub fn collect_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if is_url_like(s) {
                out.push(s.trim().to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_urls(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_urls(item, out);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Whether a string is an absolute URL with a non-empty host
pub fn is_url_like(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() || s.contains(char::is_whitespace) {
        return false;
    }
    Url::parse(s)
        .ok()
        .and_then(|u| u.host_str().map(|h| !h.is_empty()))
        .unwrap_or(false)
}

/// Parse bytes as JSON and partition the URLs it contains
pub fn extract_json(bytes: &[u8]) -> Result<Extracted, ExtractError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| ExtractError::parse("json", e))?;
    let mut urls = Vec::new();
    collect_urls(&value, &mut urls);
    Ok(Extracted::partition_by_extension(urls))
}

pub struct JsonExtractor;

impl Extractor for JsonExtractor {
    fn name(&self) -> &'static str {
        "json"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        ContentKind::from_mime(&url.mime_type()) == ContentKind::Json
    }

    fn extract(&self, url: &CrawlUrl, _config: &Config) -> Result<Extracted, ExtractError> {
        let bytes = url.read_body()?.unwrap_or_default();
        extract_json(&bytes)
    }
}
