//! `Link` response header (RFC 8288)

use super::{ExtractError, Extracted, Extractor};
use crate::config::Config;
use crate::urls::CrawlUrl;

/// Relations that point at other documents rather than dependencies
const NAVIGATION_RELS: [&str; 5] = ["next", "prev", "previous", "canonical", "alternate"];

/// One `<url>; k=v` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl Link {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn is_navigation(&self) -> bool {
        self.param("rel").is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|r| NAVIGATION_RELS.iter().any(|n| r.eq_ignore_ascii_case(n)))
        })
    }
}

/// Parse a `Link` header value. Commas inside `<...>` or quotes do not split.
pub fn parse_link_header(value: &str) -> Vec<Link> {
    let mut links = Vec::new();
    let mut rest = value;

    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            break;
        };
        let url = after[..close].trim().to_string();
        let tail = &after[close + 1..];

        let end = entry_end(tail);
        let params = tail[..end]
            .split(';')
            .filter_map(|param| {
                let (k, v) = param.split_once('=')?;
                Some((
                    k.trim().to_ascii_lowercase(),
                    v.trim().trim_matches('"').to_string(),
                ))
            })
            .collect();

        if !url.is_empty() {
            links.push(Link { url, params });
        }
        rest = &tail[end..];
    }

    links
}

/// Index of the `,` that ends the current entry, outside quotes
fn entry_end(s: &str) -> usize {
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => return i,
            _ => {}
        }
    }
    s.len()
}

pub struct LinkHeaderExtractor;

impl Extractor for LinkHeaderExtractor {
    fn name(&self) -> &'static str {
        "link-header"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        url.response().is_some_and(|r| r.header("link").is_some())
    }

    fn extract(&self, url: &CrawlUrl, _config: &Config) -> Result<Extracted, ExtractError> {
        let mut extracted = Extracted::default();
        let Some(response) = url.response() else {
            return Ok(extracted);
        };
        for value in response.header_values("link") {
            for link in parse_link_header(value) {
                if link.is_navigation() {
                    extracted.outlinks.push(link.url);
                } else {
                    extracted.assets.push(link.url);
                }
            }
        }
        Ok(extracted)
    }
}
