//! S3-compatible listings (ListObjects v1 and v2)

use super::{is_listing, object_url, with_query};
use crate::config::Config;
use crate::extractor::{body_text, ExtractError, Extracted, Extractor};
use crate::urls::CrawlUrl;
use serde::Deserialize;
use url::Url;

/// `Server` header values of S3-compatible endpoints
pub const S3_SERVERS: [&str; 4] = ["AmazonS3", "WasabiS3", "UploadServer", "AliyunOSS"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListBucketResult {
    pub is_truncated: bool,
    pub contents: Vec<S3Object>,
    pub common_prefixes: Vec<CommonPrefix>,
    pub next_marker: Option<String>,
    pub next_continuation_token: Option<String>,
    pub key_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct S3Object {
    pub key: String,
    pub size: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CommonPrefix {
    pub prefix: String,
}

pub struct S3Extractor;

impl Extractor for S3Extractor {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        is_listing(url, &S3_SERVERS)
    }

    fn extract(&self, url: &CrawlUrl, _config: &Config) -> Result<Extracted, ExtractError> {
        let text = body_text(url)?;
        let listing: ListBucketResult =
            quick_xml::de::from_str(&text).map_err(|e| ExtractError::parse("s3 listing", e))?;
        let request = url
            .response()
            .map(|r| r.request_url.clone())
            .unwrap_or_else(|| url.parsed().clone());

        let v2 = request
            .query_pairs()
            .any(|(k, v)| k == "list-type" && v == "2")
            || listing.key_count.is_some()
            || listing.next_continuation_token.is_some();

        let outlinks = if v2 {
            list_v2(&listing, &request)
        } else {
            list_v1(&listing, &request)
        };
        Ok(Extracted::new(
            Vec::new(),
            outlinks.into_iter().map(|u| u.to_string()).collect(),
        ))
    }
}

/// Marker page first, then every non-empty object
pub fn list_v1(listing: &ListBucketResult, request: &Url) -> Vec<Url> {
    let mut urls = Vec::new();

    let marker = listing
        .next_marker
        .as_deref()
        .filter(|m| !m.is_empty())
        .or_else(|| listing.contents.last().map(|o| o.key.as_str()));
    if let Some(marker) = marker.filter(|_| !listing.contents.is_empty()) {
        urls.push(with_query(request, &[("marker", marker)], &[]));
    }

    urls.extend(files(listing, request));
    urls
}

/// Prefixes (or files), then the continuation page when truncated
pub fn list_v2(listing: &ListBucketResult, request: &Url) -> Vec<Url> {
    let mut urls = Vec::new();

    if !listing.common_prefixes.is_empty() {
        for prefix in &listing.common_prefixes {
            if !prefix.prefix.is_empty() {
                urls.push(with_query(
                    request,
                    &[("prefix", prefix.prefix.as_str())],
                    &["continuation-token"],
                ));
            }
        }
    } else {
        urls.extend(files(listing, request));
    }

    if listing.is_truncated {
        if let Some(token) = listing.next_continuation_token.as_deref().filter(|t| !t.is_empty()) {
            urls.push(with_query(request, &[("continuation-token", token)], &[]));
        }
    }
    urls
}

fn files<'a>(listing: &'a ListBucketResult, request: &'a Url) -> impl Iterator<Item = Url> + 'a {
    listing
        .contents
        .iter()
        .filter(|o| o.size > 0 && !o.key.is_empty())
        .map(move |o| object_url(request, &o.key))
}
