//! Object-storage bucket listings
//!
//! Listings are XML served by the storage endpoint itself. Every file in a
//! listing and every "continue listing" page becomes an outlink.

pub mod azure;
pub mod s3;

use crate::urls::CrawlUrl;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

/// Characters escaped inside one path segment of an object key
const KEY_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Whether the `Server` header names one of `servers` and the body is XML
fn is_listing(url: &CrawlUrl, servers: &[&str]) -> bool {
    let Some(response) = url.response() else {
        return false;
    };
    let server = response.header("server").unwrap_or_default();
    let content_type = response.header("content-type").unwrap_or_default();
    content_type.contains("/xml") && servers.iter().any(|s| server.contains(s))
}

/// Copy of `base` with `set` parameters replacing any existing ones and
/// `remove` parameters dropped. Parameters are sorted by key.
fn with_query(base: &Url, set: &[(&str, &str)], remove: &[&str]) -> Url {
    let mut pairs: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| {
            let key: &str = k;
            !remove.contains(&key) && !set.iter().any(|(s, _)| *s == key)
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.extend(set.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut url = base.clone();
    url.set_query(None);
    url.query_pairs_mut().extend_pairs(pairs);
    url
}

/// URL of an object under the listing's base path
fn object_url(base: &Url, key: &str) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    let key = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    let path = format!("{}/{}", base.path().trim_end_matches('/'), key);
    url.set_path(&path);
    url
}
