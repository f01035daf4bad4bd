//! Truth Social
//!
//! Post pages are rendered client-side, so the page alone carries almost
//! nothing. The post id and account name in the path map to the Mastodon
//! style API, whose status JSON lists the media attachments.

use super::host_is;
use crate::config::Config;
use crate::extractor::html::extract_html;
use crate::extractor::json::extract_json;
use crate::extractor::{ExtractError, Extracted, Extractor};
use crate::urls::mime::ContentKind;
use crate::urls::CrawlUrl;
use serde::Deserialize;
use url::Url;

const DOMAIN: &str = "truthsocial.com";
const API_PREFIX: &str = "/api/v1/statuses/";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Status {
    media_attachments: Vec<Attachment>,
    account: Option<Account>,
    card: Option<Card>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Attachment {
    url: Option<String>,
    preview_url: Option<String>,
    remote_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Account {
    avatar: Option<String>,
    header: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Card {
    image: Option<String>,
}

pub struct TruthSocialExtractor;

impl Extractor for TruthSocialExtractor {
    fn name(&self) -> &'static str {
        "truthsocial"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        if !host_is(url, DOMAIN) {
            return false;
        }
        match ContentKind::from_mime(&url.mime_type()) {
            ContentKind::Json => url.parsed().path().starts_with(API_PREFIX),
            ContentKind::Html => post_path(url.parsed()).is_some(),
            _ => false,
        }
    }

    fn extract(&self, url: &CrawlUrl, config: &Config) -> Result<Extracted, ExtractError> {
        if url.parsed().path().starts_with(API_PREFIX) {
            let bytes = url.read_body()?.unwrap_or_default();
            let mut extracted = extract_json(&bytes)?;
            if let Ok(status) = serde_json::from_slice::<Status>(&bytes) {
                extracted.assets.extend(status_media(status));
            }
            return Ok(extracted);
        }

        let mut extracted = extract_html(url, config)?;
        if let Some((account, id)) = post_path(url.parsed()) {
            extracted.assets.extend(api_urls(&account, &id));
        }
        Ok(extracted)
    }
}

/// Account name and post id of `/@user/posts/{id}` or `/@user/{id}`
fn post_path(url: &Url) -> Option<(String, String)> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let (account, id) = match segments.as_slice() {
        [account, "posts", id] => (account, id),
        [account, id] => (account, id),
        _ => return None,
    };
    let account = account.strip_prefix('@')?;
    if account.is_empty() || id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((account.to_string(), id.to_string()))
}

fn api_urls(account: &str, id: &str) -> Vec<String> {
    vec![
        format!("https://{DOMAIN}{API_PREFIX}{id}"),
        format!("https://{DOMAIN}{API_PREFIX}{id}/context"),
        format!("https://{DOMAIN}/api/v1/accounts/lookup?acct={account}"),
    ]
}

fn status_media(status: Status) -> Vec<String> {
    let mut urls = Vec::new();
    for attachment in status.media_attachments {
        urls.extend(attachment.url);
        urls.extend(attachment.preview_url);
        urls.extend(attachment.remote_url);
    }
    if let Some(account) = status.account {
        urls.extend(account.avatar);
        urls.extend(account.header);
    }
    if let Some(card) = status.card {
        urls.extend(card.image);
    }
    urls.retain(|u| !u.trim().is_empty());
    urls
}
