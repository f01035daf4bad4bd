//! INA (Institut national de l'audiovisuel)
//!
//! Video pages on `www.ina.fr` embed players by id; each id maps to an asset
//! description on the partner API, whose JSON carries the media and
//! thumbnail URLs.

use super::host_is;
use crate::config::Config;
use crate::extractor::html::extract_html;
use crate::extractor::json::extract_json;
use crate::extractor::{ExtractError, Extracted, Extractor};
use crate::urls::mime::ContentKind;
use crate::urls::CrawlUrl;
use scraper::Selector;
use serde_json::Value;

const API_HOST: &str = "apipartner.ina.fr";
const PLAYER_HOST: &str = "https://player.ina.fr";

/// API fields holding media URLs
const MEDIA_FIELDS: [&str; 4] = ["resourceUrl", "resourceThumbnail", "embedUrl", "uriBotPageMain"];

pub struct InaExtractor;

impl Extractor for InaExtractor {
    fn name(&self) -> &'static str {
        "ina"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        let kind = ContentKind::from_mime(&url.mime_type());
        if url.host().eq_ignore_ascii_case(API_HOST) {
            return kind == ContentKind::Json;
        }
        host_is(url, "ina.fr") && kind == ContentKind::Html
    }

    fn extract(&self, url: &CrawlUrl, config: &Config) -> Result<Extracted, ExtractError> {
        if url.host().eq_ignore_ascii_case(API_HOST) {
            let bytes = url.read_body()?.unwrap_or_default();
            let mut extracted = extract_json(&bytes)?;
            if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                extracted.assets.extend(api_media(&value));
            }
            return Ok(extracted);
        }

        let mut extracted = extract_html(url, config)?;
        let document = url.transform_document()?;
        extracted.assets.extend(player_urls(&document.parse()));
        Ok(extracted)
    }
}

/// Player config and partner API URLs of every embedded player
fn player_urls(html: &scraper::Html) -> Vec<String> {
    let Ok(selector) = Selector::parse(r#"[data-type="player"]"#) else {
        return Vec::new();
    };
    let mut urls = Vec::new();
    for player in html.select(&selector) {
        let el = player.value();
        if let Some(id) = el.attr("data-id").map(str::trim).filter(|id| !id.is_empty()) {
            urls.push(format!("https://{}/assets/{}", API_HOST, id));
        }
        if let Some(config_url) = el.attr("config-url").map(str::trim).filter(|u| !u.is_empty()) {
            if config_url.starts_with('/') {
                urls.push(format!("{}{}", PLAYER_HOST, config_url));
            } else {
                urls.push(config_url.to_string());
            }
        }
    }
    urls
}

/// Media fields of a partner API response
fn api_media(value: &Value) -> Vec<String> {
    MEDIA_FIELDS
        .iter()
        .filter_map(|field| value.get(field).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
