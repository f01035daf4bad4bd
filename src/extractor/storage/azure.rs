//! Azure Blob container listings

use super::{is_listing, object_url, with_query};
use crate::config::Config;
use crate::extractor::{body_text, ExtractError, Extracted, Extractor};
use crate::urls::CrawlUrl;
use serde::Deserialize;
use url::Url;

/// `Server` header values of Azure Blob endpoints
pub const AZURE_SERVERS: [&str; 3] = ["Windows-Azure-Blob", "Blob Service Version", "Azurite-Blob"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EnumerationResults {
    pub blobs: Blobs,
    pub next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Blobs {
    #[serde(rename = "Blob")]
    pub blob: Vec<Blob>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Blob {
    pub name: String,
}

pub struct AzureExtractor;

impl Extractor for AzureExtractor {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        is_listing(url, &AZURE_SERVERS)
    }

    fn extract(&self, url: &CrawlUrl, _config: &Config) -> Result<Extracted, ExtractError> {
        let text = body_text(url)?;
        let listing: EnumerationResults =
            quick_xml::de::from_str(&text).map_err(|e| ExtractError::parse("azure listing", e))?;
        let request = url
            .response()
            .map(|r| r.request_url.clone())
            .unwrap_or_else(|| url.parsed().clone());

        Ok(Extracted::new(
            Vec::new(),
            list(&listing, &request).into_iter().map(|u| u.to_string()).collect(),
        ))
    }
}

/// Next-marker page first, then one URL per blob
pub fn list(listing: &EnumerationResults, request: &Url) -> Vec<Url> {
    let mut urls = Vec::new();

    if let Some(marker) = listing.next_marker.as_deref().filter(|m| !m.is_empty()) {
        urls.push(with_query(request, &[("marker", marker)], &[]));
    }

    for blob in &listing.blobs.blob {
        // Names must be relative to the container
        if blob.name.is_empty() || blob.name.starts_with('/') {
            continue;
        }
        urls.push(object_url(request, &blob.name));
    }
    urls
}
