//! Asset and outlink extraction
//!
//! Every format extractor implements [`Extractor`]. The [`Dispatcher`] owns a
//! priority-ordered list and runs the first one whose `matches` accepts the
//! URL, then merges whatever the `Link` response header carries.
//!
//! Extractors return raw strings. Resolution against the item's base URL,
//! sanitization and filtering happen afterwards in the postprocessor.

pub mod css;
pub mod epub;
pub mod html;
pub mod json;
pub mod link_header;
pub mod m3u8;
pub mod pdf;
pub mod sites;
pub mod storage;
pub mod text;
pub mod xml;

use crate::config::Config;
use crate::urls::CrawlUrl;
use std::io;
use thiserror::Error;
use tracing::debug;

/// Capture mode the crawler runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    General,
    Headless,
}

impl Mode {
    pub fn from_config(config: &Config) -> Self {
        if config.crawl.headless {
            Mode::Headless
        } else {
            Mode::General
        }
    }
}

/// Raw URLs found in a body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Resources the document depends on
    pub assets: Vec<String>,
    /// Links to other documents
    pub outlinks: Vec<String>,
}

impl Extracted {
    pub fn new(assets: Vec<String>, outlinks: Vec<String>) -> Self {
        Self { assets, outlinks }
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.outlinks.is_empty()
    }

    pub fn merge(&mut self, other: Extracted) {
        self.assets.extend(other.assets);
        self.outlinks.extend(other.outlinks);
    }

    /// Split URL strings on whether they name a file
    pub fn partition_by_extension(urls: impl IntoIterator<Item = String>) -> Self {
        let mut extracted = Self::default();
        for raw in urls {
            let has_ext = url::Url::parse(&raw)
                .ok()
                .and_then(|u| crate::util::file_extension(&u))
                .is_some();
            if has_ext {
                extracted.assets.push(raw);
            } else {
                extracted.outlinks.push(raw);
            }
        }
        extracted
    }
}

/// Errors raised while extracting URLs from a body
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to parse {format} body: {reason}")]
    Parse { format: &'static str, reason: String },
    #[error("Transcode error: {0}")]
    Transcode(String),
    #[error("Failed to read body: {0}")]
    Io(#[from] io::Error),
    #[error("Partial extraction: {failures}")]
    Partial { extracted: Extracted, failures: String },
    #[error("No extractor for content-type={0}")]
    Unsupported(String),
}

impl ExtractError {
    pub fn parse(format: &'static str, reason: impl ToString) -> Self {
        ExtractError::Parse {
            format,
            reason: reason.to_string(),
        }
    }

    /// Build a `Partial` error, or `Ok` when nothing failed
    pub fn partial(extracted: Extracted, failures: Vec<String>) -> Result<Extracted, Self> {
        if failures.is_empty() {
            Ok(extracted)
        } else {
            Err(ExtractError::Partial {
                extracted,
                failures: failures.join("; "),
            })
        }
    }
}

/// A format-specific URL extractor
pub trait Extractor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether the extractor runs in the given capture mode
    fn supports(&self, mode: Mode) -> bool {
        mode == Mode::General
    }

    /// Fast header or pattern check
    fn matches(&self, url: &CrawlUrl) -> bool;

    /// Extract raw asset and outlink strings. Must leave the body rewound.
    fn extract(&self, url: &CrawlUrl, config: &Config) -> Result<Extracted, ExtractError>;
}

/// Priority-ordered extractor selection
pub struct Dispatcher {
    extractors: Vec<Box<dyn Extractor>>,
    link_header: link_header::LinkHeaderExtractor,
}

impl Dispatcher {
    /// Built-in extractors, most specific first
    pub fn new() -> Self {
        Self::with_extractors(vec![
            Box::new(sites::ina::InaExtractor),
            Box::new(sites::truthsocial::TruthSocialExtractor),
            Box::new(sites::facebook::FacebookExtractor),
            Box::new(m3u8::M3u8Extractor),
            Box::new(json::JsonExtractor),
            Box::new(storage::s3::S3Extractor),
            Box::new(storage::azure::AzureExtractor),
            Box::new(xml::SitemapExtractor),
            Box::new(xml::XmlExtractor),
            Box::new(pdf::PdfExtractor),
            Box::new(epub::EpubExtractor),
            Box::new(css::CssExtractor),
            Box::new(html::HtmlExtractor),
        ])
    }

    /// Custom extractor list, in priority order
    pub fn with_extractors(extractors: Vec<Box<dyn Extractor>>) -> Self {
        Self {
            extractors,
            link_header: link_header::LinkHeaderExtractor,
        }
    }

    /// First extractor that accepts the URL in this mode
    pub fn select(&self, url: &CrawlUrl, mode: Mode) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.supports(mode) && e.matches(url))
            .map(|e| e.as_ref())
    }

    /// Run the selected extractor and merge the `Link` header.
    ///
    /// A `Partial` error keeps the header URLs inside the error's payload.
    pub fn extract(
        &self,
        url: &CrawlUrl,
        config: &Config,
        mode: Mode,
    ) -> Result<Extracted, ExtractError> {
        let mut result = match self.select(url, mode) {
            Some(extractor) => {
                debug!(url = %url, extractor = extractor.name(), "Extracting");
                extractor.extract(url, config)
            }
            None => {
                debug!("no extractor for content-type={}", url.mime_type());
                Ok(Extracted::default())
            }
        };

        if self.link_header.matches(url) {
            let from_header = self.link_header.extract(url, config)?;
            match &mut result {
                Ok(extracted) => extracted.merge(from_header),
                Err(ExtractError::Partial { extracted, .. }) => extracted.merge(from_header),
                Err(_) => {}
            }
        }

        result
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole body as text, with invalid UTF-8 replaced
pub(crate) fn body_text(url: &CrawlUrl) -> Result<String, ExtractError> {
    let bytes = url.read_body()?.unwrap_or_default();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
