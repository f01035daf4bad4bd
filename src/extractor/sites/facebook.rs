//! Facebook posts
//!
//! Post pages require a login wall; the public embed plugin renders the
//! same post without one.

use super::host_is;
use crate::config::Config;
use crate::extractor::html::extract_html;
use crate::extractor::{ExtractError, Extracted, Extractor};
use crate::urls::mime::ContentKind;
use crate::urls::CrawlUrl;
use url::form_urlencoded;

const POST_MARKERS: [&str; 4] = ["/posts/", "/videos/", "/permalink.php", "/photo"];

pub struct FacebookExtractor;

impl Extractor for FacebookExtractor {
    fn name(&self) -> &'static str {
        "facebook"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        host_is(url, "facebook.com")
            && ContentKind::from_mime(&url.mime_type()) == ContentKind::Html
            && is_post(url.parsed().path())
    }

    fn extract(&self, url: &CrawlUrl, config: &Config) -> Result<Extracted, ExtractError> {
        let mut extracted = extract_html(url, config)?;
        extracted.assets.push(embed_url(url.parsed().as_str()));
        Ok(extracted)
    }
}

fn is_post(path: &str) -> bool {
    POST_MARKERS.iter().any(|m| path.contains(m))
}

/// Embed plugin URL rendering the post at `href`
pub fn embed_url(href: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("href", href)
        .append_pair("show_text", "true")
        .finish();
    format!("https://www.facebook.com/plugins/post.php?{query}")
}
