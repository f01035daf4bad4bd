//! Site-specific rules
//!
//! Postprocess side: extractors that synthesize API or embed URLs for a
//! few hosts and merge them with the ordinary extraction of the page.
//! Preprocess side: extra request headers some hosts need.

pub mod facebook;
pub mod headers;
pub mod ina;
pub mod truthsocial;

pub use headers::request_headers;

use crate::urls::CrawlUrl;

/// Host equal to `domain` or one of its subdomains
fn host_is(url: &CrawlUrl, domain: &str) -> bool {
    let host = url.host().to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
