//! Crawl scope, asset capture, trap detection and seen-check configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hop, redirect and scope limits plus worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Maximum outlink hops from a seed
    pub max_hops: u32,
    /// Maximum length of a redirect chain
    pub max_redirect: u32,
    /// Domain-scope mode: domain suffixes (`example.com`) or URL prefixes
    /// (`https://example.com/blog/`). Empty disables the mode.
    pub domains_crawl: Vec<String>,
    /// Postprocessor pool size (0 = number of CPUs)
    pub workers_count: usize,
    /// Headless capture mode
    pub headless: bool,
    /// Capacity of the bounded item channels
    pub channel_capacity: usize,
}

impl CrawlConfig {
    /// Whether domain-scope mode is on
    pub fn domains_crawl_enabled(&self) -> bool {
        !self.domains_crawl.is_empty()
    }

    /// Effective worker count
    pub fn workers(&self) -> usize {
        if self.workers_count == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.workers_count
        }
    }

    /// Whether a URL falls inside the configured domain scope
    pub fn matches_domain_scope(&self, url: &url::Url) -> bool {
        let host = url.host_str().unwrap_or_default();
        self.domains_crawl.iter().any(|entry| {
            let entry = entry.trim();
            if entry.starts_with("http://") || entry.starts_with("https://") {
                url.as_str().starts_with(entry)
            } else {
                let entry = entry.trim_start_matches("*.");
                host == entry
                    || host
                        .strip_suffix(entry)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
        })
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_hops: 0,
            max_redirect: 20,
            domains_crawl: Vec::new(),
            workers_count: 0,
            headless: false,
            channel_capacity: 128,
        }
    }
}

/// Asset capture and link extraction options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Skip asset extraction entirely
    pub disable_assets_capture: bool,
    /// HTML tags ignored during HTML extraction (`a`, `script`, `style`, ...)
    pub disable_html_tag: Vec<String>,
    /// Cap on assets per item (0 = unlimited)
    pub max_assets: usize,
    /// Cap on outlinks per item (0 = unlimited)
    pub max_outlinks: usize,
    /// Extension whitelist; when non-empty the blacklist is ignored
    pub allowed_file_types: Vec<String>,
    /// Extension blacklist
    pub disallowed_file_types: Vec<String>,
    /// Use the strict (scheme-anchored) URL regex for text scanning
    pub strict_regex: bool,
}

impl AssetsConfig {
    /// Whether extraction must skip a given HTML tag
    pub fn is_tag_disabled(&self, tag: &str) -> bool {
        self.disable_html_tag
            .iter()
            .any(|t| t.trim().eq_ignore_ascii_case(tag))
    }
}

/// Path-loop trap detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapConfig {
    /// Repeat count above which a segment or `key=value` pair marks a trap (0 disables)
    pub max_segment_repetition: usize,
    /// In paths of 10+ segments, how many distinct segments at the repetition
    /// limit mark a trap
    pub max_segment_repetition_threshold: usize,
}

impl Default for TrapConfig {
    fn default() -> Self {
        Self {
            max_segment_repetition: 3,
            max_segment_repetition_threshold: 3,
        }
    }
}

/// Seen-check store location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeenCheckConfig {
    /// sled directory; `None` opens a temporary store
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn domain_scope_matches_suffix_and_prefix() {
        let cfg = CrawlConfig {
            domains_crawl: vec!["example.com".into(), "https://other.org/blog/".into()],
            ..CrawlConfig::default()
        };
        assert!(cfg.matches_domain_scope(&Url::parse("https://example.com/a").unwrap()));
        assert!(cfg.matches_domain_scope(&Url::parse("https://www.example.com/a").unwrap()));
        assert!(!cfg.matches_domain_scope(&Url::parse("https://notexample.com/").unwrap()));
        assert!(cfg.matches_domain_scope(&Url::parse("https://other.org/blog/post").unwrap()));
        assert!(!cfg.matches_domain_scope(&Url::parse("https://other.org/shop").unwrap()));
    }

    #[test]
    fn disabled_tags_are_case_insensitive() {
        let cfg = AssetsConfig {
            disable_html_tag: vec!["Script".into()],
            ..AssetsConfig::default()
        };
        assert!(cfg.is_tag_disabled("script"));
        assert!(!cfg.is_tag_disabled("img"));
    }

    #[test]
    fn zero_workers_means_cpu_count() {
        let cfg = CrawlConfig::default();
        assert!(cfg.workers() >= 1);
        let cfg = CrawlConfig {
            workers_count: 3,
            ..CrawlConfig::default()
        };
        assert_eq!(cfg.workers(), 3);
    }
}
