//! Crawl trap detection
//!
//! Flags URLs whose path or query repeats itself:
//! - a path segment or `key=value` pair seen more than the repetition limit
//!   (e.g. `/a/b/a/b/a/b/a/b`)
//! - deep paths (10+ segments) where several distinct segments each reach
//!   the limit

use crate::config::TrapConfig;
use std::collections::HashMap;
use url::Url;

/// Paths with at least this many segments get the distinct-segment check
const DEEP_PATH_SEGMENTS: usize = 10;

/// Detect if a URL is likely a crawl trap
pub fn is_trap(url: &Url, config: &TrapConfig) -> bool {
    has_path_loop(url.path(), url.query().unwrap_or_default(), config)
}

/// Repetition check over path segments and query pairs
pub fn has_path_loop(path: &str, query: &str, config: &TrapConfig) -> bool {
    let limit = config.max_segment_repetition;
    if limit == 0 {
        return false;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let segment_counts = count(segments.iter().copied());
    if segment_counts.values().any(|&n| n > limit) {
        return true;
    }

    if segments.len() >= DEEP_PATH_SEGMENTS {
        let at_limit = segment_counts.values().filter(|&&n| n >= limit).count();
        if at_limit >= config.max_segment_repetition_threshold {
            return true;
        }
    }

    let pairs = query.split('&').filter(|p| !p.is_empty());
    count(pairs).values().any(|&n| n > limit)
}

fn count<'a>(items: impl Iterator<Item = &'a str>) -> HashMap<&'a str, usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
}
