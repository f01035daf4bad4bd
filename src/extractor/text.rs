//! URL scanning in free text and script bodies

use super::json::collect_urls;
use regex::Regex;
use std::sync::LazyLock;

static STRICT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>\\{}|^`\[\]]+"#).expect("static regex")
});

// Absolute and protocol-relative URLs, plus quoted root- or dot-relative paths
static RELAXED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:https?:)?//[^\s"'<>\\{}|^`\[\]]+|["'`](\.{0,2}/[^\s"'`<>\\]+)["'`]"#)
        .expect("static regex")
});

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '\''];

/// URL-shaped substrings of `text`
pub fn find_urls(text: &str, strict: bool) -> Vec<String> {
    let regex = if strict { &*STRICT_URL } else { &*RELAXED_URL };
    regex
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION))
        .filter(|s| s.len() > 2 && s != &"//")
        .map(str::to_string)
        .collect()
}

/// Locate the first `=` and decode the balanced `{...}` that follows it,
/// as in `window.__STATE__ = {...};`. Returns the URLs inside.
pub fn assigned_json_urls(script: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let Some(eq) = script.find('=') else {
        return urls;
    };
    let rest = &script[eq + 1..];
    let Some(start) = rest.find('{') else {
        return urls;
    };
    let Some(object) = balanced_object(&rest[start..]) else {
        return urls;
    };
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(object) {
        collect_urls(&value, &mut urls);
    }
    urls
}

/// Prefix of `s` (starting at `{`) up to its matching `}`
fn balanced_object(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
