//! Extra request headers for hosts that gate content behind cookies or referers

use url::Url;

/// Headers the fetcher should add when requesting `url`
pub fn request_headers(url: &Url) -> Vec<(&'static str, String)> {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

    if host == "reddit.com" || host.ends_with(".reddit.com") {
        vec![("Cookie", "over18=1".to_string())]
    } else if host == "tiktok.com" || host.ends_with(".tiktok.com") {
        vec![
            ("Referer", "https://www.tiktok.com/".to_string()),
            ("Accept-Language", "en-US,en;q=0.9".to_string()),
        ]
    } else if host == "npr.org" || host.ends_with(".npr.org") {
        vec![("Cookie", "trackingChoice=true; choiceVersion=1".to_string())]
    } else {
        Vec::new()
    }
}
