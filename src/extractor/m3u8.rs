//! HLS playlists (master and media)

use super::{body_text, ExtractError, Extracted, Extractor};
use crate::config::Config;
use crate::urls::mime::ContentKind;
use crate::urls::CrawlUrl;
use regex::Regex;
use std::sync::LazyLock;

static URI_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"URI="([^"]*)""#).expect("static regex"));

/// Parsed playlist references
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Playlist {
    /// Whether `#EXT-X-STREAM-INF` variants were seen
    pub is_master: bool,
    /// Segment or variant URIs, in order
    pub uris: Vec<String>,
    /// `URI="..."` attributes of media, key, map and i-frame tags
    pub alternatives: Vec<String>,
}

/// Parse a playlist. Fails if the `#EXTM3U` header is missing.
pub fn parse_playlist(text: &str) -> Result<Playlist, ExtractError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    match lines.next() {
        Some(first) if first.starts_with("#EXTM3U") => {}
        _ => return Err(ExtractError::parse("m3u8", "missing #EXTM3U header")),
    }

    let mut playlist = Playlist::default();
    for line in lines {
        if let Some(tag) = line.strip_prefix('#') {
            if tag.starts_with("EXT-X-STREAM-INF") {
                playlist.is_master = true;
            }
            if tag.starts_with("EXT") {
                for caps in URI_ATTRIBUTE.captures_iter(tag) {
                    if let Some(uri) = caps.get(1).map(|m| m.as_str().trim()) {
                        if !uri.is_empty() {
                            playlist.alternatives.push(uri.to_string());
                        }
                    }
                }
            }
        } else {
            playlist.uris.push(line.to_string());
        }
    }
    Ok(playlist)
}

pub struct M3u8Extractor;

impl Extractor for M3u8Extractor {
    fn name(&self) -> &'static str {
        "m3u8"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        ContentKind::from_mime(&url.mime_type()) == ContentKind::M3u8
            || url.parsed().path().to_ascii_lowercase().ends_with(".m3u8")
    }

    fn extract(&self, url: &CrawlUrl, _config: &Config) -> Result<Extracted, ExtractError> {
        let playlist = parse_playlist(&body_text(url)?)?;
        let base = url
            .response()
            .map(|r| r.request_url.clone())
            .unwrap_or_else(|| url.parsed().clone());

        let assets = playlist
            .uris
            .iter()
            .chain(playlist.alternatives.iter())
            .filter_map(|raw| base.join(raw).ok())
            .map(|u| u.to_string())
            .collect();
        Ok(Extracted::new(assets, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::testing::archived;

    const MASTER: &str = "#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aac\",NAME=\"en\",URI=\"audio/en.m3u8\"
#EXT-X-STREAM-INF:BANDWIDTH=1280000,AUDIO=\"aac\"
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2560000,AUDIO=\"aac\"
https://cdn.example.com/hi/index.m3u8
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"
#EXTINF:9.009,
segment0.ts
#EXTINF:9.009,
segment1.ts
#EXT-X-ENDLIST
";

    #[test]
    fn parses_master_playlist() {
        let playlist = parse_playlist(MASTER).unwrap();
        assert!(playlist.is_master);
        assert_eq!(playlist.uris, vec!["low/index.m3u8", "https://cdn.example.com/hi/index.m3u8"]);
        assert_eq!(playlist.alternatives, vec!["audio/en.m3u8"]);
    }

    #[test]
    fn media_segments_resolve_against_request_url() {
        let url = archived(
            "https://example.com/video/index.m3u8",
            &[("Content-Type", "application/vnd.apple.mpegurl")],
            MEDIA.as_bytes(),
        );
        assert!(M3u8Extractor.matches(&url));
        let extracted = M3u8Extractor.extract(&url, &Config::default()).unwrap();
        assert_eq!(
            extracted.assets,
            vec![
                "https://example.com/video/segment0.ts",
                "https://example.com/video/segment1.ts",
                "https://example.com/video/key.bin",
            ]
        );
        assert_eq!(url.body_position(), Some(0));
    }

    #[test]
    fn missing_header_is_a_parse_error() {
        assert!(matches!(parse_playlist("segment.ts"), Err(ExtractError::Parse { .. })));
    }
}
