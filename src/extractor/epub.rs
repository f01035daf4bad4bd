//! EPUB books
//!
//! container.xml points at the OPF package; the manifest maps ids to files
//! and the spine lists the reading order. Media and stylesheets from the
//! manifest are emitted as in-book paths, and links leaving the book are
//! collected from every spine document.

use super::{ExtractError, Extracted, Extractor};
use crate::config::Config;
use crate::urls::mime::{self, ContentKind};
use crate::urls::CrawlUrl;
use percent_encoding::percent_decode_str;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::{Html, Selector};
use std::io::{Cursor, Read, Seek};
use url::Url;
use zip::ZipArchive;

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// One `<item>` of the OPF manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// Path inside the archive, resolved against the OPF directory
    pub path: String,
    pub media_type: String,
}

/// Manifest and spine of an OPF package
#[derive(Debug, Default)]
pub struct Package {
    pub manifest: Vec<ManifestItem>,
    /// Manifest ids in reading order
    pub spine: Vec<String>,
}

impl Package {
    fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }
}

pub struct EpubExtractor;

impl Extractor for EpubExtractor {
    fn name(&self) -> &'static str {
        "epub"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        let mime_type = url.mime_type();
        ContentKind::from_mime(&mime_type) == ContentKind::Epub
            || (mime_type == mime::APPLICATION_ZIP
                && url.parsed().path().to_ascii_lowercase().ends_with(".epub"))
    }

    fn extract(&self, url: &CrawlUrl, _config: &Config) -> Result<Extracted, ExtractError> {
        let bytes = url.read_body()?.unwrap_or_default();
        extract_epub(&bytes, url.parsed())
    }
}

/// Extract assets and outlinks from EPUB bytes fetched from `outer`
pub fn extract_epub(bytes: &[u8], outer: &Url) -> Result<Extracted, ExtractError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::parse("epub", e))?;

    let opf_path = match read_entry(&mut archive, CONTAINER_PATH)
        .ok()
        .and_then(|container| rootfile_path(&container))
    {
        Some(path) => path,
        None => archive
            .file_names()
            .find(|name| name.to_ascii_lowercase().ends_with(".opf"))
            .map(str::to_string)
            .ok_or_else(|| ExtractError::parse("epub", "no OPF package found"))?,
    };

    let opf = read_entry(&mut archive, &opf_path).map_err(|e| ExtractError::parse("epub", e))?;
    let package = parse_package(&opf, parent_dir(&opf_path))?;

    let mut extracted = Extracted::default();
    let mut failures = Vec::new();

    for item in &package.manifest {
        if is_media(&item.media_type) {
            extracted.assets.push(item.path.clone());
        }
    }

    let mut book_root = outer.clone();
    book_root.set_query(None);
    book_root.set_fragment(None);
    let prefix = format!("{}/", book_root.as_str().trim_end_matches('/'));

    let selector = Selector::parse("a[href]")
        .map_err(|e| ExtractError::parse("epub", format!("selector: {:?}", e)))?;

    for idref in &package.spine {
        let Some(item) = package.item(idref) else {
            failures.push(format!("spine item {} missing from manifest", idref));
            continue;
        };
        let html = match read_entry(&mut archive, &item.path) {
            Ok(html) => html,
            Err(e) => {
                failures.push(format!("{}: {}", item.path, e));
                continue;
            }
        };
        let Ok(base) = Url::parse(&format!("{}{}", prefix, item.path)) else {
            failures.push(format!("{}: cannot build base URL", item.path));
            continue;
        };

        let document = Html::parse_document(&html);
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Ok(link) = base.join(href.trim()) else {
                continue;
            };
            let web = link.scheme() == "http" || link.scheme() == "https";
            if web && !link.as_str().starts_with(&prefix) {
                extracted.outlinks.push(link.to_string());
            }
        }
    }

    ExtractError::partial(extracted, failures)
}

fn is_media(media_type: &str) -> bool {
    let media_type = media_type.to_ascii_lowercase();
    media_type.starts_with("image/")
        || media_type.starts_with("audio/")
        || media_type.starts_with("video/")
        || media_type.contains("font")
        || media_type == mime::TEXT_CSS
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String, String> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| format!("zip entry failed: {e}"))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| format!("zip read failed: {e}"))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// `full-path` of the first `<rootfile>` in container.xml
fn rootfile_path(container: &str) -> Option<String> {
    let mut reader = Reader::from_str(container);
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                return attribute(e, b"full-path").filter(|p| !p.is_empty());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Parse the OPF manifest and spine; hrefs are resolved against `opf_dir`
pub fn parse_package(opf: &str, opf_dir: &str) -> Result<Package, ExtractError> {
    let mut reader = Reader::from_str(opf);
    let mut package = Package::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"item" => {
                    let (Some(id), Some(href)) = (attribute(e, b"id"), attribute(e, b"href")) else {
                        continue;
                    };
                    package.manifest.push(ManifestItem {
                        id,
                        path: join_path(opf_dir, &href),
                        media_type: attribute(e, b"media-type").unwrap_or_default(),
                    });
                }
                b"itemref" => {
                    if let Some(idref) = attribute(e, b"idref") {
                        package.spine.push(idref);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::parse(
                    "epub",
                    format!("OPF error at position {}: {}", reader.error_position(), e),
                ))
            }
            _ => {}
        }
    }

    Ok(package)
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve a manifest href against a directory inside the archive
fn join_path(dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    let href = percent_decode_str(href).decode_utf8_lossy();

    let mut parts: Vec<&str> = if href.starts_with('/') {
        Vec::new()
    } else {
        dir.split('/').filter(|s| !s.is_empty()).collect()
    };
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}
