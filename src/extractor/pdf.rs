//! PDF link annotations
//!
//! Walks every object for `/Subtype /Link` annotations and reads the URI
//! action. Non-web schemes are dropped.

use super::{ExtractError, Extracted, Extractor};
use crate::config::Config;
use crate::urls::mime::ContentKind;
use crate::urls::CrawlUrl;
use lopdf::{Dictionary, Document, Object};

const DROPPED_SCHEMES: [&str; 3] = ["mailto:", "tel:", "file:"];

pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn matches(&self, url: &CrawlUrl) -> bool {
        ContentKind::from_mime(&url.mime_type()) == ContentKind::Pdf
    }

    fn extract(&self, url: &CrawlUrl, _config: &Config) -> Result<Extracted, ExtractError> {
        let bytes = url.read_body()?.unwrap_or_default();
        extract_pdf(&bytes)
    }
}

/// Link annotation URIs of a PDF document, all as outlinks
pub fn extract_pdf(bytes: &[u8]) -> Result<Extracted, ExtractError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractError::parse("pdf", e))?;

    let mut outlinks = Vec::new();
    let mut failures = Vec::new();

    for (id, object) in &doc.objects {
        let Ok(dict) = object.as_dict() else {
            continue;
        };
        if !is_link_annotation(dict) {
            continue;
        }
        match link_uri(&doc, dict) {
            Ok(Some(uri)) => {
                let lower = uri.to_ascii_lowercase();
                if !DROPPED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
                    outlinks.push(uri);
                }
            }
            Ok(None) => {}
            Err(e) => failures.push(format!("annotation {} {}: {}", id.0, id.1, e)),
        }
    }

    ExtractError::partial(Extracted::new(Vec::new(), outlinks), failures)
}

fn is_link_annotation(dict: &Dictionary) -> bool {
    dict.get(b"Subtype")
        .and_then(Object::as_name)
        .map(|name| name == b"Link")
        .unwrap_or(false)
}

/// URI of the annotation's action, if it has a URI action
fn link_uri(doc: &Document, annotation: &Dictionary) -> Result<Option<String>, lopdf::Error> {
    let Ok(action) = annotation.get(b"A") else {
        return Ok(None);
    };
    let action = deref(doc, action)?.as_dict()?;
    let Ok(uri) = action.get(b"URI") else {
        return Ok(None);
    };
    match deref(doc, uri)? {
        Object::String(bytes, _) => {
            let uri = String::from_utf8_lossy(bytes).trim().to_string();
            Ok((!uri.is_empty()).then_some(uri))
        }
        _ => Ok(None),
    }
}

fn deref<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, lopdf::Error> {
    match object {
        Object::Reference(id) => doc.get_object(*id),
        other => Ok(other),
    }
}
