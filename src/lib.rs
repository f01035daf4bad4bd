//! Archivist: postprocessing core of a web-archiving crawler
//!
//! Given an archived resource (URL, response and buffered body), the core:
//! - extracts assets and outlinks from HTML, CSS, JSON, XML, sitemaps, M3U8,
//!   PDF, EPUB, S3/Azure listings, `Link` headers and a few site rules
//! - resolves, sanitizes and filters them (file types, caps, traps, seen-check)
//! - decides what happens to the item next (complete, redirect, children)
//! - runs that decision machine on a bounded worker pool

pub mod config;
pub mod extractor;
pub mod filter;
pub mod item;
pub mod postprocess;
pub mod seencheck;
pub mod urls;
pub mod util;

pub use config::Config;
pub use item::{Item, ItemStatus, ItemTree};
pub use postprocess::{Env, Postprocessor, PostprocessorPool};
pub use urls::CrawlUrl;
