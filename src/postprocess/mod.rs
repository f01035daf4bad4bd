//! Postprocess decision machine
//!
//! Runs over the archived nodes of a seed's tree. For each one it decides
//! whether to follow a redirect, stop because of depth or capture settings,
//! or extract: assets become children of the node, outlinks become new
//! seed trees handed back to the caller.

mod pool;
mod types;

pub use pool::{PoolError, PostprocessorPool};
pub use types::{Env, Stats, StatsSnapshot};

use crate::extractor::{Dispatcher, ExtractError, Extracted, Mode};
use crate::filter::{is_trap, sanitize, LinkKind};
use crate::item::{Item, ItemError, ItemSource, ItemStatus, ItemTree, NodeId};
use crate::seencheck::SeenKind;
use crate::urls::mime::ContentKind;
use crate::urls::{encode_query, normalize, CrawlUrl};
use crate::util::truncate_str;
use tracing::{debug, error, trace, warn};
use url::Url;

/// Depth past which assets are no longer extracted, outside domain-scope mode
const MAX_ASSET_DEPTH: usize = 2;

/// Per-item postprocessing, shared by all workers
pub struct Postprocessor {
    env: Env,
    dispatcher: Dispatcher,
    mode: Mode,
}

impl Postprocessor {
    pub fn new(env: Env) -> Self {
        Self::with_dispatcher(env, Dispatcher::new())
    }

    pub fn with_dispatcher(env: Env, dispatcher: Dispatcher) -> Self {
        let mode = Mode::from_config(&env.config);
        Self {
            env,
            dispatcher,
            mode,
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Process every archived node of the tree, returning the outlink seeds
    pub fn process_tree(&self, tree: &mut ItemTree) -> Vec<ItemTree> {
        let archived: Vec<NodeId> = tree
            .dfs(ItemTree::ROOT)
            .into_iter()
            .filter(|&id| tree.get(id).is_ok_and(|i| i.status == ItemStatus::Archived))
            .collect();

        let mut outlinks = Vec::new();
        for id in archived {
            match self.process(tree, id) {
                Ok(mut found) => outlinks.append(&mut found),
                Err(e) => error!(node = id, error = %e, "Postprocessing failed"),
            }
        }
        outlinks
    }

    /// Run the decision machine on one archived node
    pub fn process(&self, tree: &mut ItemTree, id: NodeId) -> Result<Vec<ItemTree>, ItemError> {
        let item = tree.get_mut(id)?;
        if item.status != ItemStatus::Archived {
            trace!(item = %item.short_id(), status = %item.status, "Skipping non-archived item");
            return Ok(Vec::new());
        }
        item.status = ItemStatus::PostProcessed;
        self.env.stats.record_item();

        let outlinks = self.decide(tree, id)?;

        let item = tree.get_mut(id)?;
        item.url.release();
        if item.children().is_empty()
            && item.redirection.is_none()
            && item.status != ItemStatus::Failed
        {
            item.status = ItemStatus::Completed;
        }
        Ok(outlinks)
    }

    fn decide(&self, tree: &mut ItemTree, id: NodeId) -> Result<Vec<ItemTree>, ItemError> {
        let config = &self.env.config;
        let domains_crawl = config.crawl.domains_crawl_enabled();
        let item = tree.get(id)?;
        let short_id = item.short_id();

        if item.url.response().is_some_and(|r| r.is_redirect()) {
            self.follow_redirect(tree, id)?;
            return Ok(Vec::new());
        }

        if !domains_crawl {
            let depth = tree.depth_without_redirections(id)?;
            if depth > MAX_ASSET_DEPTH && !self.is_embedded_css(tree, id)? {
                debug!(item = %short_id, depth, "Depth limit reached, completing");
                return Ok(Vec::new());
            }
            if depth == 1 && item.url.mime_type().contains("html") {
                debug!(item = %short_id, "HTML asset, skipping extraction");
                return Ok(Vec::new());
            }
        }

        if config.assets.disable_assets_capture && !domains_crawl {
            debug!(item = %short_id, "Assets capture disabled, completing");
            return Ok(Vec::new());
        }

        let hops = item.url.hops();
        let capture_assets = !config.assets.disable_assets_capture;
        let capture_outlinks = domains_crawl || hops < config.crawl.max_hops;

        // Both phases read the body; a 2xx without one has nothing to extract
        if !item.url.has_body() {
            trace!(item = %short_id, "No body to extract from");
            return Ok(Vec::new());
        }

        let extracted = match self.dispatcher.extract(&item.url, config, self.mode) {
            Ok(extracted) => extracted,
            Err(ExtractError::Partial {
                extracted,
                failures,
            }) => {
                warn!(item = %short_id, url = %item.url, failures = %failures, "Partial extraction");
                self.env.stats.record_extractor_error();
                tree.get_mut(id)?.error = Some(failures);
                extracted
            }
            Err(e) => {
                if matches!(e, ExtractError::Transcode(_)) {
                    warn!(item = %short_id, url = %item.url, error = %e, "Extraction failed");
                } else {
                    error!(item = %short_id, url = %item.url, error = %e, "Extraction failed");
                }
                self.env.stats.record_extractor_error();
                tree.get_mut(id)?.error = Some(e.to_string());
                return Ok(Vec::new());
            }
        };

        let Extracted { assets, outlinks } = extracted;
        let item = tree.get(id)?;
        let assets = if capture_assets {
            self.admit(&item.url, assets, LinkKind::Asset)
        } else {
            Vec::new()
        };
        let outlinks = if capture_outlinks {
            self.admit(&item.url, outlinks, LinkKind::Outlink)
        } else {
            Vec::new()
        };
        let seed_via = item.url.raw().to_string();

        let mut attached = 0;
        for asset in assets {
            let child = Item::new(CrawlUrl::from_url(asset).with_hops(hops), ItemSource::Postprocess);
            tree.add_child(id, child, ItemStatus::GotChildren)?;
            attached += 1;
        }
        self.env.stats.record_assets(attached);

        let mut seeds = Vec::new();
        for outlink in outlinks {
            let outlink_hops = if domains_crawl && config.crawl.matches_domain_scope(&outlink) {
                0
            } else if domains_crawl && hops >= config.crawl.max_hops {
                trace!(url = %outlink, "Out of scope and over the hop limit");
                continue;
            } else {
                hops + 1
            };
            let seed = Item::new(
                CrawlUrl::from_url(outlink).with_hops(outlink_hops),
                ItemSource::Postprocess,
            )
            .with_seed_via(seed_via.clone());
            seeds.push(ItemTree::new(seed)?);
        }
        self.env.stats.record_outlinks(seeds.len());

        debug!(
            item = %short_id,
            assets = attached,
            outlinks = seeds.len(),
            "Postprocessed"
        );
        Ok(seeds)
    }

    /// Attach the `Location` target as a redirected child
    fn follow_redirect(&self, tree: &mut ItemTree, id: NodeId) -> Result<(), ItemError> {
        let item = tree.get(id)?;
        let short_id = item.short_id();

        if item.url.redirects() >= self.env.config.crawl.max_redirect {
            debug!(item = %short_id, redirects = item.url.redirects(), "Redirect limit reached");
            return Ok(());
        }

        let location = item
            .url
            .response()
            .and_then(|r| r.header("Location"))
            .map(str::to_string);
        let Some(location) = location else {
            let item = tree.get_mut(id)?;
            item.status = ItemStatus::Failed;
            item.error = Some("redirect response without Location header".to_string());
            return Ok(());
        };

        let target = match normalize(&location, Some(item.url.parsed())) {
            Ok(target) => target,
            Err(e) => {
                debug!(item = %short_id, location = %location, error = %e, "Invalid redirect target");
                let item = tree.get_mut(id)?;
                item.status = ItemStatus::Failed;
                item.error = Some(e.to_string());
                return Ok(());
            }
        };

        let child = CrawlUrl::from_url(target)
            .with_hops(item.url.hops())
            .with_redirects(item.url.redirects() + 1);
        tree.add_child(id, Item::new(child, ItemSource::Postprocess), ItemStatus::GotRedirected)?;
        self.env.stats.record_redirect();
        Ok(())
    }

    /// Resolve, sanitize, trap-check and seen-check raw URLs from `parent`
    fn admit(&self, parent: &CrawlUrl, raw: Vec<String>, kind: LinkKind) -> Vec<Url> {
        let encoding = parent.document_encoding().filter(|e| *e != encoding_rs::UTF_8);
        let resolved: Vec<Url> = raw
            .iter()
            .filter_map(|r| match parent.resolve(r) {
                Ok(mut url) => {
                    if let Some(encoding) = encoding {
                        encode_query(&mut url, encoding);
                    }
                    Some(url)
                }
                Err(e) => {
                    trace!(raw = %r, error = %e, "Dropping unresolvable URL");
                    None
                }
            })
            .collect();

        let seen_kind = match kind {
            LinkKind::Asset => SeenKind::Asset,
            LinkKind::Outlink => SeenKind::Seed,
        };

        sanitize(resolved, parent.parsed(), kind, &self.env.config.assets)
            .into_iter()
            .filter(|url| {
                if is_trap(url, &self.env.config.traps) {
                    debug!(url = %truncate_str(url.as_str(), 200), "Trap detected");
                    self.env.stats.record_trap();
                    return false;
                }
                match self.env.seencheck.admit(url, seen_kind) {
                    Ok(true) => true,
                    Ok(false) => {
                        self.env.stats.record_seen();
                        false
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Seen-check failed, admitting");
                        true
                    }
                }
            })
            .collect()
    }

    /// Whether a CSS node descends, through `@import`s, from an HTML page.
    ///
    /// Redirected ancestors are transparent.
    pub fn is_embedded_css(&self, tree: &ItemTree, id: NodeId) -> Result<bool, ItemError> {
        if ContentKind::from_mime(&tree.get(id)?.url.mime_type()) != ContentKind::Css {
            return Ok(false);
        }
        for ancestor in tree.ancestors(id)? {
            let item = tree.get(ancestor)?;
            if item.status == ItemStatus::GotRedirected {
                continue;
            }
            match ContentKind::from_mime(&item.url.mime_type()) {
                ContentKind::Css => continue,
                ContentKind::Html => return Ok(true),
                _ => return Ok(false),
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::seencheck::SeenCheck;
    use crate::urls::{Body, Response};

    fn env(config: Config) -> Env {
        Env::with_seencheck(config, SeenCheck::open(None).unwrap())
    }

    fn archived(raw: &str, status: u16, headers: &[(&str, &str)], body: Option<&[u8]>) -> Item {
        let mut url = CrawlUrl::parse(raw).unwrap();
        let mut response = Response::new(status, url.parsed().clone());
        for (k, v) in headers {
            response = response.with_header(*k, *v);
        }
        url.set_response(response);
        if let Some(body) = body {
            url.set_body(Body::from_bytes(body).unwrap());
        }
        Item::new(url, ItemSource::Insert).with_status(ItemStatus::Archived)
    }

    fn child_urls(tree: &ItemTree, id: NodeId) -> Vec<String> {
        tree.get(id)
            .unwrap()
            .children()
            .iter()
            .map(|&c| tree.get(c).unwrap().url.raw().to_string())
            .collect()
    }

    const PAGE: &[u8] = br#"<html><head><link href="style.css"></head><body><img src="img.png"><a href="/next">next</a></body></html>"#;

    #[test]
    fn test_html_seed_gets_assets_as_children() {
        let pp = Postprocessor::new(env(Config::default()));
        let mut tree = ItemTree::new(archived(
            "http://example.com",
            200,
            &[("Content-Type", "text/html")],
            Some(PAGE),
        ))
        .unwrap();

        let outlinks = pp.process_tree(&mut tree);

        let children = child_urls(&tree, ItemTree::ROOT);
        assert!(children.contains(&"http://example.com/style.css".to_string()));
        assert!(children.contains(&"http://example.com/img.png".to_string()));
        assert!(outlinks.is_empty(), "max_hops = 0 emits no outlinks");
        assert_eq!(tree.root().status, ItemStatus::GotChildren);
        for &c in tree.root().children() {
            let child = tree.get(c).unwrap();
            assert_eq!(child.url.hops(), 0);
            assert_eq!(child.status, ItemStatus::Fresh);
        }
        assert!(!tree.root().url.has_body(), "body is released");
    }

    #[test]
    fn test_outlinks_get_next_hop() {
        let mut config = Config::default();
        config.crawl.max_hops = 2;
        let pp = Postprocessor::new(env(config));
        let mut tree = ItemTree::new(archived(
            "http://example.com/",
            200,
            &[("Content-Type", "text/html")],
            Some(PAGE),
        ))
        .unwrap();

        let outlinks = pp.process_tree(&mut tree);
        assert_eq!(outlinks.len(), 1);
        let seed = outlinks[0].root();
        assert_eq!(seed.url.raw(), "http://example.com/next");
        assert_eq!(seed.url.hops(), 1);
        assert_eq!(seed.seed_via.as_deref(), Some("http://example.com/"));
        assert_eq!(pp.env().stats.snapshot().outlinks_emitted, 1);
    }

    #[test]
    fn test_domains_crawl_resets_hops() {
        let mut config = Config::default();
        config.crawl.domains_crawl = vec!["example.com".into()];
        config.crawl.max_hops = 1;
        let pp = Postprocessor::new(env(config));
        let mut seed = archived(
            "http://example.com/",
            200,
            &[("Content-Type", "text/html")],
            Some(br#"<a href="/in">in</a><a href="http://other.org/out">out</a>"#),
        );
        seed.url.set_hops(1);
        let mut tree = ItemTree::new(seed).unwrap();

        let outlinks = pp.process_tree(&mut tree);
        let urls: Vec<(&str, u32)> = outlinks
            .iter()
            .map(|t| (t.root().url.raw(), t.root().url.hops()))
            .collect();
        assert_eq!(urls, vec![("http://example.com/in", 0)]);
    }

    #[test]
    fn test_redirect_becomes_child() {
        let pp = Postprocessor::new(env(Config::default()));
        let mut tree = ItemTree::new(archived(
            "http://example.com/old",
            301,
            &[("Location", "/new")],
            None,
        ))
        .unwrap();

        assert!(pp.process_tree(&mut tree).is_empty());
        assert_eq!(tree.root().status, ItemStatus::GotRedirected);
        let target = tree.get(tree.root().redirection.unwrap()).unwrap();
        assert_eq!(target.url.raw(), "http://example.com/new");
        assert_eq!(target.url.redirects(), 1);
    }

    #[test]
    fn test_redirect_limit_completes() {
        let mut config = Config::default();
        config.crawl.max_redirect = 1;
        let pp = Postprocessor::new(env(config));
        let mut item = archived("http://example.com/loop", 302, &[("Location", "/loop2")], None);
        item.url = item.url.clone().with_redirects(1);
        let mut tree = ItemTree::new(item).unwrap();

        pp.process_tree(&mut tree);
        assert_eq!(tree.root().status, ItemStatus::Completed);
        assert!(tree.root().children().is_empty());
    }

    #[test]
    fn test_redirect_without_location_fails() {
        let pp = Postprocessor::new(env(Config::default()));
        let mut tree =
            ItemTree::new(archived("http://example.com/old", 302, &[], None)).unwrap();

        pp.process_tree(&mut tree);
        assert_eq!(tree.root().status, ItemStatus::Failed);
        assert!(tree.root().error.is_some());
    }

    #[test]
    fn test_html_asset_is_not_extracted() {
        let pp = Postprocessor::new(env(Config::default()));
        let mut tree = ItemTree::new(
            Item::new(CrawlUrl::parse("http://example.com/").unwrap(), ItemSource::Insert)
                .with_status(ItemStatus::GotChildren),
        )
        .unwrap();
        let frame = tree
            .add_child(
                ItemTree::ROOT,
                archived("http://example.com/frame.html", 200, &[("Content-Type", "text/html")], Some(PAGE)),
                ItemStatus::GotChildren,
            )
            .unwrap();

        pp.process_tree(&mut tree);
        let frame = tree.get(frame).unwrap();
        assert_eq!(frame.status, ItemStatus::Completed);
        assert!(frame.children().is_empty());
    }

    #[test]
    fn test_embedded_css_chain_passes_depth_gate() {
        let pp = Postprocessor::new(env(Config::default()));
        let mut tree = ItemTree::new(
            archived("http://example.com/", 200, &[("Content-Type", "text/html")], None)
                .with_status(ItemStatus::GotChildren),
        )
        .unwrap();
        let css = |raw: &str, body: &[u8]| {
            archived(raw, 200, &[("Content-Type", "text/css")], Some(body)).with_status(ItemStatus::GotChildren)
        };
        let a = tree
            .add_child(ItemTree::ROOT, css("http://example.com/a.css", b"@import 'b.css';"), ItemStatus::GotChildren)
            .unwrap();
        let b = tree
            .add_child(a, css("http://example.com/b.css", b"@import 'c.css';"), ItemStatus::GotChildren)
            .unwrap();
        let c = tree
            .add_child(
                b,
                archived(
                    "http://example.com/c.css",
                    200,
                    &[("Content-Type", "text/css")],
                    Some(b"body { background: url(bg.png); }"),
                ),
                ItemStatus::GotChildren,
            )
            .unwrap();

        assert_eq!(tree.depth_without_redirections(c).unwrap(), 3);
        assert!(pp.is_embedded_css(&tree, c).unwrap());

        pp.process_tree(&mut tree);
        assert_eq!(child_urls(&tree, c), vec!["http://example.com/bg.png".to_string()]);
    }

    #[test]
    fn test_seen_urls_are_not_attached_twice() {
        let pp = Postprocessor::new(env(Config::default()));
        let mut first = ItemTree::new(archived(
            "http://example.com/one",
            200,
            &[("Content-Type", "text/html")],
            Some(PAGE),
        ))
        .unwrap();
        let mut second = ItemTree::new(archived(
            "http://example.com/two",
            200,
            &[("Content-Type", "text/html")],
            Some(PAGE),
        ))
        .unwrap();

        pp.process_tree(&mut first);
        pp.process_tree(&mut second);
        assert_eq!(first.root().children().len(), 2);
        assert!(second.root().children().is_empty());
        assert_eq!(second.root().status, ItemStatus::Completed);
        assert_eq!(pp.env().stats.snapshot().seen_rejections, 2);
    }

    #[test]
    fn test_disabled_assets_capture_completes() {
        let mut config = Config::default();
        config.assets.disable_assets_capture = true;
        let pp = Postprocessor::new(env(config));
        let mut tree = ItemTree::new(archived(
            "http://example.com/",
            200,
            &[("Content-Type", "text/html")],
            Some(PAGE),
        ))
        .unwrap();

        assert!(pp.process_tree(&mut tree).is_empty());
        assert_eq!(tree.root().status, ItemStatus::Completed);
    }

    #[test]
    fn test_disabled_assets_capture_skips_outlinks_below_max_hops() {
        let mut config = Config::default();
        config.assets.disable_assets_capture = true;
        config.crawl.max_hops = 1;
        let pp = Postprocessor::new(env(config));
        let mut tree = ItemTree::new(archived(
            "https://example.com/",
            200,
            &[("Content-Type", "text/html")],
            Some(br#"<a href="https://example.com/about">about</a><img src="a.png">"#),
        ))
        .unwrap();

        assert!(pp.process_tree(&mut tree).is_empty());
        assert!(tree.root().children().is_empty());
        assert_eq!(tree.root().status, ItemStatus::Completed);
        assert_eq!(pp.env().stats.snapshot().outlinks_emitted, 0);
    }

    #[test]
    fn test_disabled_assets_capture_with_domains_crawl_keeps_outlinks() {
        let mut config = Config::default();
        config.assets.disable_assets_capture = true;
        config.crawl.domains_crawl = vec!["example.com".into()];
        let pp = Postprocessor::new(env(config));
        let mut tree = ItemTree::new(archived(
            "https://example.com/",
            200,
            &[("Content-Type", "text/html")],
            Some(br#"<a href="https://example.com/about">about</a><img src="a.png">"#),
        ))
        .unwrap();

        let outlinks = pp.process_tree(&mut tree);
        assert_eq!(outlinks.len(), 1);
        assert_eq!(outlinks[0].root().url.raw(), "https://example.com/about");
        assert!(tree.root().children().is_empty());
    }

    #[test]
    fn test_outlink_query_follows_document_charset() {
        let mut config = Config::default();
        config.crawl.max_hops = 1;
        let pp = Postprocessor::new(env(config));
        let mut tree = ItemTree::new(archived(
            "http://example.com/",
            200,
            &[("Content-Type", "text/html; charset=windows-1252")],
            Some(b"<html><body><a href=\"/q?x=\xE9\">q</a></body></html>"),
        ))
        .unwrap();

        let outlinks = pp.process_tree(&mut tree);
        assert_eq!(outlinks.len(), 1);
        assert_eq!(outlinks[0].root().url.raw(), "http://example.com/q?x=%E9");
    }

    #[test]
    fn test_parse_error_is_recorded() {
        let pp = Postprocessor::new(env(Config::default()));
        let mut tree = ItemTree::new(archived(
            "http://example.com/api",
            200,
            &[("Content-Type", "application/json")],
            Some(b"{\"broken\":"),
        ))
        .unwrap();

        pp.process_tree(&mut tree);
        assert_eq!(tree.root().status, ItemStatus::Completed);
        assert!(tree.root().error.as_deref().is_some_and(|e| e.contains("json")));
        assert_eq!(pp.env().stats.snapshot().extractor_errors, 1);
    }
}
