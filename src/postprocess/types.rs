//! Shared context and counters for postprocessing

use crate::config::Config;
use crate::seencheck::{SeenCheck, SeenCheckError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide handles threaded through every worker
#[derive(Clone)]
pub struct Env {
    pub config: Arc<Config>,
    pub seencheck: Arc<SeenCheck>,
    pub stats: Arc<Stats>,
}

impl Env {
    /// Open the seen-check store named by the configuration
    pub fn new(config: Config) -> Result<Self, SeenCheckError> {
        let seencheck = SeenCheck::open(config.seencheck.path.as_deref())?;
        Ok(Self::with_seencheck(config, seencheck))
    }

    pub fn with_seencheck(config: Config, seencheck: SeenCheck) -> Self {
        Self {
            config: Arc::new(config),
            seencheck: Arc::new(seencheck),
            stats: Arc::new(Stats::default()),
        }
    }
}

/// Lock-free postprocessing counters
#[derive(Debug, Default)]
pub struct Stats {
    items_postprocessed: AtomicU64,
    assets_attached: AtomicU64,
    outlinks_emitted: AtomicU64,
    redirects_followed: AtomicU64,
    trap_rejections: AtomicU64,
    seen_rejections: AtomicU64,
    extractor_errors: AtomicU64,
}

/// Point-in-time copy of [`Stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub items_postprocessed: u64,
    pub assets_attached: u64,
    pub outlinks_emitted: u64,
    pub redirects_followed: u64,
    pub trap_rejections: u64,
    pub seen_rejections: u64,
    pub extractor_errors: u64,
}

impl Stats {
    pub fn record_item(&self) {
        self.items_postprocessed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_assets(&self, n: usize) {
        self.assets_attached.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_outlinks(&self, n: usize) {
        self.outlinks_emitted.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_redirect(&self) {
        self.redirects_followed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trap(&self) {
        self.trap_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_seen(&self) {
        self.seen_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_extractor_error(&self) {
        self.extractor_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            items_postprocessed: self.items_postprocessed.load(Ordering::Relaxed),
            assets_attached: self.assets_attached.load(Ordering::Relaxed),
            outlinks_emitted: self.outlinks_emitted.load(Ordering::Relaxed),
            redirects_followed: self.redirects_followed.load(Ordering::Relaxed),
            trap_rejections: self.trap_rejections.load(Ordering::Relaxed),
            seen_rejections: self.seen_rejections.load(Ordering::Relaxed),
            extractor_errors: self.extractor_errors.load(Ordering::Relaxed),
        }
    }
}
