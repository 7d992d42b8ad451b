//! Hidden / outside-root classification with a per-directory cache.
//!
//! Directory verdicts are memoized in a bounded, expiring cache that loads
//! each key at most once even under concurrent lookups. File verdicts are
//! never cached: a file's own hidden flag is checked live and only its
//! parent's verdict comes from the cache.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::delegate::FileDelegate;
use crate::error::{ConnectorError, Result};
use crate::roots::CrawlRoots;
use crate::types::NodeAttributes;

/// Outcome of a visibility check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Visible,
    /// The queried node itself is hidden.
    Hidden,
    /// A strict ancestor is hidden.
    HiddenByAncestor(PathBuf),
    /// No configured root above the node.
    OutsideCrawlRoots,
}

impl Visibility {
    pub fn is_visible(&self) -> bool {
        matches!(self, Visibility::Visible)
    }
}

pub struct VisibilityCache {
    cache: Cache<PathBuf, Visibility>,
    delegate: Arc<dyn FileDelegate>,
    roots: Arc<CrawlRoots>,
    crawl_hidden: bool,
    loads: AtomicU64,
}

impl VisibilityCache {
    pub fn new(
        delegate: Arc<dyn FileDelegate>,
        roots: Arc<CrawlRoots>,
        crawl_hidden: bool,
        capacity: u64,
        ttl: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity.max(1))
            .time_to_live(ttl)
            .build();
        Self {
            cache,
            delegate,
            roots,
            crawl_hidden,
            loads: AtomicU64::new(0),
        }
    }

    /// Verdict for a node whose attributes the caller already read.
    pub fn check(&self, path: &Path, attrs: &NodeAttributes) -> Result<Visibility> {
        if attrs.is_dir() {
            return self.directory(path);
        }
        if !self.crawl_hidden && attrs.hidden {
            debug!(path = %path.display(), "skipping hidden file");
            return Ok(Visibility::Hidden);
        }
        let Some(parent) = path.parent() else {
            return Ok(Visibility::OutsideCrawlRoots);
        };
        Ok(match self.directory(parent)? {
            Visibility::Hidden => Visibility::HiddenByAncestor(parent.to_path_buf()),
            other => other,
        })
    }

    /// Cached verdict for a directory.
    pub fn directory(&self, dir: &Path) -> Result<Visibility> {
        self.cache
            .try_get_with(dir.to_path_buf(), || self.walk(dir))
            .map_err(ConnectorError::from_shared)
    }

    /// Number of ancestor walks performed, i.e. cache loads.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    fn walk(&self, dir: &Path) -> Result<Visibility> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.roots.is_under_any(dir) {
            return Ok(Visibility::OutsideCrawlRoots);
        }
        if self.crawl_hidden {
            return Ok(Visibility::Visible);
        }
        for p in dir.ancestors() {
            if self.roots.anchor_at(self.delegate.as_ref(), p)?.is_some() {
                return Ok(Visibility::Visible);
            }
            if self.delegate.attributes(p)?.hidden {
                let verdict = if p == dir {
                    Visibility::Hidden
                } else {
                    Visibility::HiddenByAncestor(p.to_path_buf())
                };
                debug!(path = %dir.display(), "skipping hidden folder: {:?}", verdict);
                return Ok(verdict);
            }
        }
        Ok(Visibility::OutsideCrawlRoots)
    }
}
