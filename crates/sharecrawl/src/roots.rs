//! The configured crawl-root set and ancestor walks against it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::delegate::FileDelegate;
use crate::error::Result;

/// Where a node's permission chain is anchored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwningRoot {
    /// A configured root (plain share or DFS namespace).
    Root(PathBuf),
    /// A DFS link directly under a configured namespace root.
    Link { namespace: PathBuf, link: PathBuf },
}

impl OwningRoot {
    /// The path that seeds inheritance.
    pub fn path(&self) -> &Path {
        match self {
            OwningRoot::Root(p) => p,
            OwningRoot::Link { link, .. } => link,
        }
    }

    /// The configured root this anchor belongs to.
    pub fn configured_root(&self) -> &Path {
        match self {
            OwningRoot::Root(p) => p,
            OwningRoot::Link { namespace, .. } => namespace,
        }
    }
}

/// Crawl roots, fixed at startup, plus a memo of which are DFS namespaces.
#[derive(Debug)]
pub struct CrawlRoots {
    roots: BTreeSet<PathBuf>,
    namespace_flags: DashMap<PathBuf, bool>,
}

impl CrawlRoots {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            namespace_flags: DashMap::new(),
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.roots.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.roots.iter()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Pure path test: some root is `path` or one of its ancestors.
    pub fn is_under_any(&self, path: &Path) -> bool {
        self.roots.iter().any(|r| path.starts_with(r))
    }

    /// Records the classification of a root found during validation.
    pub fn mark_namespace(&self, root: &Path, is_namespace: bool) {
        self.namespace_flags.insert(root.to_path_buf(), is_namespace);
    }

    /// Whether a configured root is a DFS namespace; asks the delegate once.
    pub fn is_namespace(&self, delegate: &dyn FileDelegate, root: &Path) -> Result<bool> {
        if !self.contains(root) {
            return Ok(false);
        }
        if let Some(flag) = self.namespace_flags.get(root) {
            return Ok(*flag);
        }
        let flag = delegate.is_dfs_namespace(root)?;
        self.namespace_flags.insert(root.to_path_buf(), flag);
        Ok(flag)
    }

    /// Classifies `path` as a root, a DFS link under a namespace root, or
    /// neither.
    pub fn anchor_at(&self, delegate: &dyn FileDelegate, path: &Path) -> Result<Option<OwningRoot>> {
        if self.contains(path) {
            return Ok(Some(OwningRoot::Root(path.to_path_buf())));
        }
        if let Some(parent) = path.parent() {
            if self.is_namespace(delegate, parent)? && delegate.is_dfs_link(path)? {
                return Ok(Some(OwningRoot::Link {
                    namespace: parent.to_path_buf(),
                    link: path.to_path_buf(),
                }));
            }
        }
        Ok(None)
    }

    /// Nearest anchor at or above `path`, uncached.
    pub fn owning_root(&self, delegate: &dyn FileDelegate, path: &Path) -> Result<Option<OwningRoot>> {
        if !self.is_under_any(path) {
            return Ok(None);
        }
        for p in path.ancestors() {
            if let Some(anchor) = self.anchor_at(delegate, p)? {
                return Ok(Some(anchor));
            }
        }
        Ok(None)
    }
}
