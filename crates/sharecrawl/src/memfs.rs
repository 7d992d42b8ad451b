//! In-memory share tree implementing [`FileDelegate`].
//!
//! Used by the unit and end-to-end suites to model plain shares, DFS
//! namespaces and links, hidden folders, native ACLs and the failure modes
//! the crawler must classify. Reading a file or listing a folder moves its
//! last access time to [`MemFs::touch_time`], like a real share would.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::delegate::{
    AceEntry, AceFlags, AclView, AclViews, FileDelegate, PathStream,
};
use crate::error::{ConnectorError, Result};
use crate::response::DocIdPusher;
use crate::types::{NodeAttributes, NodeKind, PrincipalKind};

#[derive(Debug, Clone)]
enum DfsRole {
    Namespace,
    Link { target: PathBuf, view: AclView },
}

#[derive(Debug, Clone)]
struct MemNode {
    attrs: NodeAttributes,
    views: AclViews,
    content: Vec<u8>,
    share_view: Option<AclView>,
    dfs: Option<DfsRole>,
    content_type: Option<String>,
}

/// In-memory [`FileDelegate`].
pub struct MemFs {
    nodes: RwLock<BTreeMap<PathBuf, MemNode>>,
    base_time: DateTime<Utc>,
    denied: RwLock<BTreeSet<PathBuf>>,
    broken: RwLock<BTreeSet<PathBuf>>,
    fail_restore: RwLock<bool>,
    latency: RwLock<Option<std::time::Duration>>,
    monitors: Mutex<Vec<PathBuf>>,
    restores: AtomicUsize,
    listings: AtomicUsize,
    attribute_reads: AtomicUsize,
}

impl MemFs {
    /// Empty tree whose nodes are all created, modified and accessed at
    /// `base_time`.
    pub fn new(base_time: DateTime<Utc>) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            base_time,
            denied: RwLock::new(BTreeSet::new()),
            broken: RwLock::new(BTreeSet::new()),
            fail_restore: RwLock::new(false),
            latency: RwLock::new(None),
            monitors: Mutex::new(Vec::new()),
            restores: AtomicUsize::new(0),
            listings: AtomicUsize::new(0),
            attribute_reads: AtomicUsize::new(0),
        }
    }

    /// Access time a read leaves behind.
    pub fn touch_time(&self) -> DateTime<Utc> {
        self.base_time + Duration::days(3650)
    }

    fn node(&self, kind: NodeKind, content: Vec<u8>) -> MemNode {
        MemNode {
            attrs: NodeAttributes {
                kind,
                size: content.len() as u64,
                hidden: false,
                created: self.base_time,
                modified: self.base_time,
                accessed: self.base_time,
            },
            views: AclViews::default(),
            content,
            share_view: None,
            dfs: None,
            content_type: None,
        }
    }

    fn insert(&self, path: &str, node: MemNode) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(PathBuf::from(path), node);
    }

    fn update(&self, path: &str, f: impl FnOnce(&mut MemNode)) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(node) = nodes.get_mut(Path::new(path)) {
            f(node);
        }
    }

    /// Share root with a share ACL permitting `Everyone`.
    pub fn add_share(&self, path: &str) -> &Self {
        let mut node = self.node(NodeKind::Directory, Vec::new());
        node.share_view = Some(AclView::new(vec![AceEntry::allow(
            "Everyone",
            PrincipalKind::Group,
            AceFlags::default(),
        )]));
        self.insert(path, node);
        self
    }

    pub fn add_dir(&self, path: &str) -> &Self {
        self.insert(path, self.node(NodeKind::Directory, Vec::new()));
        self
    }

    pub fn add_file(&self, path: &str, content: &[u8]) -> &Self {
        self.insert(path, self.node(NodeKind::File, content.to_vec()));
        self
    }

    pub fn add_other(&self, path: &str) -> &Self {
        self.insert(path, self.node(NodeKind::Other, Vec::new()));
        self
    }

    /// DFS namespace root; its share ACL permits `Everyone`.
    pub fn add_dfs_namespace(&self, path: &str) -> &Self {
        self.add_share(path);
        self.update(path, |n| n.dfs = Some(DfsRole::Namespace));
        self
    }

    /// DFS link under a namespace, redirecting to `target`.
    pub fn add_dfs_link(&self, path: &str, target: &str, view: AclView) -> &Self {
        let mut node = self.node(NodeKind::Directory, Vec::new());
        node.dfs = Some(DfsRole::Link {
            target: PathBuf::from(target),
            view,
        });
        self.insert(path, node);
        self
    }

    pub fn set_hidden(&self, path: &str, hidden: bool) -> &Self {
        self.update(path, |n| n.attrs.hidden = hidden);
        self
    }

    pub fn set_acl_views(&self, path: &str, views: AclViews) -> &Self {
        self.update(path, |n| n.views = views);
        self
    }

    pub fn set_share_acl(&self, path: &str, view: AclView) -> &Self {
        self.update(path, |n| n.share_view = Some(view));
        self
    }

    pub fn set_times(
        &self,
        path: &str,
        modified: DateTime<Utc>,
        accessed: DateTime<Utc>,
    ) -> &Self {
        self.update(path, |n| {
            n.attrs.modified = modified;
            n.attrs.accessed = accessed;
        });
        self
    }

    pub fn set_content_type(&self, path: &str, content_type: &str) -> &Self {
        self.update(path, |n| n.content_type = Some(content_type.to_string()));
        self
    }

    pub fn remove(&self, path: &str) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(Path::new(path));
    }

    /// Makes every operation on `path` fail with access denied.
    pub fn deny_access(&self, path: &str, denied: bool) {
        let mut set = self.denied.write().unwrap_or_else(PoisonError::into_inner);
        if denied {
            set.insert(PathBuf::from(path));
        } else {
            set.remove(Path::new(path));
        }
    }

    /// Makes every operation on `path` fail with a generic I/O error.
    pub fn break_path(&self, path: &str, broken: bool) {
        let mut set = self.broken.write().unwrap_or_else(PoisonError::into_inner);
        if broken {
            set.insert(PathBuf::from(path));
        } else {
            set.remove(Path::new(path));
        }
    }

    pub fn fail_last_access_restore(&self, fail: bool) {
        *self.fail_restore.write().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Delay added to every attribute read.
    pub fn set_latency(&self, latency: Option<std::time::Duration>) {
        *self.latency.write().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    pub fn accessed(&self, path: &str) -> Option<DateTime<Utc>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(Path::new(path))
            .map(|n| n.attrs.accessed)
    }

    pub fn monitored_roots(&self) -> Vec<PathBuf> {
        self.monitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn restore_count(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }

    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub fn attribute_read_count(&self) -> usize {
        self.attribute_reads.load(Ordering::SeqCst)
    }

    fn check(&self, path: &Path) -> Result<()> {
        if self
            .denied
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
        {
            return Err(ConnectorError::AccessDenied {
                path: path.to_path_buf(),
            });
        }
        if self
            .broken
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
        {
            return Err(ConnectorError::Io(std::io::Error::other(format!(
                "the network name {} is no longer available",
                path.display()
            ))));
        }
        Ok(())
    }

    fn with_node<T>(&self, path: &Path, f: impl FnOnce(&MemNode) -> T) -> Result<T> {
        self.check(path)?;
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .get(path)
            .map(f)
            .ok_or_else(|| ConnectorError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn touch(&self, path: &Path) {
        let touched = self.touch_time();
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(node) = nodes.get_mut(path) {
            node.attrs.accessed = touched;
        }
    }

    fn children(&self, dir: &Path, links_only: bool) -> Result<PathStream<'_>> {
        let kind = self.with_node(dir, |n| n.attrs.kind)?;
        if kind != NodeKind::Directory {
            return Err(ConnectorError::NotADirectory {
                path: dir.to_path_buf(),
            });
        }
        self.listings.fetch_add(1, Ordering::SeqCst);
        let entries: Vec<PathBuf> = self
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(p, _)| p.parent() == Some(dir))
            .filter(|(_, n)| !links_only || matches!(n.dfs, Some(DfsRole::Link { .. })))
            .map(|(p, _)| p.clone())
            .collect();
        self.touch(dir);
        Ok(Box::new(entries.into_iter().map(Ok)))
    }
}

impl FileDelegate for MemFs {
    fn canonical_path(&self, path: &Path) -> Result<PathBuf> {
        let mut out = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    out.pop();
                }
                other => out.push(other),
            }
        }
        if out.as_os_str().is_empty() {
            out.push("/");
        }
        Ok(out)
    }

    fn list_children(&self, dir: &Path) -> Result<PathStream<'_>> {
        self.children(dir, false)
    }

    fn list_dfs_links(&self, namespace: &Path) -> Result<PathStream<'_>> {
        self.children(namespace, true)
    }

    fn attributes(&self, path: &Path) -> Result<NodeAttributes> {
        self.attribute_reads.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = latency {
            std::thread::sleep(delay);
        }
        self.with_node(path, |n| n.attrs.clone())
    }

    fn acl_views(&self, path: &Path) -> Result<AclViews> {
        self.with_node(path, |n| n.views.clone())
    }

    fn share_acl_view(&self, path: &Path) -> Result<AclView> {
        self.check(path)?;
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        path.ancestors()
            .find_map(|p| nodes.get(p).and_then(|n| n.share_view.clone()))
            .ok_or_else(|| ConnectorError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn dfs_share_acl_view(&self, link: &Path) -> Result<AclView> {
        self.with_node(link, |n| match &n.dfs {
            Some(DfsRole::Link { view, .. }) => Some(view.clone()),
            _ => None,
        })?
        .ok_or_else(|| ConnectorError::Config {
            reason: format!("{} is not a DFS link", link.display()),
        })
    }

    fn is_dfs_namespace(&self, path: &Path) -> Result<bool> {
        self.with_node(path, |n| matches!(n.dfs, Some(DfsRole::Namespace)))
    }

    fn is_dfs_link(&self, path: &Path) -> Result<bool> {
        self.with_node(path, |n| matches!(n.dfs, Some(DfsRole::Link { .. })))
    }

    fn resolve_dfs_link(&self, link: &Path) -> Result<PathBuf> {
        self.with_node(link, |n| match &n.dfs {
            Some(DfsRole::Link { target, .. }) => Some(target.clone()),
            _ => None,
        })?
        .ok_or_else(|| ConnectorError::Config {
            reason: format!("{} is not a DFS link", link.display()),
        })
    }

    fn set_last_access_time(&self, path: &Path, time: DateTime<Utc>) -> Result<()> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        if *self.fail_restore.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(ConnectorError::LastAccessRestore {
                path: path.to_path_buf(),
                reason: "the media is write protected".to_string(),
            });
        }
        self.check(path)?;
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        match nodes.get_mut(path) {
            Some(node) => {
                node.attrs.accessed = time;
                Ok(())
            }
            None => Err(ConnectorError::NotFound {
                path: path.to_path_buf(),
            }),
        }
    }

    fn start_monitor(&self, root: &Path, _pusher: Arc<dyn DocIdPusher>) -> Result<()> {
        self.monitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(root.to_path_buf());
        Ok(())
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let (kind, content) = self.with_node(path, |n| (n.attrs.kind, n.content.clone()))?;
        if kind != NodeKind::File {
            return Err(ConnectorError::Io(std::io::Error::other(format!(
                "{} is not a regular file",
                path.display()
            ))));
        }
        self.touch(path);
        Ok(Box::new(Cursor::new(content)))
    }

    fn probe_content_type(&self, path: &Path) -> Result<Option<String>> {
        self.with_node(path, |n| n.content_type.clone())
    }
}
