//! Capability surface the crawler needs from the operating system.
//!
//! Everything that touches a real share (native ACL views, DFS link
//! enumeration, timestamps, change notification) sits behind
//! [`FileDelegate`]. Calls block; callers run them on worker threads.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};
use crate::response::DocIdPusher;
use crate::types::{DocId, NodeAttributes, PrincipalKind};

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AceType {
    Allow,
    Deny,
}

/// Inheritance flags of a native access-control entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AceFlags {
    /// Propagates to files below this folder.
    pub file_inherit: bool,
    /// Propagates to folders below this folder.
    pub directory_inherit: bool,
    /// Does not apply to the folder itself, only to descendants.
    pub inherit_only: bool,
    /// Propagates one level only.
    pub no_propagate_inherit: bool,
}

impl AceFlags {
    /// Flags of an entry that applies here and to every descendant.
    pub fn container_and_object() -> Self {
        Self {
            file_inherit: true,
            directory_inherit: true,
            ..Self::default()
        }
    }
}

/// One native access-control entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AceEntry {
    /// Account name, e.g. `CORP\alice` or `BUILTIN\Administrators`.
    pub account: String,
    pub kind: PrincipalKind,
    pub ace_type: AceType,
    /// Entry grants (or denies) read access. Entries that say nothing about
    /// reading do not influence who may see a document.
    pub read: bool,
    pub flags: AceFlags,
}

impl AceEntry {
    pub fn allow(account: &str, kind: PrincipalKind, flags: AceFlags) -> Self {
        Self {
            account: account.to_string(),
            kind,
            ace_type: AceType::Allow,
            read: true,
            flags,
        }
    }

    pub fn deny(account: &str, kind: PrincipalKind, flags: AceFlags) -> Self {
        Self {
            account: account.to_string(),
            kind,
            ace_type: AceType::Deny,
            read: true,
            flags,
        }
    }
}

/// Ordered list of native entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AclView {
    pub entries: Vec<AceEntry>,
}

impl AclView {
    pub fn new(entries: Vec<AceEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A node's native ACL split into entries set on the node itself and
/// entries it received from ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AclViews {
    pub direct: AclView,
    pub inherited: AclView,
}

/// Which entities a directory enumeration yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingSource {
    /// Ordinary files and folders.
    Children,
    /// The links of a DFS namespace.
    DfsLinks,
}

/// Lazily read enumeration; dropping it abandons the rest of the stream.
pub type PathStream<'a> = Box<dyn Iterator<Item = Result<PathBuf>> + Send + 'a>;

/// Operating-system capabilities consumed by the crawler.
pub trait FileDelegate: Send + Sync {
    /// Resolves a path string to its canonical form.
    fn canonical_path(&self, path: &Path) -> Result<PathBuf>;

    /// Immediate children of a folder.
    fn list_children(&self, dir: &Path) -> Result<PathStream<'_>>;

    /// Links of a DFS namespace.
    fn list_dfs_links(&self, namespace: &Path) -> Result<PathStream<'_>>;

    fn attributes(&self, path: &Path) -> Result<NodeAttributes>;

    /// Direct and inherited native ACL views of a node.
    fn acl_views(&self, path: &Path) -> Result<AclViews>;

    /// Native ACL of the share that hosts `path`.
    fn share_acl_view(&self, path: &Path) -> Result<AclView>;

    /// Native ACL of a DFS link.
    fn dfs_share_acl_view(&self, link: &Path) -> Result<AclView>;

    fn is_dfs_namespace(&self, path: &Path) -> Result<bool>;

    fn is_dfs_link(&self, path: &Path) -> Result<bool>;

    /// Active storage target of a DFS link.
    fn resolve_dfs_link(&self, link: &Path) -> Result<PathBuf>;

    fn set_last_access_time(&self, path: &Path, time: DateTime<Utc>) -> Result<()>;

    /// Registers a change watch below `root` that pushes changed ids.
    fn start_monitor(&self, root: &Path, pusher: Arc<dyn DocIdPusher>) -> Result<()>;

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// Content type found by inspecting the file, when the extension table
    /// does not know it.
    fn probe_content_type(&self, _path: &Path) -> Result<Option<String>> {
        Ok(None)
    }

    fn new_doc_id(&self, path: &Path) -> Result<DocId> {
        Ok(DocId::from_path(path))
    }

    fn path_of(&self, id: &DocId) -> Result<PathBuf> {
        let raw = id.as_str();
        if raw.is_empty() || raw.contains('\0') {
            return Err(ConnectorError::InvalidDocId { id: raw.to_string() });
        }
        let path = PathBuf::from(raw);
        if !is_absolute_share_path(&path) {
            return Err(ConnectorError::InvalidDocId { id: raw.to_string() });
        }
        Ok(path)
    }
}

/// Opens the enumeration selected by `source`.
pub fn list<'a>(
    delegate: &'a dyn FileDelegate,
    dir: &Path,
    source: ListingSource,
) -> Result<PathStream<'a>> {
    match source {
        ListingSource::Children => delegate.list_children(dir),
        ListingSource::DfsLinks => delegate.list_dfs_links(dir),
    }
}

/// Absolute paths on this platform, plus UNC paths in either slash style.
fn is_absolute_share_path(path: &Path) -> bool {
    let s = path.to_string_lossy();
    path.is_absolute() || s.starts_with(r"\\") || s.starts_with('/')
}
