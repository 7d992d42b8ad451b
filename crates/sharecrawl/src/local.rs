//! [`FileDelegate`] over the local filesystem.
//!
//! There are no DFS namespaces or native ACLs here: every node inherits a
//! single `Everyone` grant, and each root reports an `Everyone` share ACL.
//! Dot-prefixed names count as hidden.

use std::fs::{self, File, FileTimes};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::delegate::{AceEntry, AceFlags, AclView, AclViews, FileDelegate, PathStream};
use crate::error::{ConnectorError, Result};
use crate::response::DocIdPusher;
use crate::types::{NodeAttributes, NodeKind, PrincipalKind};

const EVERYONE: &str = "Everyone";

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }

    fn everyone() -> AclView {
        AclView::new(vec![AceEntry::allow(
            EVERYONE,
            PrincipalKind::Group,
            AceFlags::container_and_object(),
        )])
    }
}

fn to_utc(t: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    t.ok().map(DateTime::<Utc>::from)
}

fn is_dot_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

impl FileDelegate for LocalFs {
    fn canonical_path(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).map_err(|e| ConnectorError::from_io(path, e))
    }

    fn list_children(&self, dir: &Path) -> Result<PathStream<'_>> {
        let entries = fs::read_dir(dir).map_err(|e| ConnectorError::from_io(dir, e))?;
        let dir = dir.to_path_buf();
        Ok(Box::new(entries.map(move |entry| {
            entry
                .map(|e| e.path())
                .map_err(|e| ConnectorError::from_io(&dir, e))
        })))
    }

    fn list_dfs_links(&self, _namespace: &Path) -> Result<PathStream<'_>> {
        Ok(Box::new(std::iter::empty()))
    }

    fn attributes(&self, path: &Path) -> Result<NodeAttributes> {
        let meta = fs::symlink_metadata(path).map_err(|e| ConnectorError::from_io(path, e))?;
        let kind = if meta.is_dir() {
            NodeKind::Directory
        } else if meta.is_file() {
            NodeKind::File
        } else {
            NodeKind::Other
        };
        let modified = to_utc(meta.modified())
            .unwrap_or_else(|| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH));
        Ok(NodeAttributes {
            kind,
            size: meta.len(),
            hidden: is_dot_hidden(path),
            created: to_utc(meta.created()).unwrap_or(modified),
            modified,
            accessed: to_utc(meta.accessed()).unwrap_or(modified),
        })
    }

    fn acl_views(&self, path: &Path) -> Result<AclViews> {
        fs::symlink_metadata(path).map_err(|e| ConnectorError::from_io(path, e))?;
        Ok(AclViews {
            direct: AclView::default(),
            inherited: Self::everyone(),
        })
    }

    fn share_acl_view(&self, _path: &Path) -> Result<AclView> {
        Ok(Self::everyone())
    }

    fn dfs_share_acl_view(&self, link: &Path) -> Result<AclView> {
        Err(ConnectorError::NotFound {
            path: link.to_path_buf(),
        })
    }

    fn is_dfs_namespace(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    fn is_dfs_link(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    fn resolve_dfs_link(&self, link: &Path) -> Result<PathBuf> {
        Err(ConnectorError::NotFound {
            path: link.to_path_buf(),
        })
    }

    fn set_last_access_time(&self, path: &Path, time: DateTime<Utc>) -> Result<()> {
        let file = File::open(path).map_err(|e| ConnectorError::from_io(path, e))?;
        file.set_times(FileTimes::new().set_accessed(SystemTime::from(time)))
            .map_err(|e| ConnectorError::from_io(path, e))
    }

    fn start_monitor(&self, root: &Path, _pusher: Arc<dyn DocIdPusher>) -> Result<()> {
        info!(root = %root.display(), "change monitoring is not available for local folders; relying on recrawl");
        Ok(())
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        debug!(path = %path.display(), "opening file");
        let file = File::open(path).map_err(|e| ConnectorError::from_io(path, e))?;
        Ok(Box::new(file))
    }
}
