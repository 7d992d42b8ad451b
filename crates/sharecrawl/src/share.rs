//! Share and DFS classification, validation and the share-level Acls that
//! seed inheritance below every root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::acl::{Acl, InheritanceType, DFS_SHARE_ACL};
use crate::acl_builder::{self, AccountPolicy};
use crate::delegate::{self, FileDelegate, ListingSource};
use crate::error::{ConnectorError, Result};
use crate::roots::{CrawlRoots, OwningRoot};
use crate::status::StatusTracker;
use crate::types::Principal;

/// What a validated root turned out to be.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootKind {
    Share,
    DfsNamespace,
    DfsLink { namespace: PathBuf, target: PathBuf },
}

/// Root-level Acls: the storage share gate and, for DFS links, the link's
/// own namespace-level gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAcls {
    pub share_acl: Acl,
    pub dfs_acl: Option<Acl>,
}

pub struct ShareResolver {
    delegate: Arc<dyn FileDelegate>,
    roots: Arc<CrawlRoots>,
    policy: AccountPolicy,
    skip_share_access_control: bool,
    status: Arc<StatusTracker>,
}

impl ShareResolver {
    pub fn new(
        delegate: Arc<dyn FileDelegate>,
        roots: Arc<CrawlRoots>,
        policy: AccountPolicy,
        skip_share_access_control: bool,
        status: Arc<StatusTracker>,
    ) -> Self {
        Self {
            delegate,
            roots,
            policy,
            skip_share_access_control,
            status,
        }
    }

    pub fn roots(&self) -> &CrawlRoots {
        &self.roots
    }

    /// Validates a configured root and records the outcome. Links of a
    /// namespace root are validated and recorded individually.
    pub fn validate(&self, root: &Path) -> Result<RootKind> {
        let result = self.validate_root(root);
        if let Ok(RootKind::DfsNamespace) = result {
            self.validate_links(root);
        }
        result
    }

    /// Validates a configured root alone and records the outcome; a
    /// namespace's links are left to [`validate`](Self::validate).
    pub fn validate_root(&self, root: &Path) -> Result<RootKind> {
        let result = self.check_root(root);
        self.record(root, &result);
        result
    }

    /// Validates one DFS link and records the outcome.
    pub fn validate_link(&self, namespace: &Path, link: &Path) -> Result<RootKind> {
        let result = self.check_link(namespace, link);
        self.record(link, &result);
        result
    }

    /// Re-validates the anchor, then computes its Acls.
    pub fn validated_share_acls(&self, anchor: &OwningRoot) -> Result<ShareAcls> {
        match anchor {
            OwningRoot::Root(root) => self.validate_root(root)?,
            OwningRoot::Link { namespace, link } => self.validate_link(namespace, link)?,
        };
        self.share_acls(anchor)
    }

    /// Acls seeding inheritance under `anchor`. No validation, no status
    /// updates.
    ///
    /// For a DFS link the storage share Acl points at the link's
    /// [`DFS_SHARE_ACL`], giving namespace → storage share → file system.
    pub fn share_acls(&self, anchor: &OwningRoot) -> Result<ShareAcls> {
        match anchor {
            OwningRoot::Root(root) => Ok(ShareAcls {
                share_acl: self.share_gate(root)?,
                dfs_acl: None,
            }),
            OwningRoot::Link { link, .. } => {
                let dfs_view = self.delegate.dfs_share_acl_view(link)?;
                let dfs_acl = acl_builder::share_acl(&dfs_view, &self.policy);
                let target = self.delegate.resolve_dfs_link(link)?;
                let link_id = self.delegate.new_doc_id(link)?;
                let share_acl = self
                    .share_gate(&target)?
                    .with_inherit_from(link_id, DFS_SHARE_ACL);
                Ok(ShareAcls {
                    share_acl,
                    dfs_acl: Some(dfs_acl),
                })
            }
        }
    }

    fn share_gate(&self, path: &Path) -> Result<Acl> {
        if self.skip_share_access_control {
            let mut acl = Acl::new(InheritanceType::AndBothPermit);
            acl.permits
                .insert(Principal::group("Everyone", &self.policy.namespace));
            return Ok(acl);
        }
        let view = self.delegate.share_acl_view(path)?;
        Ok(acl_builder::share_acl(&view, &self.policy))
    }

    fn check_root(&self, root: &Path) -> Result<RootKind> {
        let is_namespace = self.delegate.is_dfs_namespace(root)?;
        self.roots.mark_namespace(root, is_namespace);
        let source = if is_namespace {
            ListingSource::DfsLinks
        } else {
            ListingSource::Children
        };
        self.check_readable(root, source)?;
        if !self.skip_share_access_control {
            self.delegate.share_acl_view(root)?;
        }
        let kind = if is_namespace {
            RootKind::DfsNamespace
        } else {
            RootKind::Share
        };
        info!(root = %root.display(), "validated crawl root as {:?}", kind);
        Ok(kind)
    }

    fn check_link(&self, namespace: &Path, link: &Path) -> Result<RootKind> {
        self.check_readable(link, ListingSource::Children)?;
        self.delegate.dfs_share_acl_view(link)?;
        let target = self.delegate.resolve_dfs_link(link)?;
        if !self.skip_share_access_control {
            self.delegate.share_acl_view(&target)?;
        }
        debug!(link = %link.display(), target = %target.display(), "validated DFS link");
        Ok(RootKind::DfsLink {
            namespace: namespace.to_path_buf(),
            target,
        })
    }

    /// Folder, listable, ACLs readable.
    fn check_readable(&self, path: &Path, source: ListingSource) -> Result<()> {
        let attrs = self.delegate.attributes(path)?;
        if !attrs.is_dir() {
            return Err(ConnectorError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        drop(delegate::list(self.delegate.as_ref(), path, source)?);
        self.delegate.acl_views(path)?;
        Ok(())
    }

    fn validate_links(&self, namespace: &Path) {
        let links = match self.delegate.list_dfs_links(namespace) {
            Ok(links) => links,
            Err(e) => {
                warn!(root = %namespace.display(), "unable to enumerate DFS links: {}", e);
                return;
            }
        };
        for entry in links {
            match entry {
                Ok(link) => {
                    let _ = self.validate_link(namespace, &link);
                }
                Err(e) => {
                    warn!(root = %namespace.display(), "DFS link enumeration interrupted: {}", e);
                    break;
                }
            }
        }
    }

    fn record(&self, root: &Path, result: &Result<RootKind>) {
        if self.status.is_blocked(root) {
            return;
        }
        match result {
            Ok(_) => self.status.record_ok(root),
            Err(e) => self.status.record_failure(root, e),
        }
    }
}
