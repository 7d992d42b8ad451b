//! Per-request traversal: resolve, filter, emit permissions, then stream
//! content or a folder listing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, error, warn};

use crate::acl::{Acl, PropagationClass, SHARE_ACL, DFS_SHARE_ACL};
use crate::acl_builder::{AccountPolicy, AclBuilder};
use crate::atime::AccessTimeRestorer;
use crate::datefmt;
use crate::delegate::{FileDelegate, ListingSource};
use crate::error::{ConnectorError, Result};
use crate::listing::{self, LISTING_CONTENT_TYPE};
use crate::mime;
use crate::overflow::{OverflowHandle, OverflowJob};
use crate::response::{DocIdPusher, Request, Response};
use crate::roots::{CrawlRoots, OwningRoot};
use crate::share::ShareResolver;
use crate::status::StatusTracker;
use crate::time_filter::TimeFilter;
use crate::types::{DocId, NodeAttributes};
use crate::visibility::{Visibility, VisibilityCache};

/// Behaviour switches taken from configuration.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub index_folders: bool,
    pub max_html_links: usize,
    pub allow_files_in_dfs_namespaces: bool,
    pub search_results_link_to_repository: bool,
    pub monitor_for_updates: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            index_folders: true,
            max_html_links: 1000,
            allow_files_in_dfs_namespaces: false,
            search_results_link_to_repository: true,
            monitor_for_updates: true,
        }
    }
}

/// Shared collaborators of the crawl path.
pub struct CrawlerParts {
    pub delegate: Arc<dyn FileDelegate>,
    pub roots: Arc<CrawlRoots>,
    pub visibility: VisibilityCache,
    pub shares: Arc<ShareResolver>,
    pub status: Arc<StatusTracker>,
    pub restorer: Arc<AccessTimeRestorer>,
    pub overflow: OverflowHandle,
    pub pusher: Arc<dyn DocIdPusher>,
    pub policy: AccountPolicy,
    pub last_access_filter: TimeFilter,
    pub last_modified_filter: TimeFilter,
}

pub struct Crawler {
    delegate: Arc<dyn FileDelegate>,
    roots: Arc<CrawlRoots>,
    visibility: VisibilityCache,
    shares: Arc<ShareResolver>,
    status: Arc<StatusTracker>,
    restorer: Arc<AccessTimeRestorer>,
    overflow: OverflowHandle,
    pusher: Arc<dyn DocIdPusher>,
    policy: AccountPolicy,
    last_access_filter: TimeFilter,
    last_modified_filter: TimeFilter,
    settings: CrawlSettings,
    monitored: DashSet<PathBuf>,
}

/// A node that passed every filter.
struct Node {
    path: PathBuf,
    id: DocId,
    attrs: NodeAttributes,
    anchor: OwningRoot,
}

impl Crawler {
    pub fn new(parts: CrawlerParts, settings: CrawlSettings) -> Self {
        Self {
            delegate: parts.delegate,
            roots: parts.roots,
            visibility: parts.visibility,
            shares: parts.shares,
            status: parts.status,
            restorer: parts.restorer,
            overflow: parts.overflow,
            pusher: parts.pusher,
            policy: parts.policy,
            last_access_filter: parts.last_access_filter,
            last_modified_filter: parts.last_modified_filter,
            settings,
            monitored: DashSet::new(),
        }
    }

    /// Ids of every configured root, the starting points of a full crawl.
    pub fn start_ids(&self) -> Result<Vec<DocId>> {
        self.roots
            .iter()
            .map(|root| self.delegate.new_doc_id(root))
            .collect()
    }

    /// Serves one crawl request.
    ///
    /// Excluded nodes (gone, hidden, filtered, unsupported kinds) answer
    /// not-found and return `Ok`. Structural problems, blocked roots and
    /// mandatory restore failures return `Err`.
    pub fn get_doc_content(&self, request: &Request, response: &mut dyn Response) -> Result<()> {
        let Some(node) = self.resolve(request, response)? else {
            return Ok(());
        };

        self.emit_permissions(&node, response)?;
        self.emit_metadata(&node, response);

        if node.attrs.is_file() && !request.has_changed_since_last_crawl(node.attrs.modified) {
            if request.can_respond_with_no_content {
                response.respond_no_content();
            } else {
                response.respond_not_modified();
            }
            return Ok(());
        }

        if node.attrs.is_dir() {
            self.emit_listing(&node, response)
        } else {
            self.emit_file(&node, response)
        }
    }

    /// resolve-path → check-visibility → check-node-kind → check-time-filters.
    fn resolve(&self, request: &Request, response: &mut dyn Response) -> Result<Option<Node>> {
        let path = match self.delegate.path_of(&request.doc_id) {
            Ok(p) => p,
            Err(e) => {
                debug!("{}", e);
                response.respond_not_found();
                return Ok(None);
            }
        };
        let path = match self.delegate.canonical_path(&path) {
            Ok(p) => p,
            Err(e) if e.is_not_found() => {
                response.respond_not_found();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if self.delegate.new_doc_id(&path)? != request.doc_id {
            debug!(path = %path.display(), "id {} is not canonical", request.doc_id);
            response.respond_not_found();
            return Ok(None);
        }

        let attrs = match self.delegate.attributes(&path) {
            Ok(a) => a,
            Err(e) if e.is_not_found() => {
                debug!(path = %path.display(), "node no longer exists");
                response.respond_not_found();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match self.visibility.check(&path, &attrs)? {
            Visibility::Visible => {}
            Visibility::Hidden | Visibility::HiddenByAncestor(_) => {
                response.respond_not_found();
                return Ok(None);
            }
            Visibility::OutsideCrawlRoots => {
                error!(path = %path.display(), "node is not under any crawl root");
                return Err(ConnectorError::OutsideCrawlRoots { path });
            }
        }

        let Some(anchor) = self.roots.owning_root(self.delegate.as_ref(), &path)? else {
            error!(path = %path.display(), "no owning root for a visible node");
            return Err(ConnectorError::OutsideCrawlRoots { path });
        };
        let root = anchor.configured_root();
        if self.status.is_blocked(root) {
            return Err(ConnectorError::RootBlocked {
                root: root.to_path_buf(),
            });
        }

        if !attrs.is_file() && !attrs.is_dir() {
            debug!(path = %path.display(), "skipping node that is neither file nor folder");
            response.respond_not_found();
            return Ok(None);
        }

        if attrs.is_file() {
            if self.last_access_filter.excluded(attrs.accessed) {
                debug!(path = %path.display(), "skipping file, last accessed {}", datefmt::format_timestamp(attrs.accessed));
                response.respond_not_found();
                return Ok(None);
            }
            if self.last_modified_filter.excluded(attrs.modified) {
                debug!(path = %path.display(), "skipping file, last modified {}", datefmt::format_timestamp(attrs.modified));
                response.respond_not_found();
                return Ok(None);
            }
        }

        Ok(Some(Node {
            id: request.doc_id.clone(),
            path,
            attrs,
            anchor,
        }))
    }

    fn emit_permissions(&self, node: &Node, response: &mut dyn Response) -> Result<()> {
        let is_anchor = node.anchor.path() == node.path;
        if is_anchor {
            let acls = self.shares.validated_share_acls(&node.anchor)?;
            response.put_named_resource(SHARE_ACL, acls.share_acl);
            if let Some(dfs) = acls.dfs_acl {
                response.put_named_resource(DFS_SHARE_ACL, dfs);
            }
            self.ensure_monitor(&node.path);
        }

        let namespace_root = match &node.anchor {
            OwningRoot::Root(root) => self.roots.is_namespace(self.delegate.as_ref(), root)?,
            OwningRoot::Link { .. } => false,
        };
        if namespace_root && !is_anchor && !self.settings.allow_files_in_dfs_namespaces {
            debug!(path = %node.path.display(), "ordinary node in a link-only DFS namespace, no Acl emitted");
            return Ok(());
        }

        let views = self.delegate.acl_views(&node.path)?;
        let builder = AclBuilder::new(&views, &self.policy);
        let anchor_id = self.delegate.new_doc_id(node.anchor.path())?;
        let reroot = is_anchor || builder.has_no_inherited_entries();
        let parent_id = match node.path.parent() {
            Some(parent) if !reroot => Some(self.delegate.new_doc_id(parent)?),
            _ => None,
        };

        let acl = match &parent_id {
            None => builder.acl().with_inherit_from(anchor_id.clone(), SHARE_ACL),
            Some(parent) => {
                let class = PropagationClass::for_direct_child(node.attrs.is_dir());
                builder.acl().with_inherit_from(parent.clone(), class.fragment())
            }
        };
        response.set_acl(acl);

        let emit_fragments =
            node.attrs.is_dir() && !(namespace_root && is_anchor && !self.settings.allow_files_in_dfs_namespaces);
        if emit_fragments {
            let inheritable = builder.inheritable_acls().map_each(|class, acl: Acl| match &parent_id {
                None => acl.with_inherit_from(anchor_id.clone(), SHARE_ACL),
                Some(parent) => acl.with_inherit_from(parent.clone(), class.inherited_class().fragment()),
            });
            for (class, acl) in inheritable.iter() {
                response.put_named_resource(class.fragment(), acl.clone());
            }
        }
        Ok(())
    }

    fn emit_metadata(&self, node: &Node, response: &mut dyn Response) {
        response.set_last_modified(node.attrs.modified);
        response.add_metadata("last_modified", &datefmt::format_timestamp(node.attrs.modified));
        response.add_metadata("Creation Time", &datefmt::format_timestamp(node.attrs.created));
        response.add_metadata("Last Access Time", &datefmt::format_timestamp(node.attrs.accessed));
        let url = self
            .settings
            .search_results_link_to_repository
            .then(|| listing::display_url(&node.path));
        response.set_display_url(url);
    }

    fn emit_listing(&self, node: &Node, response: &mut dyn Response) -> Result<()> {
        response.set_no_index(!self.settings.index_folders);
        response.set_content_type(LISTING_CONTENT_TYPE);
        let source = self.listing_source(node)?;
        let listed = listing::write_listing(
            response.output(),
            self.delegate.as_ref(),
            &node.path,
            source,
            self.settings.max_html_links,
        );
        let submitted = match &listed {
            Ok(outcome) if outcome.truncated => self.overflow.submit(OverflowJob {
                dir: node.path.clone(),
                source,
                root: node.anchor.configured_root().to_path_buf(),
                original_access: node.attrs.accessed,
            }),
            _ => Ok(()),
        };
        let restored = self.restore(node);
        let outcome = listed?;
        submitted?;
        debug!(
            id = %node.id,
            written = outcome.written,
            truncated = outcome.truncated,
            "listing written"
        );
        restored
    }

    fn emit_file(&self, node: &Node, response: &mut dyn Response) -> Result<()> {
        let content_type = mime::detect(self.delegate.as_ref(), &node.path);
        response.set_content_type(&content_type);
        let copied = self.delegate.open(&node.path).and_then(|mut input| {
            std::io::copy(&mut input, response.output()).map_err(ConnectorError::from)
        });
        let restored = self.restore(node);
        let bytes = copied?;
        debug!(id = %node.id, bytes, "streamed file content");
        restored
    }

    fn listing_source(&self, node: &Node) -> Result<ListingSource> {
        let is_namespace_root = matches!(&node.anchor, OwningRoot::Root(r) if *r == node.path)
            && self.roots.is_namespace(self.delegate.as_ref(), &node.path)?;
        Ok(if is_namespace_root && !self.settings.allow_files_in_dfs_namespaces {
            ListingSource::DfsLinks
        } else {
            ListingSource::Children
        })
    }

    fn restore(&self, node: &Node) -> Result<()> {
        self.restorer
            .restore(&node.path, node.attrs.accessed, node.anchor.configured_root())
    }

    /// Registers the change watch for a root the first time it is emitted.
    fn ensure_monitor(&self, root: &Path) {
        if !self.settings.monitor_for_updates || !self.monitored.insert(root.to_path_buf()) {
            return;
        }
        if let Err(e) = self.delegate.start_monitor(root, Arc::clone(&self.pusher)) {
            warn!(root = %root.display(), "unable to monitor for updates: {}", e);
            self.monitored.remove(root);
        }
    }
}
