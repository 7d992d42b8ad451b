//! Lazy per-document authorization, independent of any crawl.
//!
//! Each document's chain is rebuilt from scratch: `[dfs Acl], share Acl,
//! flattened leaf Acl`. Nothing here reads or writes the visibility cache or
//! the status tracker. Documents that cannot be placed or read come back
//! [`AuthzStatus::Indeterminate`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::acl::{evaluate_chain, Acl, AuthzStatus};
use crate::acl_builder::{AccountPolicy, AclBuilder};
use crate::delegate::FileDelegate;
use crate::error::Result;
use crate::roots::CrawlRoots;
use crate::share::ShareResolver;
use crate::types::{DocId, Principal};

/// The user being checked and the groups they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: Principal,
    pub groups: Vec<Principal>,
}

impl Identity {
    pub fn new(user: Principal, groups: Vec<Principal>) -> Self {
        Self { user, groups }
    }
}

pub struct AuthzResolver {
    delegate: Arc<dyn FileDelegate>,
    roots: Arc<CrawlRoots>,
    shares: Arc<ShareResolver>,
    policy: AccountPolicy,
}

impl AuthzResolver {
    pub fn new(
        delegate: Arc<dyn FileDelegate>,
        roots: Arc<CrawlRoots>,
        shares: Arc<ShareResolver>,
        policy: AccountPolicy,
    ) -> Self {
        Self {
            delegate,
            roots,
            shares,
            policy,
        }
    }

    /// One decision per requested id; never fails as a whole.
    pub fn is_user_authorized(
        &self,
        identity: &Identity,
        ids: &[DocId],
    ) -> BTreeMap<DocId, AuthzStatus> {
        ids.iter()
            .map(|id| {
                let status = match self.chain_for(id) {
                    Ok(Some(chain)) => evaluate_chain(&chain, &identity.user, &identity.groups),
                    Ok(None) => AuthzStatus::Indeterminate,
                    Err(e) => {
                        debug!("authorization of {} is indeterminate: {}", id, e);
                        AuthzStatus::Indeterminate
                    }
                };
                (id.clone(), status)
            })
            .collect()
    }

    /// Root-to-leaf chain for a document, `None` when it is under no root
    /// or the id is not the canonical spelling of its path.
    pub fn chain_for(&self, id: &DocId) -> Result<Option<Vec<Acl>>> {
        let path = self.delegate.path_of(id)?;
        let canonical = self.delegate.canonical_path(&path)?;
        if self.delegate.new_doc_id(&canonical)? != *id {
            debug!(path = %canonical.display(), "id {} is not canonical", id);
            return Ok(None);
        }
        self.chain_for_path(&canonical)
    }

    fn chain_for_path(&self, path: &Path) -> Result<Option<Vec<Acl>>> {
        let Some(anchor) = self.roots.owning_root(self.delegate.as_ref(), path)? else {
            debug!(path = %path.display(), "no owning root");
            return Ok(None);
        };
        let share_acls = self.shares.share_acls(&anchor)?;
        let views = self.delegate.acl_views(path)?;
        let leaf = AclBuilder::new(&views, &self.policy).flattened();

        let mut chain = Vec::with_capacity(3);
        chain.extend(share_acls.dfs_acl);
        chain.push(share_acls.share_acl);
        chain.push(leaf);
        Ok(Some(chain))
    }
}
