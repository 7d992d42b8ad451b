//! Builds logical Acls from native ACL views.
//!
//! Pure functions: no I/O, deterministic output, principals in stable order.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::acl::{Acl, InheritanceType, PropagationClass};
use crate::delegate::{AceEntry, AceFlags, AceType, AclView, AclViews};
use crate::types::Principal;

/// Default accounts kept even though they carry the built-in prefix.
pub const DEFAULT_SUPPORTED_ACCOUNTS: &[&str] = &[
    "BUILTIN\\Administrators",
    "Everyone",
    "BUILTIN\\Users",
    "BUILTIN\\Guest",
    "NT AUTHORITY\\INTERACTIVE",
    "NT AUTHORITY\\Authenticated Users",
];

/// Default prefix identifying machine-local built-in accounts.
pub const DEFAULT_BUILTIN_PREFIX: &str = "BUILTIN\\";

/// Which accounts may appear in an emitted Acl, and under which namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPolicy {
    pub supported_accounts: BTreeSet<String>,
    pub builtin_prefix: String,
    pub namespace: String,
}

impl AccountPolicy {
    pub fn new(supported_accounts: &[String], builtin_prefix: &str, namespace: &str) -> Self {
        Self {
            supported_accounts: supported_accounts.iter().cloned().collect(),
            builtin_prefix: builtin_prefix.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Built-in accounts are dropped unless explicitly whitelisted. Account
    /// names compare case-insensitively.
    pub fn is_supported(&self, account: &str) -> bool {
        let folded = account.to_lowercase();
        if self
            .supported_accounts
            .iter()
            .any(|a| a.to_lowercase() == folded)
        {
            return true;
        }
        self.builtin_prefix.is_empty()
            || !folded.starts_with(&self.builtin_prefix.to_lowercase())
    }

    fn principal(&self, entry: &AceEntry) -> Principal {
        Principal {
            kind: entry.kind,
            name: entry.account.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl Default for AccountPolicy {
    fn default() -> Self {
        let accounts: Vec<String> = DEFAULT_SUPPORTED_ACCOUNTS
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self::new(&accounts, DEFAULT_BUILTIN_PREFIX, "Default")
    }
}

/// The four inheritable Acls of a folder, one per propagation class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritableAcls {
    acls: BTreeMap<PropagationClass, Acl>,
}

impl InheritableAcls {
    pub fn get(&self, class: PropagationClass) -> &Acl {
        // every class is populated at construction
        &self.acls[&class]
    }

    /// Applies `f` to each of the four Acls.
    pub fn map_each(mut self, mut f: impl FnMut(PropagationClass, Acl) -> Acl) -> Self {
        self.acls = self
            .acls
            .into_iter()
            .map(|(class, acl)| (class, f(class, acl)))
            .collect();
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (PropagationClass, &Acl)> {
        self.acls.iter().map(|(c, a)| (*c, a))
    }
}

/// Turns one node's native views into logical Acls.
pub struct AclBuilder<'a> {
    views: &'a AclViews,
    policy: &'a AccountPolicy,
}

impl<'a> AclBuilder<'a> {
    pub fn new(views: &'a AclViews, policy: &'a AccountPolicy) -> Self {
        Self { views, policy }
    }

    /// The node's own Acl from its direct entries. Inherited entries reach
    /// the indexer through the inherit-from chain, not through this set.
    pub fn acl(&self) -> Acl {
        build(
            self.views.direct.entries.iter(),
            self.policy,
            InheritanceType::ChildOverrides,
            |f| !f.inherit_only,
        )
    }

    /// Direct entries that propagate under `class`.
    pub fn inheritable(&self, class: PropagationClass) -> Acl {
        build(
            self.views.direct.entries.iter(),
            self.policy,
            InheritanceType::ChildOverrides,
            |f| propagates(f, class),
        )
    }

    pub fn inheritable_acls(&self) -> InheritableAcls {
        InheritableAcls {
            acls: PropagationClass::ALL
                .iter()
                .map(|c| (*c, self.inheritable(*c)))
                .collect(),
        }
    }

    /// Self-contained Acl for authorization: inherited and direct entries
    /// merged, names case-folded, no inherit-from pointer.
    pub fn flattened(&self) -> Acl {
        let entries = self
            .views
            .inherited
            .entries
            .iter()
            .chain(self.views.direct.entries.iter());
        let mut acl = build(entries, self.policy, InheritanceType::LeafNode, |f| {
            !f.inherit_only
        });
        acl.permits = acl.permits.iter().map(Principal::case_folded).collect();
        acl.denies = acl.denies.iter().map(Principal::case_folded).collect();
        acl.case_insensitive = true;
        acl
    }

    /// True when the node received nothing from its parent, i.e. its
    /// inheritance is cut and the chain restarts at the share.
    pub fn has_no_inherited_entries(&self) -> bool {
        self.views.inherited.is_empty()
    }
}

/// Share-level Acl: both the share gate and the file system must permit.
pub fn share_acl(view: &AclView, policy: &AccountPolicy) -> Acl {
    build(
        view.entries.iter(),
        policy,
        InheritanceType::AndBothPermit,
        |_| true,
    )
}

fn propagates(flags: &AceFlags, class: PropagationClass) -> bool {
    match class {
        PropagationClass::AllFolders => flags.directory_inherit && !flags.no_propagate_inherit,
        PropagationClass::AllFiles => flags.file_inherit && !flags.no_propagate_inherit,
        PropagationClass::ChildFoldersOnly => flags.directory_inherit,
        PropagationClass::ChildFilesOnly => flags.file_inherit,
    }
}

fn build<'e>(
    entries: impl Iterator<Item = &'e AceEntry>,
    policy: &AccountPolicy,
    inheritance_type: InheritanceType,
    applies: impl Fn(&AceFlags) -> bool,
) -> Acl {
    let mut acl = Acl::new(inheritance_type);
    for entry in entries {
        if !entry.read || !applies(&entry.flags) || !policy.is_supported(&entry.account) {
            continue;
        }
        let principal = policy.principal(entry);
        match entry.ace_type {
            AceType::Allow => acl.permits.insert(principal),
            AceType::Deny => acl.denies.insert(principal),
        };
    }
    acl
}
