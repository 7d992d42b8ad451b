//! Logical access-control lists as the indexer consumes them.
//!
//! An [`Acl`] is a set of permit/deny principals plus an optional pointer to
//! the Acl it inherits from, expressed as `(document id, fragment)`. The
//! crawl path never resolves those pointers; the indexer does. Only the
//! authorization path assembles an explicit chain and evaluates it here.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DocId, Principal};

/// Fragment naming the share-level Acl of a crawl root.
pub const SHARE_ACL: &str = "shareAcl";
/// Fragment naming the namespace-level Acl of a DFS link.
pub const DFS_SHARE_ACL: &str = "dfsShareAcl";

/// How an Acl combines with the Acl it inherits from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InheritanceType {
    /// Both the parent and this Acl must permit.
    AndBothPermit,
    /// A decision made here overrides the parent's.
    ChildOverrides,
    /// Nothing inherits from this Acl.
    LeafNode,
}

/// Which descendants a folder's inheritable Acl applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropagationClass {
    AllFolders,
    AllFiles,
    ChildFoldersOnly,
    ChildFilesOnly,
}

impl PropagationClass {
    pub const ALL: [PropagationClass; 4] = [
        PropagationClass::AllFolders,
        PropagationClass::AllFiles,
        PropagationClass::ChildFoldersOnly,
        PropagationClass::ChildFilesOnly,
    ];

    /// Named-resource fragment under which this class is emitted.
    pub fn fragment(&self) -> &'static str {
        match self {
            PropagationClass::AllFolders => "allFoldersAcl",
            PropagationClass::AllFiles => "allFilesAcl",
            PropagationClass::ChildFoldersOnly => "childFoldersAcl",
            PropagationClass::ChildFilesOnly => "childFilesAcl",
        }
    }

    /// The grandparent-level class that feeds this one. A direct child's
    /// Acl still receives every entry that propagates to all descendants.
    pub fn inherited_class(&self) -> PropagationClass {
        match self {
            PropagationClass::AllFolders | PropagationClass::ChildFoldersOnly => {
                PropagationClass::AllFolders
            }
            PropagationClass::AllFiles | PropagationClass::ChildFilesOnly => {
                PropagationClass::AllFiles
            }
        }
    }

    /// Class a direct child of the given kind inherits its own Acl from.
    pub fn for_direct_child(is_dir: bool) -> PropagationClass {
        if is_dir {
            PropagationClass::ChildFoldersOnly
        } else {
            PropagationClass::ChildFilesOnly
        }
    }
}

/// Pointer from an Acl to the named resource it inherits from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InheritFrom {
    pub doc_id: DocId,
    pub fragment: String,
}

impl InheritFrom {
    pub fn new(doc_id: DocId, fragment: &str) -> Self {
        Self {
            doc_id,
            fragment: fragment.to_string(),
        }
    }
}

impl fmt::Display for InheritFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.doc_id, self.fragment)
    }
}

/// A normalized permission set.
///
/// Principal sets are ordered so that equal inputs always produce equal,
/// identically serialized Acls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub permits: BTreeSet<Principal>,
    pub denies: BTreeSet<Principal>,
    pub case_insensitive: bool,
    pub inheritance_type: InheritanceType,
    pub inherit_from: Option<InheritFrom>,
}

impl Acl {
    pub fn new(inheritance_type: InheritanceType) -> Self {
        Self {
            permits: BTreeSet::new(),
            denies: BTreeSet::new(),
            case_insensitive: true,
            inheritance_type,
            inherit_from: None,
        }
    }

    pub fn with_inherit_from(mut self, doc_id: DocId, fragment: &str) -> Self {
        self.inherit_from = Some(InheritFrom::new(doc_id, fragment));
        self
    }

    pub fn with_inheritance_type(mut self, inheritance_type: InheritanceType) -> Self {
        self.inheritance_type = inheritance_type;
        self
    }

    /// True when the Acl carries no entries of its own.
    pub fn is_empty(&self) -> bool {
        self.permits.is_empty() && self.denies.is_empty()
    }

    /// Decision made by this Acl's own entries, ignoring any parent.
    /// Deny entries win over permit entries.
    pub fn local_decision(&self, user: &Principal, groups: &[Principal]) -> AuthzStatus {
        let matches = |set: &BTreeSet<Principal>| {
            std::iter::once(user)
                .chain(groups.iter())
                .any(|p| self.contains(set, p))
        };
        if matches(&self.denies) {
            AuthzStatus::Deny
        } else if matches(&self.permits) {
            AuthzStatus::Permit
        } else {
            AuthzStatus::Indeterminate
        }
    }

    fn contains(&self, set: &BTreeSet<Principal>, p: &Principal) -> bool {
        if self.case_insensitive {
            set.iter().any(|e| e.eq_ignore_case(p))
        } else {
            set.contains(p)
        }
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthzStatus {
    Permit,
    Deny,
    Indeterminate,
}

impl InheritanceType {
    /// Combines a child's decision with its parent's under this (the
    /// parent's) inheritance type.
    pub fn combine(&self, parent: AuthzStatus, child: AuthzStatus) -> AuthzStatus {
        match self {
            InheritanceType::AndBothPermit => {
                if parent == AuthzStatus::Permit && child == AuthzStatus::Permit {
                    AuthzStatus::Permit
                } else {
                    AuthzStatus::Deny
                }
            }
            InheritanceType::ChildOverrides => {
                if child == AuthzStatus::Indeterminate {
                    parent
                } else {
                    child
                }
            }
            InheritanceType::LeafNode => child,
        }
    }
}

/// Evaluates an explicit chain ordered from the outermost Acl to the leaf.
///
/// A chain that never reaches a decision denies: nobody was granted access.
pub fn evaluate_chain(chain: &[Acl], user: &Principal, groups: &[Principal]) -> AuthzStatus {
    let mut iter = chain.iter();
    let Some(first) = iter.next() else {
        return AuthzStatus::Indeterminate;
    };
    let mut parent_type = first.inheritance_type;
    let mut status = first.local_decision(user, groups);
    for acl in iter {
        let child = acl.local_decision(user, groups);
        status = parent_type.combine(status, child);
        parent_type = acl.inheritance_type;
    }
    match status {
        AuthzStatus::Indeterminate => AuthzStatus::Deny,
        other => other,
    }
}
