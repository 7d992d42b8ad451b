//! Core identity and attribute types shared by every component

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque document identifier handed to the indexer.
///
/// Identical canonical paths always map to the same id; the mapping itself
/// is owned by the [`FileDelegate`](crate::delegate::FileDelegate).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id derived from the textual form of a path.
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a principal names a single account or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    Group,
}

/// A user or group as the indexer sees it: name plus namespace tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub name: String,
    pub namespace: String,
}

impl Principal {
    pub fn user(name: &str, namespace: &str) -> Self {
        Self {
            kind: PrincipalKind::User,
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub fn group(name: &str, namespace: &str) -> Self {
        Self {
            kind: PrincipalKind::Group,
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == PrincipalKind::Group
    }

    /// Same principal, compared without regard to case.
    pub fn eq_ignore_case(&self, other: &Principal) -> bool {
        self.kind == other.kind
            && self.namespace == other.namespace
            && self.name.to_lowercase() == other.name.to_lowercase()
    }

    /// Copy of this principal with the name case-folded.
    pub fn case_folded(&self) -> Self {
        Self {
            kind: self.kind,
            name: self.name.to_lowercase(),
            namespace: self.namespace.clone(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.kind {
            PrincipalKind::User => "user",
            PrincipalKind::Group => "group",
        };
        write!(f, "{}:{}@{}", tag, self.name, self.namespace)
    }
}

/// What kind of node a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
    /// Device, pipe, reparse point or anything else we do not crawl.
    Other,
}

/// Basic attributes of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub kind: NodeKind,
    pub size: u64,
    pub hidden: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
}

impl NodeAttributes {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}
