//! Error types for the share crawler

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Why a root or link failed validation. Each variant maps to its own
/// diagnostic and its own dashboard code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ValidationFailure {
    /// The connector account may not list the folder or read its ACLs.
    AccessDenied,
    /// The configured root exists but is not a folder.
    NotADirectory,
    /// The root no longer exists (stale configuration or removed share).
    NotFound,
    /// Any other I/O failure, usually transient.
    Io,
}

impl ValidationFailure {
    /// Short code shown on the dashboard.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailure::AccessDenied => "access-denied",
            ValidationFailure::NotADirectory => "not-a-directory",
            ValidationFailure::NotFound => "not-found",
            ValidationFailure::Io => "io-error",
        }
    }
}

/// Error types for configuration, validation, traversal and restore failures.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Invalid or missing configuration
    #[error("Configuration error: {reason}")]
    Config {
        /// What was wrong with the configuration
        reason: String,
    },
    /// A time filter could not be built from its settings
    #[error("Invalid time filter: {reason}")]
    InvalidTimeFilter {
        /// Why the filter was rejected
        reason: String,
    },
    /// None of the configured roots passed validation at startup
    #[error("None of the configured crawl roots could be validated")]
    NoValidRoots,
    /// The connector account was refused access
    #[error("Unable to access {path}. Make sure the connector account has permission to list the folder and read its ACLs")]
    AccessDenied {
        /// The path that was refused
        path: PathBuf,
    },
    /// A configured root is not a folder
    #[error("{path} is not a directory. Crawl roots must be folders, shares or DFS paths")]
    NotADirectory {
        /// The offending path
        path: PathBuf,
    },
    /// The node does not exist
    #[error("{path} does not exist or is no longer available")]
    NotFound {
        /// The missing path
        path: PathBuf,
    },
    /// A node has no crawl root among its ancestors
    #[error("{path} is not under any configured crawl root")]
    OutsideCrawlRoots {
        /// The path that could not be placed
        path: PathBuf,
    },
    /// Crawling under this root is halted after a failed last-access restore
    #[error("Crawl of {root} is blocked: a last access time could not be restored")]
    RootBlocked {
        /// The blocked crawl root
        root: PathBuf,
    },
    /// A node's last access time could not be written back
    #[error("Unable to restore last access time of {path}: {reason}")]
    LastAccessRestore {
        /// The node whose timestamp was not restored
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },
    /// A document id does not decode to a path
    #[error("Invalid document id: {id}")]
    InvalidDocId {
        /// The rejected id
        id: String,
    },
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectorError {
    /// Classifies an I/O error raised while working on `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ConnectorError::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => ConnectorError::AccessDenied {
                path: path.to_path_buf(),
            },
            io::ErrorKind::NotADirectory => ConnectorError::NotADirectory {
                path: path.to_path_buf(),
            },
            _ => ConnectorError::Io(err),
        }
    }

    /// Maps the error onto a validation failure class, if it is one.
    pub fn validation_failure(&self) -> Option<ValidationFailure> {
        match self {
            ConnectorError::AccessDenied { .. } => Some(ValidationFailure::AccessDenied),
            ConnectorError::NotADirectory { .. } => Some(ValidationFailure::NotADirectory),
            ConnectorError::NotFound { .. } => Some(ValidationFailure::NotFound),
            ConnectorError::Io(e) => Some(match e.kind() {
                io::ErrorKind::NotFound => ValidationFailure::NotFound,
                io::ErrorKind::PermissionDenied => ValidationFailure::AccessDenied,
                io::ErrorKind::NotADirectory => ValidationFailure::NotADirectory,
                _ => ValidationFailure::Io,
            }),
            _ => None,
        }
    }

    /// Recovers an owned error from one shared by a single-flight cache load.
    ///
    /// The last holder gets the original back; everyone else gets an
    /// equivalent copy (I/O errors keep their kind and message).
    pub fn from_shared(err: Arc<ConnectorError>) -> Self {
        match Arc::try_unwrap(err) {
            Ok(owned) => owned,
            Err(shared) => match shared.as_ref() {
                ConnectorError::Config { reason } => ConnectorError::Config {
                    reason: reason.clone(),
                },
                ConnectorError::InvalidTimeFilter { reason } => ConnectorError::InvalidTimeFilter {
                    reason: reason.clone(),
                },
                ConnectorError::NoValidRoots => ConnectorError::NoValidRoots,
                ConnectorError::AccessDenied { path } => ConnectorError::AccessDenied {
                    path: path.clone(),
                },
                ConnectorError::NotADirectory { path } => ConnectorError::NotADirectory {
                    path: path.clone(),
                },
                ConnectorError::NotFound { path } => ConnectorError::NotFound { path: path.clone() },
                ConnectorError::OutsideCrawlRoots { path } => ConnectorError::OutsideCrawlRoots {
                    path: path.clone(),
                },
                ConnectorError::RootBlocked { root } => ConnectorError::RootBlocked {
                    root: root.clone(),
                },
                ConnectorError::LastAccessRestore { path, reason } => {
                    ConnectorError::LastAccessRestore {
                        path: path.clone(),
                        reason: reason.clone(),
                    }
                }
                ConnectorError::InvalidDocId { id } => ConnectorError::InvalidDocId { id: id.clone() },
                ConnectorError::Io(e) => ConnectorError::Io(io::Error::new(e.kind(), e.to_string())),
            },
        }
    }

    /// True when the node is simply gone and the caller should answer not-found.
    pub fn is_not_found(&self) -> bool {
        match self {
            ConnectorError::NotFound { .. } => true,
            ConnectorError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias using ConnectorError as the error type.
pub type Result<T> = std::result::Result<T, ConnectorError>;
