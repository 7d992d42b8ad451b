#![warn(missing_docs)]

//! Share crawler: inherited access-control resolution, bounded folder
//! traversal, out-of-band overflow push and root health for Windows and DFS
//! file shares.

pub mod acl;
pub mod acl_builder;
pub mod atime;
pub mod authz;
pub mod cli;
pub mod config;
pub mod connector;
pub mod crawler;
pub mod datefmt;
pub mod delegate;
pub mod error;
pub mod listing;
pub mod local;
pub mod memfs;
pub mod mime;
pub mod overflow;
pub mod response;
pub mod roots;
pub mod share;
pub mod status;
pub mod time_filter;
pub mod types;
pub mod visibility;

pub use acl::{Acl, AuthzStatus, InheritFrom, InheritanceType, PropagationClass};
pub use authz::{AuthzResolver, Identity};
pub use config::{ConnectorConfig, PreserveLastAccess};
pub use connector::Connector;
pub use delegate::FileDelegate;
pub use error::{ConnectorError, Result};
pub use memfs::MemFs;
pub use response::{DocIdPusher, Request, Response};
pub use status::{HealthState, RootStatus, StatusTracker};
pub use types::{DocId, NodeAttributes, NodeKind, Principal};
