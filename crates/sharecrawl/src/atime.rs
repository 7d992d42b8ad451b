//! Writing last access times back after the crawler has read a node.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::PreserveLastAccess;
use crate::datefmt;
use crate::delegate::FileDelegate;
use crate::error::{ConnectorError, Result};
use crate::status::StatusTracker;

/// Restores access times under the configured policy. Shared by the
/// synchronous crawl path and overflow jobs.
pub struct AccessTimeRestorer {
    delegate: Arc<dyn FileDelegate>,
    policy: PreserveLastAccess,
    status: Arc<StatusTracker>,
}

impl AccessTimeRestorer {
    pub fn new(
        delegate: Arc<dyn FileDelegate>,
        policy: PreserveLastAccess,
        status: Arc<StatusTracker>,
    ) -> Self {
        Self {
            delegate,
            policy,
            status,
        }
    }

    pub fn policy(&self) -> PreserveLastAccess {
        self.policy
    }

    /// Puts `original` back on `path`.
    ///
    /// Under [`PreserveLastAccess::Always`] a failure blocks `root` and is
    /// returned; under [`PreserveLastAccess::IfAllowed`] it is only logged.
    pub fn restore(&self, path: &Path, original: DateTime<Utc>, root: &Path) -> Result<()> {
        if self.policy == PreserveLastAccess::Never {
            return Ok(());
        }
        let err = match self.delegate.set_last_access_time(path, original) {
            Ok(()) => {
                debug!(
                    path = %path.display(),
                    "restored last access time to {}",
                    datefmt::format_timestamp(original)
                );
                return Ok(());
            }
            Err(e) => e,
        };
        let reason = match err {
            ConnectorError::LastAccessRestore { reason, .. } => reason,
            other => other.to_string(),
        };
        match self.policy {
            PreserveLastAccess::Always => {
                self.status.block(
                    root,
                    &format!("last access time of {} not restored: {}", path.display(), reason),
                );
                Err(ConnectorError::LastAccessRestore {
                    path: path.to_path_buf(),
                    reason,
                })
            }
            _ => {
                warn!(path = %path.display(), "unable to restore last access time: {}", reason);
                Ok(())
            }
        }
    }
}
