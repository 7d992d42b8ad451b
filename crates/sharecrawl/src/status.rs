//! Per-root health records and the periodic re-validation sweep

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ConnectorError, ValidationFailure};
use crate::share::ShareResolver;
use crate::time_filter::Clock;

/// Health of one crawl root or DFS link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Root validated
    Ok,
    /// Root needs operator attention (permissions, configuration, blocked)
    Error,
    /// Root could not be reached; retried on the next sweep
    Unavailable,
}

impl HealthState {
    pub fn is_ok(&self) -> bool {
        matches!(self, HealthState::Ok)
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            HealthState::Ok => "ok",
            HealthState::Error => "error",
            HealthState::Unavailable => "unavailable",
        }
    }
}

/// Latest recorded status of a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootStatus {
    pub state: HealthState,
    /// Dashboard code: `ok`, `blocked` or a [`ValidationFailure`] code.
    pub code: String,
    /// Operator-facing diagnostic; empty when healthy.
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

impl RootStatus {
    pub fn ok(checked_at: DateTime<Utc>) -> Self {
        Self {
            state: HealthState::Ok,
            code: "ok".to_string(),
            message: String::new(),
            checked_at,
        }
    }

    /// Status for a failed validation. Access and configuration problems are
    /// errors; missing or unreachable roots are unavailable.
    pub fn failed(err: &ConnectorError, checked_at: DateTime<Utc>) -> Self {
        let failure = err.validation_failure().unwrap_or(ValidationFailure::Io);
        let state = match failure {
            ValidationFailure::AccessDenied | ValidationFailure::NotADirectory => HealthState::Error,
            ValidationFailure::NotFound | ValidationFailure::Io => HealthState::Unavailable,
        };
        Self {
            state,
            code: failure.code().to_string(),
            message: err.to_string(),
            checked_at,
        }
    }

    pub fn blocked(reason: &str, checked_at: DateTime<Utc>) -> Self {
        Self {
            state: HealthState::Error,
            code: "blocked".to_string(),
            message: reason.to_string(),
            checked_at,
        }
    }
}

/// Process-wide health map and blocked-root set.
pub struct StatusTracker {
    health: DashMap<PathBuf, RootStatus>,
    blocked: DashMap<PathBuf, String>,
    clock: Arc<dyn Clock>,
}

impl StatusTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            health: DashMap::new(),
            blocked: DashMap::new(),
            clock,
        }
    }

    pub fn record_ok(&self, root: &Path) {
        self.health
            .insert(root.to_path_buf(), RootStatus::ok(self.clock.now()));
    }

    pub fn record_failure(&self, root: &Path, err: &ConnectorError) {
        let status = RootStatus::failed(err, self.clock.now());
        warn!(root = %root.display(), code = %status.code, "crawl root unhealthy: {}", err);
        self.health.insert(root.to_path_buf(), status);
    }

    /// Halts crawling under `root` until [`StatusTracker::unblock`].
    pub fn block(&self, root: &Path, reason: &str) {
        error!(root = %root.display(), "blocking crawl root: {}", reason);
        self.blocked.insert(root.to_path_buf(), reason.to_string());
        self.health.insert(
            root.to_path_buf(),
            RootStatus::blocked(reason, self.clock.now()),
        );
    }

    pub fn unblock(&self, root: &Path) -> bool {
        let removed = self.blocked.remove(root).is_some();
        if removed {
            info!(root = %root.display(), "crawl root unblocked");
        }
        removed
    }

    pub fn is_blocked(&self, root: &Path) -> bool {
        self.blocked.contains_key(root)
    }

    pub fn get(&self, root: &Path) -> Option<RootStatus> {
        self.health.get(root).map(|s| s.clone())
    }

    /// Every recorded root and link, sorted by path.
    pub fn snapshot(&self) -> Vec<(PathBuf, RootStatus)> {
        let mut entries: Vec<_> = self
            .health
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn healthy_count(&self) -> usize {
        self.health.iter().filter(|e| e.value().state.is_ok()).count()
    }

    /// Re-validates every configured root that is not blocked. Blocks on
    /// delegate I/O.
    pub fn sweep(&self, resolver: &ShareResolver) {
        for root in resolver.roots().iter() {
            if self.is_blocked(root) {
                debug!(root = %root.display(), "skipping blocked root in status sweep");
                continue;
            }
            // Outcome is recorded by the resolver.
            let _ = resolver.validate(root);
        }
    }

    /// Starts the periodic sweep. The first run happens one period from now.
    pub fn spawn_sweep(self: &Arc<Self>, resolver: Arc<ShareResolver>, period: Duration) -> SweepHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let tracker = Arc::clone(self);
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let tracker = Arc::clone(&tracker);
                        let resolver = Arc::clone(&resolver);
                        if let Err(e) = tokio::task::spawn_blocking(move || tracker.sweep(&resolver)).await {
                            error!("status sweep panicked: {}", e);
                        }
                    }
                }
            }
            debug!("status sweep stopped");
        });
        SweepHandle {
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Handle to the running status sweep.
pub struct SweepHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.task.await;
    }
}
