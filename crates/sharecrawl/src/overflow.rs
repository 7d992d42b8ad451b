//! Out-of-band push of folder entries that did not fit in a listing.
//! Handles:
//! - a bounded pool of blocking workers, separate from request threads
//! - re-opening the abandoned enumeration and pushing ids in batches
//! - restoring the folder's last access time once a job ends

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::atime::AccessTimeRestorer;
use crate::delegate::{self, FileDelegate, ListingSource};
use crate::error::{ConnectorError, Result};
use crate::response::DocIdPusher;
use crate::types::DocId;

/// One folder whose entries must be pushed out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowJob {
    pub dir: PathBuf,
    /// Same enumeration the listing used.
    pub source: ListingSource,
    /// Configured root the folder belongs to; blocked if the restore fails
    /// under the mandatory policy.
    pub root: PathBuf,
    /// Access time read before the listing touched the folder.
    pub original_access: DateTime<Utc>,
}

/// A work item for the overflow dispatcher.
#[derive(Debug)]
pub enum OverflowTask {
    Push(OverflowJob),
    /// Stop accepting work; in-flight jobs still finish.
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct OverflowConfig {
    pub workers: usize,
    pub batch_size: usize,
}

impl Default for OverflowConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverflowStats {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub ids_pushed: u64,
}

impl OverflowStats {
    pub fn in_flight(&self) -> u64 {
        self.jobs_submitted
            .saturating_sub(self.jobs_completed + self.jobs_failed)
    }
}

/// Cheap handle for submitting jobs from request threads.
#[derive(Clone)]
pub struct OverflowHandle {
    sender: mpsc::UnboundedSender<OverflowTask>,
    stats_tx: Arc<watch::Sender<OverflowStats>>,
    stats_rx: watch::Receiver<OverflowStats>,
}

impl OverflowHandle {
    /// Queues a job without blocking. Fails once the pool has shut down.
    pub fn submit(&self, job: OverflowJob) -> Result<()> {
        debug!(dir = %job.dir.display(), "queueing overflow job");
        self.stats_tx.send_modify(|s| s.jobs_submitted += 1);
        if self.sender.send(OverflowTask::Push(job)).is_err() {
            self.stats_tx.send_modify(|s| s.jobs_submitted -= 1);
            return Err(ConnectorError::Io(std::io::Error::other(
                "overflow pool shut down",
            )));
        }
        Ok(())
    }

    pub fn stats(&self) -> OverflowStats {
        self.stats_rx.borrow().clone()
    }

    /// Resolves once every submitted job has finished.
    pub async fn wait_idle(&self) {
        let mut rx = self.stats_rx.clone();
        let _ = rx.wait_for(|s| s.in_flight() == 0).await;
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Owner of the dispatcher task.
pub struct OverflowPool {
    handle: OverflowHandle,
    dispatcher: JoinHandle<()>,
}

struct JobContext {
    delegate: Arc<dyn FileDelegate>,
    pusher: Arc<dyn DocIdPusher>,
    restorer: Arc<AccessTimeRestorer>,
    batch_size: usize,
}

impl OverflowPool {
    /// Starts the dispatcher. Must be called from within a Tokio runtime.
    pub fn start(
        config: OverflowConfig,
        delegate: Arc<dyn FileDelegate>,
        pusher: Arc<dyn DocIdPusher>,
        restorer: Arc<AccessTimeRestorer>,
    ) -> Self {
        let (sender, rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(OverflowStats::default());
        let stats_tx = Arc::new(stats_tx);
        let ctx = Arc::new(JobContext {
            delegate,
            pusher,
            restorer,
            batch_size: config.batch_size.max(1),
        });
        let dispatcher = tokio::spawn(dispatch(
            rx,
            ctx,
            Arc::new(Semaphore::new(config.workers.max(1))),
            Arc::clone(&stats_tx),
        ));
        Self {
            handle: OverflowHandle {
                sender,
                stats_tx,
                stats_rx,
            },
            dispatcher,
        }
    }

    pub fn handle(&self) -> OverflowHandle {
        self.handle.clone()
    }

    /// Stops the dispatcher after in-flight jobs finish.
    pub async fn shutdown(self) {
        let _ = self.handle.sender.send(OverflowTask::Shutdown);
        if let Err(e) = self.dispatcher.await {
            warn!("overflow dispatcher ended abnormally: {}", e);
        }
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<OverflowTask>,
    ctx: Arc<JobContext>,
    slots: Arc<Semaphore>,
    stats: Arc<watch::Sender<OverflowStats>>,
) {
    let mut jobs = JoinSet::new();
    while let Some(task) = rx.recv().await {
        let job = match task {
            OverflowTask::Push(job) => job,
            OverflowTask::Shutdown => break,
        };
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            abandon(&job, &stats);
            break;
        };
        let ctx = Arc::clone(&ctx);
        let stats = Arc::clone(&stats);
        jobs.spawn_blocking(move || {
            let _permit = permit;
            ctx.run(job, &stats);
        });
        while jobs.try_join_next().is_some() {}
    }
    rx.close();
    // Jobs queued behind the shutdown message were accepted by submit().
    while let Ok(task) = rx.try_recv() {
        if let OverflowTask::Push(job) = task {
            abandon(&job, &stats);
        }
    }
    while jobs.join_next().await.is_some() {}
}

fn abandon(job: &OverflowJob, stats: &watch::Sender<OverflowStats>) {
    warn!(dir = %job.dir.display(), "overflow pool stopped before the job ran, entries left for the next crawl");
    stats.send_modify(|s| s.jobs_submitted = s.jobs_submitted.saturating_sub(1));
}

impl JobContext {
    fn run(&self, job: OverflowJob, stats: &watch::Sender<OverflowStats>) {
        let result = self.push_entries(&job, stats);
        // Error is logged and the root blocked inside restore() when required.
        let _ = self
            .restorer
            .restore(&job.dir, job.original_access, &job.root);
        match result {
            Ok(pushed) => {
                debug!(dir = %job.dir.display(), pushed, "overflow job complete");
                stats.send_modify(|s| s.jobs_completed += 1);
            }
            Err(e) => {
                warn!(dir = %job.dir.display(), "overflow job failed, entries left for the next crawl: {}", e);
                stats.send_modify(|s| s.jobs_failed += 1);
            }
        }
    }

    fn push_entries(&self, job: &OverflowJob, stats: &watch::Sender<OverflowStats>) -> Result<u64> {
        let stream = delegate::list(self.delegate.as_ref(), &job.dir, job.source)?;
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut pushed = 0u64;
        for entry in stream {
            batch.push(self.delegate.new_doc_id(&entry?)?);
            if batch.len() == self.batch_size {
                pushed += self.flush(&mut batch, stats)?;
            }
        }
        if !batch.is_empty() {
            pushed += self.flush(&mut batch, stats)?;
        }
        Ok(pushed)
    }

    fn flush(
        &self,
        batch: &mut Vec<DocId>,
        stats: &watch::Sender<OverflowStats>,
    ) -> Result<u64> {
        self.pusher.push_doc_ids(batch)?;
        let n = batch.len() as u64;
        stats.send_modify(|s| s.ids_pushed += n);
        batch.clear();
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreserveLastAccess;
    use crate::memfs::MemFs;
    use crate::response::RecordingPusher;
    use crate::status::StatusTracker;
    use crate::time_filter::FixedClock;
    use chrono::TimeZone;
    use std::path::Path;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    struct Fixture {
        fs: Arc<MemFs>,
        pusher: Arc<RecordingPusher>,
        status: Arc<StatusTracker>,
        pool: OverflowPool,
    }

    fn fixture(files: usize, batch_size: usize, policy: PreserveLastAccess) -> Fixture {
        let fs = Arc::new(MemFs::new(base()));
        fs.add_share("/s").add_dir("/s/big");
        for i in 0..files {
            fs.add_file(&format!("/s/big/{:04}.txt", i), b"x");
        }
        let pusher = Arc::new(RecordingPusher::new());
        let status = Arc::new(StatusTracker::new(Arc::new(FixedClock(base()))));
        let restorer = Arc::new(AccessTimeRestorer::new(fs.clone(), policy, status.clone()));
        let pool = OverflowPool::start(
            OverflowConfig {
                workers: 2,
                batch_size,
            },
            fs.clone(),
            pusher.clone(),
            restorer,
        );
        Fixture {
            fs,
            pusher,
            status,
            pool,
        }
    }

    fn job() -> OverflowJob {
        OverflowJob {
            dir: PathBuf::from("/s/big"),
            source: ListingSource::Children,
            root: PathBuf::from("/s"),
            original_access: base(),
        }
    }

    #[tokio::test]
    async fn test_job_pushes_full_listing_in_batches() {
        let f = fixture(25, 10, PreserveLastAccess::Always);
        let handle = f.pool.handle();
        handle.submit(job()).unwrap();
        handle.wait_idle().await;

        let batches = f.pusher.batches();
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), [10, 10, 5]);
        assert_eq!(f.pusher.pushed()[0], DocId::new("/s/big/0000.txt"));
        let stats = handle.stats();
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.ids_pushed, 25);
        assert_eq!(f.fs.accessed("/s/big"), Some(base()));
        f.pool.shutdown().await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_failed_job_still_restores_and_does_not_retry() {
        let f = fixture(3, 10, PreserveLastAccess::Always);
        f.fs.remove("/s/big");
        let handle = f.pool.handle();
        handle.submit(job()).unwrap();
        handle.wait_idle().await;

        let stats = handle.stats();
        assert_eq!(stats.jobs_failed, 1);
        assert_eq!(stats.jobs_submitted, 1);
        assert!(f.pusher.pushed().is_empty());
        assert_eq!(f.fs.restore_count(), 1);
        f.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_restore_failure_blocks_root() {
        let f = fixture(3, 10, PreserveLastAccess::Always);
        f.fs.fail_last_access_restore(true);
        let handle = f.pool.handle();
        handle.submit(job()).unwrap();
        handle.wait_idle().await;
        assert_eq!(f.pusher.pushed().len(), 3);
        assert!(f.status.is_blocked(Path::new("/s")));
        f.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let f = fixture(1, 10, PreserveLastAccess::Never);
        let handle = f.pool.handle();
        f.pool.shutdown().await;
        assert!(handle.submit(job()).is_err());
    }

    #[tokio::test]
    async fn test_job_queued_behind_shutdown_is_released() {
        let f = fixture(3, 10, PreserveLastAccess::Never);
        let handle = f.pool.handle();
        // Current-thread runtime: the dispatcher cannot run until we await.
        handle.sender.send(OverflowTask::Shutdown).unwrap();
        handle.submit(job()).unwrap();
        assert_eq!(handle.stats().in_flight(), 1);

        tokio::time::timeout(std::time::Duration::from_secs(5), handle.wait_idle())
            .await
            .expect("wait_idle returns once the queued job is released");
        assert_eq!(handle.stats().jobs_submitted, 0);
        assert!(f.pusher.pushed().is_empty());
        f.pool.dispatcher.await.unwrap();
        assert!(!handle.is_running());
    }
}
