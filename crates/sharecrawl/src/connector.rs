//! Startup, wiring and shutdown of the crawl engine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::acl::AuthzStatus;
use crate::atime::AccessTimeRestorer;
use crate::authz::{AuthzResolver, Identity};
use crate::config::ConnectorConfig;
use crate::crawler::{CrawlSettings, Crawler, CrawlerParts};
use crate::delegate::FileDelegate;
use crate::error::{ConnectorError, Result};
use crate::overflow::{OverflowConfig, OverflowHandle, OverflowPool};
use crate::response::{DocIdPusher, Request, Response};
use crate::roots::CrawlRoots;
use crate::share::ShareResolver;
use crate::status::{RootStatus, StatusTracker, SweepHandle};
use crate::time_filter::{Clock, TimeFilter};
use crate::types::DocId;
use crate::visibility::VisibilityCache;

/// A running connector.
pub struct Connector {
    crawler: Arc<Crawler>,
    authz: AuthzResolver,
    status: Arc<StatusTracker>,
    shares: Arc<ShareResolver>,
    pusher: Arc<dyn DocIdPusher>,
    overflow: OverflowPool,
    sweep: SweepHandle,
}

impl Connector {
    /// Validates configuration and roots, then starts the overflow pool and
    /// the status sweep. Must be called from within a Tokio runtime.
    ///
    /// Fails unless at least one configured root validates.
    pub fn init(
        config: &ConnectorConfig,
        delegate: Arc<dyn FileDelegate>,
        pusher: Arc<dyn DocIdPusher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let last_access_filter = TimeFilter::from_settings(
            config.last_accessed_date.as_deref(),
            config.last_accessed_days,
            Arc::clone(&clock),
        )?;
        let last_modified_filter = TimeFilter::from_settings(
            config.last_modified_date.as_deref(),
            config.last_modified_days,
            Arc::clone(&clock),
        )?;

        let mut roots = Vec::new();
        for raw in config.roots()? {
            match delegate.canonical_path(&raw) {
                Ok(root) => roots.push(root),
                Err(e) => {
                    warn!(root = %raw.display(), "unable to resolve crawl root: {}", e);
                    roots.push(raw);
                }
            }
        }
        let roots = Arc::new(CrawlRoots::new(roots));
        let policy = config.account_policy();
        let status = Arc::new(StatusTracker::new(Arc::clone(&clock)));
        let shares = Arc::new(ShareResolver::new(
            Arc::clone(&delegate),
            Arc::clone(&roots),
            policy.clone(),
            config.skip_share_access_control,
            Arc::clone(&status),
        ));

        let valid = roots
            .iter()
            .filter(|root| shares.validate(root).is_ok())
            .count();
        if valid == 0 {
            return Err(ConnectorError::NoValidRoots);
        }
        info!("{} of {} crawl roots validated", valid, roots.len());

        let restorer = Arc::new(AccessTimeRestorer::new(
            Arc::clone(&delegate),
            config.preserve_last_access_time,
            Arc::clone(&status),
        ));
        let overflow = OverflowPool::start(
            OverflowConfig {
                workers: config.async_push_workers,
                batch_size: config.async_push_batch_size,
            },
            Arc::clone(&delegate),
            Arc::clone(&pusher),
            Arc::clone(&restorer),
        );
        let visibility = VisibilityCache::new(
            Arc::clone(&delegate),
            Arc::clone(&roots),
            config.crawl_hidden_files,
            config.directory_cache_size,
            Duration::from_secs(config.directory_cache_ttl_secs),
        );
        let crawler = Arc::new(Crawler::new(
            CrawlerParts {
                delegate: Arc::clone(&delegate),
                roots: Arc::clone(&roots),
                visibility,
                shares: Arc::clone(&shares),
                status: Arc::clone(&status),
                restorer,
                overflow: overflow.handle(),
                pusher: Arc::clone(&pusher),
                policy: policy.clone(),
                last_access_filter,
                last_modified_filter,
            },
            CrawlSettings {
                index_folders: config.index_folders,
                max_html_links: config.max_html_links,
                allow_files_in_dfs_namespaces: config.allow_files_in_dfs_namespaces,
                search_results_link_to_repository: config.search_results_link_to_repository,
                monitor_for_updates: config.monitor_for_updates,
            },
        ));
        let authz = AuthzResolver::new(delegate, roots, Arc::clone(&shares), policy);
        let sweep = status.spawn_sweep(
            Arc::clone(&shares),
            config.status_update_interval(),
        );

        Ok(Self {
            crawler,
            authz,
            status,
            shares,
            pusher,
            overflow,
            sweep,
        })
    }

    /// Pushes the ids of every crawl root to the crawl queue.
    pub fn get_doc_ids(&self) -> Result<()> {
        let ids = self.crawler.start_ids()?;
        self.pusher.push_doc_ids(&ids)
    }

    pub fn get_doc_content(&self, request: &Request, response: &mut dyn Response) -> Result<()> {
        self.crawler.get_doc_content(request, response)
    }

    pub fn is_user_authorized(
        &self,
        identity: &Identity,
        ids: &[DocId],
    ) -> BTreeMap<DocId, AuthzStatus> {
        self.authz.is_user_authorized(identity, ids)
    }

    /// Dashboard view: every root and link, sorted by path.
    pub fn status(&self) -> Vec<(PathBuf, RootStatus)> {
        self.status.snapshot()
    }

    /// Re-validates every unblocked root now instead of waiting for the sweep.
    pub fn refresh_status(&self) {
        self.status.sweep(&self.shares);
    }

    pub fn status_tracker(&self) -> &Arc<StatusTracker> {
        &self.status
    }

    pub fn crawler(&self) -> &Arc<Crawler> {
        &self.crawler
    }

    pub fn overflow(&self) -> OverflowHandle {
        self.overflow.handle()
    }

    pub async fn shutdown(self) {
        self.sweep.stop().await;
        self.overflow.shutdown().await;
        info!("connector stopped");
    }
}
