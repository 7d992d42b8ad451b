//! Truncated listings and the out-of-band push of the full folder

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use proptest::prelude::*;
use sharecrawl::config::PreserveLastAccess;
use sharecrawl::{ConnectorConfig, DocId, MemFs};

use crate::fixtures::{base_time, hrefs, Harness};

fn big_folder(files: usize) -> Arc<MemFs> {
    let fs = Arc::new(MemFs::new(base_time()));
    fs.add_share("/big").add_dir("/big/inbox");
    for i in 0..files {
        fs.add_file(&format!("/big/inbox/{:04}.eml", i), b"mail");
    }
    fs
}

fn config(max_links: usize, batch: usize) -> ConnectorConfig {
    let mut config = ConnectorConfig::with_roots(&["/big"]);
    config.max_html_links = max_links;
    config.async_push_batch_size = batch;
    config
}

#[tokio::test]
async fn test_truncated_listing_pushes_full_folder_once() {
    let h = Harness::start(big_folder(25), config(10, 4));
    let listing = h.fetch("/big/inbox");
    let links = hrefs(&listing.body_text());
    assert_eq!(links.len(), 10);
    assert_eq!(listing.body_text().matches("Only the first 10 entries").count(), 1);

    let overflow = h.connector.overflow();
    overflow.wait_idle().await;
    let stats = overflow.stats();
    assert_eq!(stats.jobs_submitted, 1);
    assert_eq!(stats.jobs_completed, 1);
    assert_eq!(stats.ids_pushed, 25);

    let sizes: Vec<usize> = h.pusher.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, [4, 4, 4, 4, 4, 4, 1]);
    let pushed: BTreeSet<DocId> = h.pusher.pushed().into_iter().collect();
    assert_eq!(pushed.len(), 25);
    for link in links {
        assert!(pushed.contains(&DocId::new(link)));
    }
    h.shutdown().await;
}

#[tokio::test]
async fn test_listing_at_threshold_is_complete() {
    let h = Harness::start(big_folder(10), config(10, 4));
    let listing = h.fetch("/big/inbox");
    assert_eq!(hrefs(&listing.body_text()).len(), 10);
    assert!(!listing.body_text().contains("Only the first"));
    h.connector.overflow().wait_idle().await;
    assert_eq!(h.connector.overflow().stats().jobs_submitted, 0);
    assert!(h.pusher.pushed().is_empty());
    h.shutdown().await;
}

#[tokio::test]
async fn test_crawl_reaches_overflowed_entries() {
    let h = Harness::start(big_folder(30), config(7, 8));
    let crawled = h.crawl_all().await;
    let files = crawled
        .keys()
        .filter(|id| id.as_str().ends_with(".eml"))
        .count();
    assert_eq!(files, 30);
    h.shutdown().await;
}

#[tokio::test]
async fn test_folder_access_time_restored_after_job() {
    let h = Harness::start(big_folder(12), config(5, 100));
    h.fetch("/big/inbox");
    h.connector.overflow().wait_idle().await;
    assert_eq!(h.fs.accessed("/big/inbox"), Some(base_time()));
    h.shutdown().await;
}

#[tokio::test]
async fn test_restore_failure_in_job_blocks_root() {
    let mut cfg = config(5, 100);
    cfg.preserve_last_access_time = PreserveLastAccess::Always;
    let h = Harness::start(big_folder(12), cfg);
    h.fs.fail_last_access_restore(true);
    assert!(h.try_fetch("/big/inbox").is_err());
    let overflow = h.connector.overflow();
    overflow.wait_idle().await;
    assert_eq!(overflow.stats().ids_pushed, 12);
    assert!(h.connector.status_tracker().is_blocked(Path::new("/big")));
    h.shutdown().await;
}

#[tokio::test]
async fn test_vanished_folder_fails_job_without_retry() {
    let fs = big_folder(12);
    let h = Harness::start(fs.clone(), config(5, 100));
    h.fetch("/big/inbox");
    fs.remove("/big/inbox");
    let overflow = h.connector.overflow();
    overflow.wait_idle().await;
    let stats = overflow.stats();
    assert_eq!(stats.jobs_completed + stats.jobs_failed, 1);
    assert_eq!(stats.jobs_submitted, 1);
    h.shutdown().await;
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_listing_plus_overflow_covers_folder(files in 0usize..40, max_links in 1usize..15) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = Harness::start(big_folder(files), config(max_links, 3));
            let listing = h.fetch("/big/inbox");
            let links = hrefs(&listing.body_text());
            h.connector.overflow().wait_idle().await;
            let pushed = h.pusher.pushed();

            assert_eq!(links.len(), files.min(max_links));
            if files > max_links {
                assert_eq!(pushed.len(), files);
            } else {
                assert!(pushed.is_empty());
            }
            h.shutdown().await;
        });
    }
}
