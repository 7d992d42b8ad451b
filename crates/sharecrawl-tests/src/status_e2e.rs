//! Root health: startup validation, on-demand and periodic sweeps, and
//! per-root isolation of blocked roots

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sharecrawl::config::PreserveLastAccess;
use sharecrawl::status::HealthState;
use sharecrawl::{ConnectorConfig, ConnectorError, MemFs};

use crate::fixtures::{base_time, Harness};

fn two_shares() -> Arc<MemFs> {
    let fs = Arc::new(MemFs::new(base_time()));
    fs.add_share("/a")
        .add_file("/a/one.txt", b"1")
        .add_share("/b")
        .add_file("/b/two.txt", b"2");
    fs
}

fn state_of(h: &Harness, root: &str) -> (HealthState, String) {
    let status = h
        .connector
        .status_tracker()
        .get(Path::new(root))
        .expect("root has a status");
    (status.state, status.code)
}

#[tokio::test]
async fn test_startup_needs_one_valid_root() {
    let fs = Arc::new(MemFs::new(base_time()));
    let err = Harness::try_start(fs, ConnectorConfig::with_roots(&["/a", "/b"]))
        .err()
        .expect("no valid roots");
    assert!(matches!(err, ConnectorError::NoValidRoots));
}

#[tokio::test]
async fn test_failures_are_classified() {
    let fs = two_shares();
    fs.add_file("/c", b"not a folder");
    fs.deny_access("/b", true);
    let h = Harness::start(fs, ConnectorConfig::with_roots(&["/a", "/b", "/c", "/d"]));
    assert_eq!(state_of(&h, "/a"), (HealthState::Ok, "ok".to_string()));
    assert_eq!(
        state_of(&h, "/b"),
        (HealthState::Error, "access-denied".to_string())
    );
    assert_eq!(
        state_of(&h, "/c"),
        (HealthState::Error, "not-a-directory".to_string())
    );
    assert_eq!(
        state_of(&h, "/d"),
        (HealthState::Unavailable, "not-found".to_string())
    );
    assert_eq!(h.connector.status_tracker().healthy_count(), 1);
    h.shutdown().await;
}

#[tokio::test]
async fn test_refresh_recovers_and_degrades() {
    let fs = two_shares();
    fs.deny_access("/b", true);
    let h = Harness::start(fs.clone(), ConnectorConfig::with_roots(&["/a", "/b"]));
    assert!(!state_of(&h, "/b").0.is_ok());

    fs.deny_access("/b", false);
    fs.remove("/a");
    h.connector.refresh_status();
    assert!(state_of(&h, "/b").0.is_ok());
    assert_eq!(state_of(&h, "/a").0, HealthState::Unavailable);
    h.shutdown().await;
}

#[tokio::test]
async fn test_blocked_root_is_isolated() {
    let fs = two_shares();
    let mut config = ConnectorConfig::with_roots(&["/a", "/b"]);
    config.preserve_last_access_time = PreserveLastAccess::Always;
    let h = Harness::start(fs.clone(), config);

    fs.fail_last_access_restore(true);
    assert!(matches!(
        h.try_fetch("/a/one.txt"),
        Err(ConnectorError::LastAccessRestore { .. })
    ));
    fs.fail_last_access_restore(false);

    assert!(matches!(
        h.try_fetch("/a/one.txt"),
        Err(ConnectorError::RootBlocked { .. })
    ));
    assert_eq!(h.fetch("/b/two.txt").body_text(), "2");

    h.connector.refresh_status();
    assert_eq!(state_of(&h, "/a"), (HealthState::Error, "blocked".to_string()));
    assert!(state_of(&h, "/b").0.is_ok());
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_periodic_sweep_updates_status() {
    let fs = two_shares();
    let mut config = ConnectorConfig::with_roots(&["/a", "/b"]);
    config.status_update_interval_mins = 1;
    let h = Harness::start(fs.clone(), config);
    assert!(state_of(&h, "/b").0.is_ok());

    fs.remove("/b");
    tokio::time::sleep(Duration::from_secs(61)).await;
    let mut swept = false;
    for _ in 0..200 {
        if state_of(&h, "/b").0 == HealthState::Unavailable {
            swept = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
        tokio::task::yield_now().await;
    }
    assert!(swept, "sweep never recorded the missing root");
    h.shutdown().await;
}
