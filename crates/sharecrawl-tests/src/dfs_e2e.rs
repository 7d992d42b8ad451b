//! DFS namespaces: link-only listings, the three-tier Acl chain at link
//! anchors and per-link status

use std::path::Path;
use std::sync::Arc;

use sharecrawl::acl::{InheritFrom, PropagationClass, DFS_SHARE_ACL, SHARE_ACL};
use sharecrawl::delegate::AclView;
use sharecrawl::response::Outcome;
use sharecrawl::status::HealthState;
use sharecrawl::{ConnectorConfig, DocId, MemFs};

use crate::fixtures::{allow_group, base_time, hrefs, inherited, Harness};

/// ```text
/// /dfs              namespace
///   eng  -> /store/eng   link, Staff
///   ops  -> /store/ops   link, Ops
///   notes.txt            ordinary file in the namespace
/// ```
fn namespace() -> Arc<MemFs> {
    let fs = Arc::new(MemFs::new(base_time()));
    fs.add_dfs_namespace("/dfs")
        .add_dfs_link(
            "/dfs/eng",
            "/store/eng",
            AclView::new(vec![allow_group("CORP\\Staff")]),
        )
        .add_dfs_link("/dfs/ops", "/store/ops", AclView::new(vec![allow_group("CORP\\Ops")]))
        .add_share("/store/eng")
        .add_share("/store/ops")
        .add_file("/dfs/eng/design.txt", b"design")
        .set_acl_views("/dfs/eng/design.txt", inherited(vec![allow_group("Everyone")]))
        .add_file("/dfs/notes.txt", b"notes");
    fs
}

#[tokio::test]
async fn test_namespace_root_lists_links_only() {
    let h = Harness::start(namespace(), ConnectorConfig::with_roots(&["/dfs"]));
    let root = h.fetch("/dfs");
    assert_eq!(hrefs(&root.body_text()), ["/dfs/eng", "/dfs/ops"]);
    let names: Vec<&str> = root.named_resources.keys().map(String::as_str).collect();
    assert_eq!(names, [SHARE_ACL]);
    assert_eq!(
        root.acl.unwrap().inherit_from,
        Some(InheritFrom::new(DocId::new("/dfs"), SHARE_ACL))
    );
    h.shutdown().await;
}

#[tokio::test]
async fn test_link_anchor_chains_through_dfs_acl() {
    let h = Harness::start(namespace(), ConnectorConfig::with_roots(&["/dfs"]));
    let link = h.fetch("/dfs/eng");
    assert_eq!(link.outcome, Outcome::Content);

    let share = &link.named_resources[SHARE_ACL];
    assert_eq!(
        share.inherit_from,
        Some(InheritFrom::new(DocId::new("/dfs/eng"), DFS_SHARE_ACL))
    );
    let dfs = &link.named_resources[DFS_SHARE_ACL];
    assert!(dfs.inherit_from.is_none());
    assert_eq!(dfs.permits.len(), 1);

    assert_eq!(
        link.acl.unwrap().inherit_from,
        Some(InheritFrom::new(DocId::new("/dfs/eng"), SHARE_ACL))
    );
    for class in PropagationClass::ALL {
        assert_eq!(
            link.named_resources[class.fragment()].inherit_from,
            Some(InheritFrom::new(DocId::new("/dfs/eng"), SHARE_ACL))
        );
    }

    let file = h.fetch("/dfs/eng/design.txt");
    assert_eq!(file.body_text(), "design");
    assert_eq!(
        file.acl.unwrap().inherit_from,
        Some(InheritFrom::new(
            DocId::new("/dfs/eng"),
            PropagationClass::ChildFilesOnly.fragment()
        ))
    );
    assert_eq!(h.fs.monitored_roots(), [Path::new("/dfs/eng").to_path_buf()]);
    h.shutdown().await;
}

#[tokio::test]
async fn test_ordinary_namespace_content_carries_no_acl() {
    let h = Harness::start(namespace(), ConnectorConfig::with_roots(&["/dfs"]));
    let notes = h.fetch("/dfs/notes.txt");
    assert!(notes.acl.is_none());
    assert!(notes.named_resources.is_empty());
    h.shutdown().await;
}

#[tokio::test]
async fn test_files_allowed_in_namespace() {
    let mut config = ConnectorConfig::with_roots(&["/dfs"]);
    config.allow_files_in_dfs_namespaces = true;
    let h = Harness::start(namespace(), config);

    let root = h.fetch("/dfs");
    assert_eq!(
        hrefs(&root.body_text()),
        ["/dfs/eng", "/dfs/notes.txt", "/dfs/ops"]
    );
    assert_eq!(root.named_resources.len(), 5);

    let notes = h.fetch("/dfs/notes.txt");
    assert_eq!(
        notes.acl.unwrap().inherit_from,
        Some(InheritFrom::new(DocId::new("/dfs"), SHARE_ACL))
    );
    h.shutdown().await;
}

#[tokio::test]
async fn test_links_have_their_own_status() {
    let fs = namespace();
    fs.remove("/store/ops");
    let h = Harness::start(fs.clone(), ConnectorConfig::with_roots(&["/dfs"]));
    let status = h.connector.status();
    let paths: Vec<&Path> = status.iter().map(|(p, _)| p.as_path()).collect();
    assert_eq!(paths, [Path::new("/dfs"), Path::new("/dfs/eng"), Path::new("/dfs/ops")]);
    assert!(status[0].1.state.is_ok());
    assert!(status[1].1.state.is_ok());
    assert_eq!(status[2].1.state, HealthState::Unavailable);

    // The healthy link keeps serving.
    assert_eq!(h.fetch("/dfs/eng/design.txt").body_text(), "design");
    assert!(h.try_fetch("/dfs/ops").is_err());
    h.shutdown().await;
}

#[tokio::test]
async fn test_link_configured_as_root() {
    let h = Harness::start(namespace(), ConnectorConfig::with_roots(&["/dfs/eng"]));
    let link = h.fetch("/dfs/eng");
    assert!(link.named_resources.contains_key(SHARE_ACL));
    let file = h.fetch("/dfs/eng/design.txt");
    assert_eq!(file.body_text(), "design");
    h.shutdown().await;
}
