//! Full crawls over an in-memory share: reachability, exclusions, emitted
//! Acl pointers and incremental recrawl answers

use chrono::{Duration, TimeZone, Utc};
use sharecrawl::acl::{InheritFrom, PropagationClass, SHARE_ACL};
use sharecrawl::response::{Outcome, RecordingResponse};
use sharecrawl::{ConnectorConfig, DocId, Request};

use crate::fixtures::{base_time, corp_share, Harness};

fn ids(names: &[&str]) -> Vec<DocId> {
    names.iter().map(|n| DocId::new(*n)).collect()
}

#[tokio::test]
async fn test_full_crawl_reaches_every_visible_document() {
    let h = Harness::start(corp_share(), ConnectorConfig::with_roots(&["/corp"]));
    let crawled = h.crawl_all().await;
    let got: Vec<DocId> = crawled.keys().cloned().collect();
    assert_eq!(
        got,
        ids(&[
            "/corp",
            "/corp/hr",
            "/corp/hr/salaries.csv",
            "/corp/reports",
            "/corp/reports/q1.txt",
            "/corp/reports/q2.txt",
        ])
    );
    assert_eq!(h.connector.overflow().stats().jobs_submitted, 0);
    h.shutdown().await;
}

#[tokio::test]
async fn test_hidden_subtree_crawled_when_enabled() {
    let mut config = ConnectorConfig::with_roots(&["/corp"]);
    config.crawl_hidden_files = true;
    let h = Harness::start(corp_share(), config);
    let crawled = h.crawl_all().await;
    assert!(crawled.contains_key(&DocId::new("/corp/.snapshots")));
    assert!(crawled.contains_key(&DocId::new("/corp/.snapshots/old.txt")));
    assert_eq!(crawled.len(), 8);
    h.shutdown().await;
}

#[tokio::test]
async fn test_hidden_ancestor_hides_descendants() {
    let h = Harness::start(corp_share(), ConnectorConfig::with_roots(&["/corp"]));
    for id in ["/corp/.snapshots", "/corp/.snapshots/old.txt"] {
        let r = h.fetch(id);
        assert_eq!(r.outcome, Outcome::NotFound, "{}", id);
        assert!(r.acl.is_none());
    }
    h.shutdown().await;
}

#[tokio::test]
async fn test_hidden_root_is_still_crawled() {
    let fs = corp_share();
    fs.set_hidden("/corp", true);
    let h = Harness::start(fs, ConnectorConfig::with_roots(&["/corp"]));
    assert_eq!(h.fetch("/corp").outcome, Outcome::Content);
    assert_eq!(h.fetch("/corp/reports/q1.txt").body_text(), "first quarter");
    h.shutdown().await;
}

#[tokio::test]
async fn test_acl_pointers_across_the_tree() {
    let h = Harness::start(corp_share(), ConnectorConfig::with_roots(&["/corp"]));
    let crawled = h.crawl_all().await;
    let pointer = |id: &str| {
        crawled[&DocId::new(id)]
            .acl
            .as_ref()
            .and_then(|acl| acl.inherit_from.clone())
    };

    assert_eq!(
        pointer("/corp"),
        Some(InheritFrom::new(DocId::new("/corp"), SHARE_ACL))
    );
    assert_eq!(
        pointer("/corp/reports"),
        Some(InheritFrom::new(
            DocId::new("/corp"),
            PropagationClass::ChildFoldersOnly.fragment()
        ))
    );
    assert_eq!(
        pointer("/corp/reports/q2.txt"),
        Some(InheritFrom::new(
            DocId::new("/corp/reports"),
            PropagationClass::ChildFilesOnly.fragment()
        ))
    );
    // Direct entries only: inheritance is broken, so the folder chains to
    // the share.
    assert_eq!(
        pointer("/corp/hr"),
        Some(InheritFrom::new(DocId::new("/corp"), SHARE_ACL))
    );
    assert_eq!(
        pointer("/corp/hr/salaries.csv"),
        Some(InheritFrom::new(
            DocId::new("/corp/hr"),
            PropagationClass::ChildFilesOnly.fragment()
        ))
    );

    let q1 = crawled[&DocId::new("/corp/reports/q1.txt")].acl.clone().unwrap();
    assert_eq!(q1.denies.len(), 1);

    let root = &crawled[&DocId::new("/corp")];
    let mut fragments: Vec<&str> = root.named_resources.keys().map(String::as_str).collect();
    fragments.sort();
    assert_eq!(
        fragments,
        [
            "allFilesAcl",
            "allFoldersAcl",
            "childFilesAcl",
            "childFoldersAcl",
            "shareAcl"
        ]
    );
    for (id, response) in &crawled {
        if id.as_str() != "/corp" {
            assert!(!response.named_resources.contains_key(SHARE_ACL), "{}", id);
        }
    }
    h.shutdown().await;
}

#[tokio::test]
async fn test_files_carry_content_and_metadata() {
    let fs = corp_share();
    fs.add_file("/corp/reports/README", b"read me")
        .set_content_type("/corp/reports/README", "text/x-readme");
    let h = Harness::start(fs, ConnectorConfig::with_roots(&["/corp"]));
    let q1 = h.fetch("/corp/reports/q1.txt");
    assert_eq!(q1.body_text(), "first quarter");
    assert_eq!(q1.content_type.as_deref(), Some("text/plain"));
    assert_eq!(q1.last_modified, Some(base_time()));
    assert!(q1.metadata_value("Last Access Time").is_some());

    let csv = h.fetch("/corp/hr/salaries.csv");
    assert_eq!(csv.content_type.as_deref(), Some("text/csv"));

    let readme = h.fetch("/corp/reports/README");
    assert_eq!(readme.content_type.as_deref(), Some("text/x-readme"));
    h.shutdown().await;
}

#[tokio::test]
async fn test_incremental_recrawl() {
    let fs = corp_share();
    let h = Harness::start(fs.clone(), ConnectorConfig::with_roots(&["/corp"]));
    let mut request = Request::new(DocId::new("/corp/reports/q1.txt"));
    request.last_crawled = Some(base_time() + Duration::hours(1));

    let mut response = RecordingResponse::new();
    h.connector.get_doc_content(&request, &mut response).unwrap();
    assert_eq!(response.outcome, Outcome::NotModified);
    assert!(response.acl.is_some());

    fs.set_times(
        "/corp/reports/q1.txt",
        base_time() + Duration::days(2),
        base_time(),
    );
    let mut response = RecordingResponse::new();
    h.connector.get_doc_content(&request, &mut response).unwrap();
    assert_eq!(response.outcome, Outcome::Content);
    assert_eq!(response.body_text(), "first quarter");

    // Folders are always relisted.
    let mut request = Request::new(DocId::new("/corp/reports"));
    request.last_crawled = Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
    request.can_respond_with_no_content = true;
    let mut response = RecordingResponse::new();
    h.connector.get_doc_content(&request, &mut response).unwrap();
    assert_eq!(response.outcome, Outcome::Content);
    h.shutdown().await;
}

#[tokio::test]
async fn test_modified_date_filter_skips_old_files_only() {
    let fs = corp_share();
    fs.set_times(
        "/corp/reports/q2.txt",
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        base_time(),
    );
    let mut config = ConnectorConfig::with_roots(&["/corp"]);
    config.last_modified_date = Some("2023-06-01".to_string());
    let h = Harness::start(fs, config);
    let crawled = h.crawl_all().await;
    assert!(crawled.contains_key(&DocId::new("/corp/reports")));
    assert!(crawled.contains_key(&DocId::new("/corp/reports/q2.txt")));
    assert!(!crawled.contains_key(&DocId::new("/corp/reports/q1.txt")));
    assert!(!crawled.contains_key(&DocId::new("/corp/hr/salaries.csv")));
    h.shutdown().await;
}

#[tokio::test]
async fn test_vanished_document_is_not_found() {
    let fs = corp_share();
    let h = Harness::start(fs.clone(), ConnectorConfig::with_roots(&["/corp"]));
    fs.remove("/corp/reports/q2.txt");
    assert_eq!(h.fetch("/corp/reports/q2.txt").outcome, Outcome::NotFound);
    h.shutdown().await;
}

#[tokio::test]
async fn test_unreadable_acl_is_an_error() {
    let fs = corp_share();
    let h = Harness::start(fs.clone(), ConnectorConfig::with_roots(&["/corp"]));
    fs.deny_access("/corp/hr", true);
    assert!(h.try_fetch("/corp/hr").is_err());
    h.shutdown().await;
}
