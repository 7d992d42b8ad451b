//! Early-binding authorization through a started connector

use sharecrawl::delegate::AclView;
use sharecrawl::{AuthzStatus, ConnectorConfig, DocId, Identity};

use crate::fixtures::{allow_group, corp_share, group, user, Harness};

fn staff(name: &str) -> Identity {
    Identity::new(user(name), vec![group("Everyone"), group("CORP\\Staff")])
}

fn check(h: &Harness, who: &Identity, id: &str) -> AuthzStatus {
    let id = DocId::new(id);
    h.connector.is_user_authorized(who, &[id.clone()])[&id]
}

#[tokio::test]
async fn test_decisions_follow_the_inherited_acls() {
    let h = Harness::start(corp_share(), ConnectorConfig::with_roots(&["/corp"]));
    let alice = staff("CORP\\alice");
    let mallory = staff("CORP\\mallory");
    let exec = Identity::new(user("CORP\\erin"), vec![group("Everyone"), group("CORP\\Exec")]);
    let guest = Identity::new(user("CORP\\guest"), vec![group("Everyone")]);

    assert_eq!(check(&h, &alice, "/corp/reports/q1.txt"), AuthzStatus::Permit);
    assert_eq!(check(&h, &alice, "/corp/reports/q2.txt"), AuthzStatus::Permit);
    assert_eq!(check(&h, &mallory, "/corp/reports/q1.txt"), AuthzStatus::Deny);
    assert_eq!(check(&h, &mallory, "/corp/reports/q2.txt"), AuthzStatus::Permit);
    assert_eq!(check(&h, &guest, "/corp/reports/q2.txt"), AuthzStatus::Deny);
    assert_eq!(check(&h, &alice, "/corp/hr/salaries.csv"), AuthzStatus::Deny);
    assert_eq!(check(&h, &exec, "/corp/hr/salaries.csv"), AuthzStatus::Permit);
    h.shutdown().await;
}

#[tokio::test]
async fn test_group_names_match_case_insensitively() {
    let h = Harness::start(corp_share(), ConnectorConfig::with_roots(&["/corp"]));
    let shouty = Identity::new(
        user("corp\\ALICE"),
        vec![group("EVERYONE"), group("corp\\staff")],
    );
    assert_eq!(check(&h, &shouty, "/corp/reports/q2.txt"), AuthzStatus::Permit);
    h.shutdown().await;
}

#[tokio::test]
async fn test_share_gate_and_skip() {
    let fs = corp_share();
    fs.set_share_acl("/corp", AclView::new(vec![allow_group("CORP\\Exec")]));
    let gated = Harness::start(fs.clone(), ConnectorConfig::with_roots(&["/corp"]));
    let alice = staff("CORP\\alice");
    assert_eq!(check(&gated, &alice, "/corp/reports/q2.txt"), AuthzStatus::Deny);
    gated.shutdown().await;

    let mut config = ConnectorConfig::with_roots(&["/corp"]);
    config.skip_share_access_control = true;
    let open = Harness::start(fs, config);
    assert_eq!(check(&open, &alice, "/corp/reports/q2.txt"), AuthzStatus::Permit);
    open.shutdown().await;
}

#[tokio::test]
async fn test_batch_answers_every_id() {
    let h = Harness::start(corp_share(), ConnectorConfig::with_roots(&["/corp"]));
    let ids: Vec<DocId> = [
        "/corp/reports/q1.txt",
        "/corp/reports/gone.txt",
        "/elsewhere/file.txt",
        "",
    ]
    .iter()
    .map(|s| DocId::new(*s))
    .collect();
    let decisions = h.connector.is_user_authorized(&staff("CORP\\alice"), &ids);
    assert_eq!(decisions.len(), 4);
    assert_eq!(decisions[&ids[0]], AuthzStatus::Permit);
    for id in &ids[1..] {
        assert_eq!(decisions[id], AuthzStatus::Indeterminate, "{}", id);
    }
    h.shutdown().await;
}

#[tokio::test]
async fn test_authorization_leaves_status_alone() {
    let fs = corp_share();
    let h = Harness::start(fs.clone(), ConnectorConfig::with_roots(&["/corp"]));
    let before = h.connector.status();
    fs.deny_access("/corp/reports/q2.txt", true);
    assert_eq!(
        check(&h, &staff("CORP\\alice"), "/corp/reports/q2.txt"),
        AuthzStatus::Indeterminate
    );
    assert_eq!(h.connector.status(), before);
    h.shutdown().await;
}
