//! Shared fixtures - in-memory shares, a started connector and a
//! listing-driven crawl loop

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sharecrawl::delegate::{AceEntry, AceFlags, AclView, AclViews};
use sharecrawl::response::{Outcome, RecordingPusher, RecordingResponse};
use sharecrawl::time_filter::FixedClock;
use sharecrawl::types::PrincipalKind;
use sharecrawl::{Connector, ConnectorConfig, DocId, MemFs, Principal, Request, Result};

/// Namespace every fixture principal lives in.
pub const NS: &str = "Default";

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
}

/// Clock reading used by every connector the fixtures start.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

pub fn allow_group(name: &str) -> AceEntry {
    AceEntry::allow(name, PrincipalKind::Group, AceFlags::container_and_object())
}

pub fn deny_user(name: &str) -> AceEntry {
    AceEntry::deny(name, PrincipalKind::User, AceFlags::container_and_object())
}

pub fn direct(entries: Vec<AceEntry>) -> AclViews {
    AclViews {
        direct: AclView::new(entries),
        inherited: AclView::default(),
    }
}

pub fn inherited(entries: Vec<AceEntry>) -> AclViews {
    AclViews {
        direct: AclView::default(),
        inherited: AclView::new(entries),
    }
}

pub fn user(name: &str) -> Principal {
    Principal::user(name, NS)
}

pub fn group(name: &str) -> Principal {
    Principal::group(name, NS)
}

/// A departmental share:
///
/// ```text
/// /corp                 share, Staff direct
///   reports/            inherits Staff
///     q1.txt            inherits Staff, denies CORP\mallory
///     q2.txt            inherits Staff
///   hr/                 Exec direct, breaks inheritance
///     salaries.csv      inherits Exec
///   .snapshots/         hidden
///     old.txt
/// ```
pub fn corp_share() -> Arc<MemFs> {
    let fs = Arc::new(MemFs::new(base_time()));
    fs.add_share("/corp")
        .set_acl_views("/corp", direct(vec![allow_group("CORP\\Staff")]))
        .add_dir("/corp/reports")
        .set_acl_views("/corp/reports", inherited(vec![allow_group("CORP\\Staff")]))
        .add_file("/corp/reports/q1.txt", b"first quarter")
        .set_acl_views(
            "/corp/reports/q1.txt",
            AclViews {
                direct: AclView::new(vec![deny_user("CORP\\mallory")]),
                inherited: AclView::new(vec![allow_group("CORP\\Staff")]),
            },
        )
        .add_file("/corp/reports/q2.txt", b"second quarter")
        .set_acl_views("/corp/reports/q2.txt", inherited(vec![allow_group("CORP\\Staff")]))
        .add_dir("/corp/hr")
        .set_acl_views("/corp/hr", direct(vec![allow_group("CORP\\Exec")]))
        .add_file("/corp/hr/salaries.csv", b"name,amount\n")
        .set_acl_views("/corp/hr/salaries.csv", inherited(vec![allow_group("CORP\\Exec")]))
        .add_dir("/corp/.snapshots")
        .set_hidden("/corp/.snapshots", true)
        .add_file("/corp/.snapshots/old.txt", b"stale");
    fs
}

/// A started connector over an in-memory share.
pub struct Harness {
    pub fs: Arc<MemFs>,
    pub pusher: Arc<RecordingPusher>,
    pub connector: Connector,
}

impl Harness {
    /// Must be called from within a Tokio runtime.
    pub fn start(fs: Arc<MemFs>, config: ConnectorConfig) -> Self {
        Self::try_start(fs, config).expect("connector failed to start")
    }

    pub fn try_start(fs: Arc<MemFs>, config: ConnectorConfig) -> Result<Self> {
        let pusher = Arc::new(RecordingPusher::new());
        let connector = Connector::init(
            &config,
            fs.clone(),
            pusher.clone(),
            Arc::new(FixedClock(now())),
        )?;
        Ok(Self {
            fs,
            pusher,
            connector,
        })
    }

    pub fn try_fetch(&self, id: &str) -> Result<RecordingResponse> {
        let mut response = RecordingResponse::new();
        self.connector
            .get_doc_content(&Request::new(DocId::new(id)), &mut response)?;
        Ok(response)
    }

    pub fn fetch(&self, id: &str) -> RecordingResponse {
        self.try_fetch(id)
            .unwrap_or_else(|e| panic!("fetching {} failed: {}", id, e))
    }

    /// Crawls breadth-first from the root ids, following listing links and
    /// every id pushed out of band. Returns each fetched document's
    /// response; documents answering not-found are omitted.
    pub async fn crawl_all(&self) -> BTreeMap<DocId, RecordingResponse> {
        self.connector.get_doc_ids().expect("root ids");
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        let mut drained = 0;
        let mut results = BTreeMap::new();
        loop {
            self.connector.overflow().wait_idle().await;
            let pushed = self.pusher.pushed();
            for id in &pushed[drained..] {
                if seen.insert(id.clone()) {
                    queue.push_back(id.clone());
                }
            }
            drained = pushed.len();
            let Some(id) = queue.pop_front() else {
                break;
            };
            let response = self.fetch(id.as_str());
            if response.outcome == Outcome::NotFound {
                continue;
            }
            for link in hrefs(&response.body_text()) {
                let link = DocId::new(link);
                if seen.insert(link.clone()) {
                    queue.push_back(link);
                }
            }
            results.insert(id, response);
        }
        results
    }

    pub async fn shutdown(self) {
        self.connector.shutdown().await;
    }
}

/// Anchor targets of a listing page, in document order.
pub fn hrefs(html: &str) -> Vec<String> {
    html.split("<a href=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .map(str::to_string)
        .collect()
}
