//! Request/response surface between the crawler and its host.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acl::Acl;
use crate::error::Result;
use crate::types::DocId;

/// One crawl request for a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub doc_id: DocId,
    /// When the indexer last fetched this document, if ever.
    pub last_crawled: Option<DateTime<Utc>>,
    /// The indexer only needs permissions and metadata this time.
    pub can_respond_with_no_content: bool,
}

impl Request {
    pub fn new(doc_id: DocId) -> Self {
        Self {
            doc_id,
            last_crawled: None,
            can_respond_with_no_content: false,
        }
    }

    pub fn has_changed_since_last_crawl(&self, modified: DateTime<Utc>) -> bool {
        match self.last_crawled {
            Some(last) => modified > last,
            None => true,
        }
    }
}

/// Outgoing response for one request.
pub trait Response {
    /// Attaches an Acl under a fragment name for descendants to reference.
    fn put_named_resource(&mut self, fragment: &str, acl: Acl);
    /// Sets the document's primary Acl.
    fn set_acl(&mut self, acl: Acl);
    fn set_no_index(&mut self, no_index: bool);
    fn set_content_type(&mut self, content_type: &str);
    fn set_last_modified(&mut self, modified: DateTime<Utc>);
    fn set_display_url(&mut self, url: Option<String>);
    fn add_metadata(&mut self, key: &str, value: &str);
    fn respond_not_found(&mut self);
    fn respond_not_modified(&mut self);
    fn respond_no_content(&mut self);
    /// Body sink; content is streamed here.
    fn output(&mut self) -> &mut dyn Write;
}

/// Feed of document ids into the crawl queue.
pub trait DocIdPusher: Send + Sync {
    fn push_doc_ids(&self, ids: &[DocId]) -> Result<()>;
}

/// Terminal outcome recorded by [`RecordingResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Outcome {
    #[default]
    Content,
    NotFound,
    NotModified,
    NoContent,
}

/// In-memory [`Response`] that keeps everything it is told.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingResponse {
    pub outcome: Outcome,
    pub acl: Option<Acl>,
    pub named_resources: BTreeMap<String, Acl>,
    pub no_index: bool,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub display_url: Option<String>,
    pub metadata: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl RecordingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl Response for RecordingResponse {
    fn put_named_resource(&mut self, fragment: &str, acl: Acl) {
        self.named_resources.insert(fragment.to_string(), acl);
    }

    fn set_acl(&mut self, acl: Acl) {
        self.acl = Some(acl);
    }

    fn set_no_index(&mut self, no_index: bool) {
        self.no_index = no_index;
    }

    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_string());
    }

    fn set_last_modified(&mut self, modified: DateTime<Utc>) {
        self.last_modified = Some(modified);
    }

    fn set_display_url(&mut self, url: Option<String>) {
        self.display_url = url;
    }

    fn add_metadata(&mut self, key: &str, value: &str) {
        self.metadata.push((key.to_string(), value.to_string()));
    }

    fn respond_not_found(&mut self) {
        self.outcome = Outcome::NotFound;
    }

    fn respond_not_modified(&mut self) {
        self.outcome = Outcome::NotModified;
    }

    fn respond_no_content(&mut self) {
        self.outcome = Outcome::NoContent;
    }

    fn output(&mut self) -> &mut dyn Write {
        &mut self.body
    }
}

/// [`DocIdPusher`] that records every batch it receives.
#[derive(Debug, Default)]
pub struct RecordingPusher {
    batches: Mutex<Vec<Vec<DocId>>>,
}

impl RecordingPusher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<DocId>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every pushed id, in push order.
    pub fn pushed(&self) -> Vec<DocId> {
        self.batches().into_iter().flatten().collect()
    }
}

impl DocIdPusher for RecordingPusher {
    fn push_doc_ids(&self, ids: &[DocId]) -> Result<()> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ids.to_vec());
        Ok(())
    }
}
