//! Content-type detection for streamed files

use std::path::Path;

use tracing::debug;

use crate::delegate::FileDelegate;

const FALLBACK: &str = "application/octet-stream";

const TABLE: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("log", "text/plain"),
    ("csv", "text/csv"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("xml", "text/xml"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("rtf", "application/rtf"),
    ("doc", "application/msword"),
    ("dot", "application/msword"),
    ("xls", "application/vnd.ms-excel"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("msg", "application/vnd.ms-outlook"),
    ("zip", "application/zip"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
];

/// Type from the extension table, case-insensitively.
pub fn from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, ct)| *ct)
}

/// Extension table first, then a live probe, then octet-stream.
pub fn detect(delegate: &dyn FileDelegate, path: &Path) -> String {
    if let Some(ct) = from_extension(path) {
        return ct.to_string();
    }
    match delegate.probe_content_type(path) {
        Ok(Some(ct)) => ct,
        Ok(None) => FALLBACK.to_string(),
        Err(e) => {
            debug!("content type probe failed for {}: {}", path.display(), e);
            FALLBACK.to_string()
        }
    }
}
