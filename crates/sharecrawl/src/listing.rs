//! Bounded HTML folder listings and link helpers

use std::io::Write;
use std::path::Path;

use crate::delegate::{self, FileDelegate, ListingSource};
use crate::error::Result;
use crate::types::DocId;

pub const LISTING_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// What a listing wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingOutcome {
    /// Anchors written.
    pub written: usize,
    /// More entries existed than the threshold allowed; enumeration stopped
    /// at the first one that did not fit.
    pub truncated: bool,
}

/// Streams a minimal HTML page straight into the response body.
pub struct HtmlListing<'w> {
    out: &'w mut dyn Write,
}

impl<'w> HtmlListing<'w> {
    pub fn start(out: &'w mut dyn Write, title: &str) -> Result<Self> {
        let title = escape(title);
        write!(
            out,
            "<!DOCTYPE html>\n<html><head><title>Folder {}</title></head>\n<body><h1>Folder {}</h1>\n<ul>\n",
            title, title
        )?;
        Ok(Self { out })
    }

    pub fn link(&mut self, href: &str, text: &str) -> Result<()> {
        writeln!(
            self.out,
            "<li><a href=\"{}\">{}</a></li>",
            escape(href),
            escape(text)
        )?;
        Ok(())
    }

    pub fn note(&mut self, text: &str) -> Result<()> {
        write!(self.out, "</ul>\n<p>{}</p>\n<ul>\n", escape(text))?;
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        self.out.write_all(b"</ul>\n</body></html>\n")?;
        Ok(())
    }
}

/// Writes up to `max_links` anchors for the entries of `dir`.
///
/// Reading entry `max_links + 1` appends a truncation notice and abandons
/// the stream; the caller hands the folder to the overflow pool.
pub fn write_listing(
    out: &mut dyn Write,
    delegate: &dyn FileDelegate,
    dir: &Path,
    source: ListingSource,
    max_links: usize,
) -> Result<ListingOutcome> {
    let stream = delegate::list(delegate, dir, source)?;
    let mut html = HtmlListing::start(out, &display_name(dir))?;
    let mut written = 0;
    let mut truncated = false;
    for entry in stream {
        let child = entry?;
        if written == max_links {
            truncated = true;
            break;
        }
        let id = delegate.new_doc_id(&child)?;
        html.link(&href(&id), &display_name(&child))?;
        written += 1;
    }
    if truncated {
        html.note(&format!(
            "Only the first {} entries are listed. The remaining entries are sent to the crawl queue separately.",
            max_links
        ))?;
    }
    html.finish()?;
    Ok(ListingOutcome { written, truncated })
}

/// Last path component, or the whole path for roots.
pub fn display_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}

/// Percent-encoded id, keeping `/` separators readable.
pub fn href(id: &DocId) -> String {
    encode_segments(id.as_str())
}

/// `file://` link to the node itself, used as the search-result URL.
pub fn display_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.starts_with("//") {
        format!("file:{}", encode_segments(&s))
    } else if s.starts_with('/') {
        format!("file://{}", encode_segments(&s))
    } else {
        format!("file:///{}", encode_segments(&s))
    }
}

fn encode_segments(s: &str) -> String {
    s.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    result
}
