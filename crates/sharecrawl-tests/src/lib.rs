//! Sharecrawl end-to-end suites
//!
//! Every suite drives a started [`sharecrawl::Connector`] over the in-memory
//! share model, the way an indexer would: root ids, listings, overflow
//! pushes, authorization batches and status reads.

pub mod fixtures;

#[cfg(test)]
mod authz_e2e;
#[cfg(test)]
mod crawl_e2e;
#[cfg(test)]
mod dfs_e2e;
#[cfg(test)]
mod overflow_e2e;
#[cfg(test)]
mod status_e2e;

pub use fixtures::{corp_share, Harness};
