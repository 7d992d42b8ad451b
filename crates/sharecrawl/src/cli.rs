use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::authz::Identity;
use crate::config::ConnectorConfig;
use crate::connector::Connector;
use crate::local::LocalFs;
use crate::response::{DocIdPusher, RecordingResponse, Request};
use crate::status::RootStatus;
use crate::time_filter::SystemClock;
use crate::types::{DocId, Principal};

#[derive(Parser)]
#[command(name = "sharecrawl")]
#[command(about = "Share crawler: folder listings, file content and ACLs for crawl roots", long_about = None)]
pub struct Cli {
    /// TOML or JSON configuration file.
    #[arg(short, long, env = "SHARECRAWL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Crawl roots, overriding `src` from the configuration.
    #[arg(long)]
    pub src: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate every root and print its status.
    Validate,
    /// Print the ids a full crawl starts from.
    Ids,
    /// Fetch one document the way the crawler serves it.
    Fetch {
        id: String,
        /// Treat the document as crawled at this RFC 3339 time.
        #[arg(long)]
        last_crawled: Option<DateTime<Utc>>,
        /// Write the body instead of the response summary.
        #[arg(long)]
        body: bool,
    },
    /// Decide whether a user may read the given documents.
    Authz {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        group: Vec<String>,
        ids: Vec<String>,
    },
}

/// Prints pushed ids, one per line.
#[derive(Default)]
struct StdoutPusher {
    lock: Mutex<()>,
}

impl DocIdPusher for StdoutPusher {
    fn push_doc_ids(&self, ids: &[DocId]) -> crate::error::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = std::io::stdout().lock();
        for id in ids {
            writeln!(out, "{}", id)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusLine {
    root: PathBuf,
    #[serde(flatten)]
    status: RootStatus,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let connector = Connector::init(
            &config,
            Arc::new(LocalFs::new()),
            Arc::new(StdoutPusher::default()),
            Arc::new(SystemClock),
        )
        .context("starting connector")?;

        let result = match &self.command {
            Command::Validate => print_status(&connector),
            Command::Ids => connector.get_doc_ids().map_err(Into::into),
            Command::Fetch {
                id,
                last_crawled,
                body,
            } => fetch(&connector, id, *last_crawled, *body).await,
            Command::Authz { user, group, ids } => authz(&connector, &config, user, group, ids),
        };
        connector.overflow().wait_idle().await;
        connector.shutdown().await;
        result
    }

    fn load_config(&self) -> Result<ConnectorConfig> {
        let mut config = match &self.config {
            Some(path) => ConnectorConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ConnectorConfig::default(),
        };
        if let Some(src) = &self.src {
            config.src = src.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_status(connector: &Connector) -> Result<()> {
    let lines: Vec<StatusLine> = connector
        .status()
        .into_iter()
        .map(|(root, status)| StatusLine { root, status })
        .collect();
    println!("{}", serde_json::to_string_pretty(&lines)?);
    Ok(())
}

async fn fetch(
    connector: &Connector,
    id: &str,
    last_crawled: Option<DateTime<Utc>>,
    body: bool,
) -> Result<()> {
    let mut request = Request::new(DocId::new(id));
    request.last_crawled = last_crawled;
    let crawler = Arc::clone(connector.crawler());
    let response = tokio::task::spawn_blocking(move || -> crate::error::Result<RecordingResponse> {
        let mut response = RecordingResponse::new();
        crawler.get_doc_content(&request, &mut response)?;
        Ok(response)
    })
    .await??;

    if body {
        std::io::stdout().write_all(&response.body)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    Ok(())
}

fn authz(
    connector: &Connector,
    config: &ConnectorConfig,
    user: &str,
    groups: &[String],
    ids: &[String],
) -> Result<()> {
    let identity = Identity::new(
        Principal::user(user, &config.namespace),
        groups
            .iter()
            .map(|g| Principal::group(g, &config.namespace))
            .collect(),
    );
    let ids: Vec<DocId> = ids.iter().map(DocId::new).collect();
    let decisions: BTreeMap<DocId, _> = connector.is_user_authorized(&identity, &ids);
    println!("{}", serde_json::to_string_pretty(&decisions)?);
    Ok(())
}
