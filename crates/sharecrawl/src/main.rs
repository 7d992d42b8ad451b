#![warn(missing_docs)]

//! Share crawler command line

use anyhow::Result;
use clap::Parser;
use sharecrawl::cli::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    tracing::info!("sharecrawl starting...");

    Cli::parse().run().await
}
