//! minisyslog: print syslog messages as they arrive.

use anyhow::Result;
use minisyslog::{Args, Runner};
use minisyslog_common::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;

    init_tracing(&config.logging)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting minisyslog");

    let runner = Runner::new(&config).await?;
    runner.run().await
}
