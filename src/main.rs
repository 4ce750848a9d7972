mod auth;
mod cli;
mod config;
mod error;
mod identity;
mod janitor;
mod output;
mod poller;
mod providers;
mod report;
mod scenario;
mod telemetry;
#[cfg(test)]
mod testing;
mod transform;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting kfp-lifecycle");
    cli.execute().await?;

    Ok(())
}
