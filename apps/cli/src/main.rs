mod cli;
mod command;
mod config;
mod jobs;
mod prompt;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::Cli::parse().run().await
}
