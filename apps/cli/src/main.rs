//! CloneForge CLI: resumable page-cloning pipeline.
//!
//! Turns a page snapshot and its markup into a scaffolded replica through
//! five persisted phases: analyze, extract, plan, implement, verify.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
