//! AssetGuard CLI: reactive and proactive maintenance pipelines.
//!
//! Turns an inspection photo or a weather forecast into CMMS work orders.

mod commands;
mod services;

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
