//! Meeplesync CLI — bulk board-game record enrichment.
//!
//! Reads a ranks CSV dump, enriches each game through the XML API, and
//! writes merged game and expansion-edge tables.

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
