//! GalleyScout CLI — find well-reviewed upcoming books.
//!
//! Scans a paginated galley catalog in a real browser, looks each title up
//! on a review site, and exports the ones that clear the rating bar.

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
