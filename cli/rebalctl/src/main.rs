//! rebalctl - CLI for the bus rebalancing advisor
//!
//! Inspects the fleet, reviews and decides pending actions, triggers passes,
//! and generates sample fleet files.

use anyhow::Result;
use clap::Parser;

mod client;
mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
