//! CLI commands.

mod actions;
mod buses;
mod generate;
mod pass;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// rebalctl - inspect and steer the bus rebalancing advisor.
#[derive(Debug, Parser)]
#[command(name = "rebalctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Advisor base URL.
    #[arg(
        long,
        global = true,
        env = "REBAL_API_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the buses in the advisor's current snapshot.
    Buses(buses::BusesCommand),

    /// List actions awaiting a decision (or in another state with --status).
    Pending(actions::PendingCommand),

    /// Approve an action by id or by bus pair.
    Approve(actions::DecisionArgs),

    /// Deny an action by id or by bus pair.
    Deny(actions::DecisionArgs),

    /// Walk through every pending action and answer yes or no.
    Review(actions::ReviewCommand),

    /// Reload the fleet and run a rebalancing pass.
    Pass(pass::PassCommand),

    /// Write a random sample fleet file.
    Generate(generate::GenerateCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let ctx = CommandContext {
            api_url: self.api_url,
            format: self.format,
        };

        match self.command {
            Commands::Buses(cmd) => cmd.run(ctx).await,
            Commands::Pending(cmd) => cmd.run(ctx).await,
            Commands::Approve(args) => actions::decide(ctx, args, true).await,
            Commands::Deny(args) => actions::decide(ctx, args, false).await,
            Commands::Review(cmd) => cmd.run(ctx).await,
            Commands::Pass(cmd) => cmd.run(ctx).await,
            Commands::Generate(cmd) => cmd.run(ctx),
            Commands::Version => {
                println!("rebalctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub api_url: String,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.api_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_pair_decision() {
        let cli = Cli::try_parse_from([
            "rebalctl",
            "approve",
            "--current",
            "1",
            "--nearby",
            "2",
            "--action",
            "reallocation",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Approve(_)));
    }

    #[test]
    fn test_pair_decision_needs_all_parts() {
        assert!(Cli::try_parse_from(["rebalctl", "deny", "--current", "1"]).is_err());
        assert!(Cli::try_parse_from(["rebalctl", "deny"]).is_err());
    }
}
