//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("API error: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::Api { status: 404, code, .. } if code == "no_pending_action" => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `rebalctl pending` to see actions awaiting a decision.".yellow()
                );
            }
            CliError::Api { status: 409, .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: This action has already been decided or timed out.".yellow()
                );
            }
            CliError::Api { status: 503, .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: The advisor has not loaded a fleet yet. Try `rebalctl pass`.".yellow()
                );
            }
            CliError::Network(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check that the advisor is running and --api-url is correct.".yellow()
                );
            }
            _ => {}
        }
    }
}
