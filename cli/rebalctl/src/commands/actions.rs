//! Pending action listing and admin decisions.

use anyhow::Result;
use clap::{ArgGroup, Args};
use rebal_fleet::{ActionKind, BusId};
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::output::{print_denied, print_info, print_json, print_output, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PendingCommand {
    /// Show actions in this state instead (pending, approved, denied, timed_out).
    #[arg(long)]
    status: Option<String>,

    /// Show actions in every state.
    #[arg(long, conflicts_with = "status")]
    all: bool,
}

/// Target an action either by id or by the bus pair it concerns.
#[derive(Debug, Args)]
#[command(group(ArgGroup::new("target").required(true).args(["action_id", "current"])))]
pub struct DecisionArgs {
    /// Action id (act_...).
    action_id: Option<String>,

    /// Id of the bus that triggered the action.
    #[arg(long, requires_all = ["nearby", "kind"])]
    current: Option<BusId>,

    /// Id of the partner bus.
    #[arg(long, requires = "current")]
    nearby: Option<BusId>,

    /// Action kind (reallocation or combination).
    #[arg(long = "action", requires = "current")]
    kind: Option<ActionKind>,
}

#[derive(Debug, Args)]
pub struct ReviewCommand {}

/// Action record as returned by the advisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ActionResponse {
    pub action_id: String,
    pub action: ActionKind,
    pub current_bus_id: BusId,
    pub nearby_bus_id: BusId,
    pub message: String,
    pub distance_km: f64,
    pub distance_basis: String,
    pub status: String,
    pub expires_at: String,
}

#[derive(Debug, Tabled)]
struct ActionRow {
    #[tabled(rename = "Action ID")]
    action_id: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Nearby")]
    nearby: String,
    #[tabled(rename = "Distance (km)")]
    distance: String,
    #[tabled(rename = "Basis")]
    basis: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Expires")]
    expires_at: String,
}

impl From<&ActionResponse> for ActionRow {
    fn from(a: &ActionResponse) -> Self {
        Self {
            action_id: a.action_id.clone(),
            action: a.action.to_string(),
            current: a.current_bus_id.to_string(),
            nearby: a.nearby_bus_id.to_string(),
            distance: format!("{:.2}", a.distance_km),
            basis: a.distance_basis.clone(),
            status: a.status.clone(),
            expires_at: a.expires_at.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AdminActionRequest<'a> {
    current_bus_id: &'a BusId,
    nearby_bus_id: &'a BusId,
    action: ActionKind,
    approved: bool,
}

#[derive(Debug, Serialize)]
struct DecisionRequest {
    approved: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct DecisionResponse {
    success: bool,
    message: String,
    action_id: String,
    status: String,
}

impl PendingCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let client = ctx.client()?;
        let path = match (self.all, self.status.as_deref()) {
            (true, _) => "/api/actions".to_string(),
            (false, Some(status)) => format!("/api/actions?status={status}"),
            (false, None) => "/api/pending-actions".to_string(),
        };

        let actions: Vec<ActionResponse> = client.get(&path).await?;
        let rows: Vec<ActionRow> = actions.iter().map(ActionRow::from).collect();
        print_output(&rows, &actions, ctx.format);
        Ok(())
    }
}

/// Send one decision and report the outcome.
pub async fn decide(ctx: CommandContext, args: DecisionArgs, approved: bool) -> Result<()> {
    let client = ctx.client()?;

    let response: DecisionResponse = match (&args.action_id, &args.current, &args.nearby, args.kind) {
        (Some(id), _, _, _) => {
            client
                .post(
                    &format!("/api/actions/{id}/decision"),
                    &DecisionRequest { approved },
                )
                .await?
        }
        (None, Some(current), Some(nearby), Some(kind)) => {
            client
                .post(
                    "/api/admin-action",
                    &AdminActionRequest {
                        current_bus_id: current,
                        nearby_bus_id: nearby,
                        action: kind,
                        approved,
                    },
                )
                .await?
        }
        _ => anyhow::bail!("give an action id or --current, --nearby and --action"),
    };

    report_decision(&response, ctx.format);
    Ok(())
}

fn report_decision(response: &DecisionResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(response),
        OutputFormat::Table if response.success => {
            print_success(&format!("{} ({})", response.message, response.action_id))
        }
        OutputFormat::Table => {
            print_denied(&format!("{} ({})", response.message, response.action_id))
        }
    }
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

impl ReviewCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let client = ctx.client()?;
        let pending: Vec<ActionResponse> = client.get("/api/pending-actions").await?;
        if pending.is_empty() {
            print_info("No actions awaiting a decision.");
            return Ok(());
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        for action in &pending {
            stdout
                .write_all(
                    format!(
                        "{}\n  distance: {:.2} km ({})\nDoes the admin approve the {} action? (yes/no): ",
                        action.message,
                        action.distance_km,
                        action.distance_basis,
                        action.action.verb()
                    )
                    .as_bytes(),
                )
                .await?;
            stdout.flush().await?;

            let Some(answer) = lines.next_line().await? else {
                println!();
                print_info("Input closed; remaining actions left pending.");
                break;
            };

            let response: DecisionResponse = client
                .post(
                    &format!("/api/actions/{}/decision", action.action_id),
                    &DecisionRequest {
                        approved: is_yes(&answer),
                    },
                )
                .await?;
            report_decision(&response, ctx.format);
        }
        Ok(())
    }
}
