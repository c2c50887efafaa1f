//! Trigger a rebalancing pass.

use anyhow::Result;
use clap::Args;
use rebal_fleet::BusId;
use serde::{Deserialize, Serialize};

use super::actions::ActionResponse;
use super::CommandContext;
use crate::output::{print_info, print_json, print_success, OutputFormat};

#[derive(Debug, Args)]
pub struct PassCommand {}

#[derive(Debug, Serialize, Deserialize)]
struct PassReport {
    pass_id: String,
    fleet_size: usize,
    full: usize,
    underfilled: usize,
    normal: usize,
    proposals: Vec<ActionResponse>,
    already_pending: Vec<String>,
    no_candidate: Vec<BusId>,
    estimated_lookups: usize,
}

impl PassCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let client = ctx.client()?;
        let report: PassReport = client.post("/api/passes", &serde_json::json!({})).await?;

        if ctx.format == OutputFormat::Json {
            print_json(&report);
            return Ok(());
        }

        print_success(&format!(
            "Pass {} over {} buses: {} full, {} underfilled, {} normal",
            report.pass_id, report.fleet_size, report.full, report.underfilled, report.normal
        ));
        for action in &report.proposals {
            println!("  {} {}", action.action_id, action.message);
        }
        if !report.already_pending.is_empty() {
            print_info(&format!(
                "{} matches are still awaiting a decision from an earlier pass",
                report.already_pending.len()
            ));
        }
        if !report.no_candidate.is_empty() {
            let ids: Vec<String> = report.no_candidate.iter().map(BusId::to_string).collect();
            print_info(&format!("No suitable partner for buses {}", ids.join(", ")));
        }
        if report.estimated_lookups > 0 {
            print_info(&format!(
                "{} distance lookups used the estimator",
                report.estimated_lookups
            ));
        }
        Ok(())
    }
}
