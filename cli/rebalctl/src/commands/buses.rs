//! Fleet snapshot listing.

use anyhow::Result;
use clap::Args;
use rebal_fleet::{classify, Bus, Occupancy};
use tabled::Tabled;

use crate::output::{display_option, print_output};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct BusesCommand {
    /// Only show buses that are full or underfilled.
    #[arg(long)]
    attention: bool,
}

#[derive(Debug, Tabled)]
struct BusRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Driver")]
    driver: String,
    #[tabled(rename = "Phone", display = "display_option")]
    phone: Option<String>,
    #[tabled(rename = "Riders")]
    riders: String,
    #[tabled(rename = "Occupancy")]
    occupancy: String,
    #[tabled(rename = "Location")]
    location: String,
}

fn occupancy_label(occupancy: Occupancy) -> &'static str {
    match occupancy {
        Occupancy::Full => "full",
        Occupancy::Underfilled => "underfilled",
        Occupancy::Normal => "normal",
    }
}

impl From<&Bus> for BusRow {
    fn from(bus: &Bus) -> Self {
        Self {
            id: bus.id.to_string(),
            driver: bus.driver.clone(),
            phone: bus.phone.clone(),
            riders: format!("{}/{}", bus.current_attendance, bus.seating_capacity),
            occupancy: occupancy_label(classify(bus)).to_string(),
            location: format!(
                "{:.4}, {:.4}",
                bus.position.latitude, bus.position.longitude
            ),
        }
    }
}

impl BusesCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let client = ctx.client()?;
        let mut buses: Vec<Bus> = client.get("/api/bus-details").await?;
        if self.attention {
            buses.retain(|b| classify(b) != Occupancy::Normal);
        }

        let rows: Vec<BusRow> = buses.iter().map(BusRow::from).collect();
        print_output(&rows, &buses, ctx.format);
        Ok(())
    }
}
