//! Random sample fleets around Chennai.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rebal_fleet::{Bus, BusId, GeoPoint};

use super::CommandContext;
use crate::output::{print_json, print_success, OutputFormat};

const CAPACITY: std::ops::RangeInclusive<u32> = 30..=50;
const LATITUDE: std::ops::Range<f64> = 13.0..13.2;
const LONGITUDE: std::ops::Range<f64> = 80.1..80.3;

#[derive(Debug, Args)]
pub struct GenerateCommand {
    /// Number of buses.
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u32).range(1..))]
    count: u32,

    /// Seed for a reproducible fleet.
    #[arg(long)]
    seed: Option<u64>,

    /// Destination file; `-` prints to stdout.
    #[arg(long, short, default_value = "buses.json")]
    output: PathBuf,
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Buses `1..=count` with random loads and positions.
pub fn generate_fleet(count: u32, rng: &mut impl Rng) -> Vec<Bus> {
    (1..=count)
        .map(|i| {
            let seating_capacity = rng.random_range(CAPACITY);
            let current_attendance = rng.random_range(0..=seating_capacity);
            let latitude = round6(rng.random_range(LATITUDE));
            let longitude = round6(rng.random_range(LONGITUDE));
            Bus {
                id: BusId::from(i),
                driver: format!("Driver {i}"),
                phone: None,
                seating_capacity,
                current_attendance,
                position: GeoPoint::new(latitude, longitude),
            }
        })
        .collect()
}

impl GenerateCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let fleet = generate_fleet(self.count, &mut rng);

        if self.output.as_os_str() == "-" {
            print_json(&fleet);
            return Ok(());
        }

        let json = serde_json::to_string_pretty(&fleet)?;
        std::fs::write(&self.output, json)
            .with_context(|| format!("failed to write {}", self.output.display()))?;

        if ctx.format == OutputFormat::Json {
            print_json(&serde_json::json!({
                "path": self.output,
                "buses": fleet.len(),
            }));
        } else {
            print_success(&format!(
                "Wrote {} buses to {}",
                fleet.len(),
                self.output.display()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebal_fleet::FleetSnapshot;

    #[test]
    fn test_generated_fleet_is_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        let fleet = generate_fleet(200, &mut rng);

        assert_eq!(fleet.len(), 200);
        for (i, bus) in fleet.iter().enumerate() {
            assert_eq!(bus.id, BusId::from(i as u32 + 1));
            assert_eq!(bus.driver, format!("Driver {}", i + 1));
            assert!(CAPACITY.contains(&bus.seating_capacity));
            assert!(bus.current_attendance <= bus.seating_capacity);
            assert!((13.0..=13.2).contains(&bus.position.latitude));
            assert!((80.1..=80.3).contains(&bus.position.longitude));
            assert_eq!(round6(bus.position.latitude), bus.position.latitude);
        }
        assert!(FleetSnapshot::new(fleet).is_ok());
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = generate_fleet(10, &mut StdRng::seed_from_u64(42));
        let b = generate_fleet(10, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("buses.json");
        GenerateCommand {
            count: 5,
            seed: Some(1),
            output: output.clone(),
        }
        .run(CommandContext {
            api_url: String::new(),
            format: OutputFormat::Json,
        })
        .unwrap();

        let contents = std::fs::read_to_string(output).unwrap();
        let buses: Vec<Bus> = serde_json::from_str(&contents).unwrap();
        assert_eq!(buses.len(), 5);
        assert!(!contents.contains("phone"));
    }
}
