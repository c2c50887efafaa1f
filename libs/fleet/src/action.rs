//! Proposed rebalancing actions and the driver notices they produce.

use rebal_id::BusId;
use serde::{Deserialize, Serialize};

use crate::{Bus, Candidate, DistanceBasis, SeekMode};

/// The two ways the advisor can rebalance a pair of buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Move overflow riders from a full bus onto a bus with free seats.
    #[serde(
        rename = "Reallocation",
        alias = "reallocation",
        alias = "Reallocate",
        alias = "reallocate"
    )]
    Reallocate,

    /// Merge two lightly loaded buses into one.
    #[serde(
        rename = "Combination",
        alias = "combination",
        alias = "Combine",
        alias = "combine"
    )]
    Combine,
}

impl ActionKind {
    pub fn for_mode(mode: SeekMode) -> Self {
        match mode {
            SeekMode::EmptySeats => Self::Reallocate,
            SeekMode::Combine => Self::Combine,
        }
    }

    /// Lowercase verb used in admin prompts.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Reallocate => "reallocate",
            Self::Combine => "combine",
        }
    }

    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reallocate => "Reallocation",
            Self::Combine => "Combination",
        }
    }

    /// One-line summary shown to the admin.
    pub fn describe(self, current: &BusId, nearby: &BusId) -> String {
        match self {
            Self::Reallocate => {
                format!("Reallocate students from Bus {current} to Bus {nearby}.")
            }
            Self::Combine => format!("Combine Bus {current} with Bus {nearby}."),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reallocation" | "reallocate" => Ok(Self::Reallocate),
            "combination" | "combine" => Ok(Self::Combine),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// A message for one driver involved in an approved action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverNotice {
    pub bus_id: BusId,
    pub driver: String,
    pub phone: Option<String>,
    pub message: String,
}

impl DriverNotice {
    fn to_driver_of(bus: &Bus, message: String) -> Self {
        Self {
            bus_id: bus.id.clone(),
            driver: bus.driver.clone(),
            phone: bus.phone.clone(),
            message,
        }
    }
}

/// A rebalancing proposal awaiting an admin decision.
///
/// Both bus records are copied in at proposal time so later snapshot reloads
/// cannot change what the admin is approving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub current_bus_id: BusId,
    pub nearby_bus_id: BusId,
    #[serde(rename = "action")]
    pub kind: ActionKind,
    pub message: String,
    pub distance_km: f64,
    pub distance_basis: DistanceBasis,
    pub current_bus_details: Bus,
    pub nearby_bus_details: Bus,
}

impl ProposedAction {
    /// Build a proposal for `origin` paired with the selected candidate.
    pub fn new(
        origin: &Bus,
        candidate: Candidate<'_>,
        mode: SeekMode,
        basis: DistanceBasis,
    ) -> Self {
        let kind = ActionKind::for_mode(mode);
        Self {
            current_bus_id: origin.id.clone(),
            nearby_bus_id: candidate.bus.id.clone(),
            kind,
            message: kind.describe(&origin.id, &candidate.bus.id),
            distance_km: candidate.distance_km,
            distance_basis: basis,
            current_bus_details: origin.clone(),
            nearby_bus_details: candidate.bus.clone(),
        }
    }

    /// Whether this proposal concerns the given ordered bus pair and kind.
    pub fn concerns(&self, current: &BusId, nearby: &BusId, kind: ActionKind) -> bool {
        &self.current_bus_id == current && &self.nearby_bus_id == nearby && self.kind == kind
    }

    /// Notices for both drivers, current bus first.
    pub fn notices(&self) -> [DriverNotice; 2] {
        let current = &self.current_bus_details;
        let nearby = &self.nearby_bus_details;
        match self.kind {
            ActionKind::Reallocate => [
                DriverNotice::to_driver_of(
                    current,
                    format!(
                        "Your bus is full. Students will be allocated to Bus {}.",
                        nearby.id
                    ),
                ),
                DriverNotice::to_driver_of(
                    nearby,
                    format!("Please pick up additional students from Bus {}.", current.id),
                ),
            ],
            ActionKind::Combine => [
                DriverNotice::to_driver_of(current, combine_message(&nearby.id)),
                DriverNotice::to_driver_of(nearby, combine_message(&current.id)),
            ],
        }
    }
}

fn combine_message(other: &BusId) -> String {
    format!(
        "Your bus will be combined with Bus {other}. Please proceed to the designated meeting point."
    )
}
