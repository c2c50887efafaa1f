//! Capacity classification.

use serde::{Deserialize, Serialize};

use crate::Bus;

/// How full a bus is relative to its seating capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    /// Attendance at or above seating capacity.
    Full,

    /// Attendance below half of seating capacity.
    Underfilled,

    /// Anything in between.
    Normal,
}

/// What the candidate search looks for on behalf of a classified bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekMode {
    /// Find a bus with free seats to take the overflow.
    EmptySeats,

    /// Find a bus whose riders fit together with ours.
    Combine,
}

impl Occupancy {
    /// The search a bus of this class triggers, if any.
    pub fn seek_mode(self) -> Option<SeekMode> {
        match self {
            Self::Full => Some(SeekMode::EmptySeats),
            Self::Underfilled => Some(SeekMode::Combine),
            Self::Normal => None,
        }
    }
}

/// Classify a bus by its occupancy ratio.
///
/// The half-capacity threshold is evaluated as `2 * attendance < capacity` so
/// odd capacities need no floating point.
pub fn classify(bus: &Bus) -> Occupancy {
    let attendance = u64::from(bus.current_attendance);
    let capacity = u64::from(bus.seating_capacity);

    if attendance >= capacity {
        Occupancy::Full
    } else if 2 * attendance < capacity {
        Occupancy::Underfilled
    } else {
        Occupancy::Normal
    }
}
