//! Bus records and fleet snapshots.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rebal_id::BusId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for bus records and snapshots.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FleetError {
    #[error("bus {0}: seating capacity must be positive")]
    ZeroCapacity(BusId),

    #[error("bus {id}: {field} {value} is out of range")]
    CoordinateOutOfRange {
        id: BusId,
        field: &'static str,
        value: f64,
    },

    #[error("bus {0}: driver name is empty")]
    MissingDriver(BusId),

    #[error("duplicate bus id {0}")]
    DuplicateId(BusId),

    #[error("fleet snapshot is empty")]
    Empty,
}

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Render as `lat,lng`, the form distance services expect.
    pub fn to_query(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

/// One bus as read from the fleet source.
///
/// Field names on the wire follow the fleet files (`seatingCapacity`,
/// `currentAttendance`), with the position flattened into `latitude` and
/// `longitude`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    pub id: BusId,
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub seating_capacity: u32,
    pub current_attendance: u32,
    #[serde(flatten)]
    pub position: GeoPoint,
}

impl Bus {
    /// Seats still free. Negative when the bus is over capacity.
    pub fn available_seats(&self) -> i64 {
        i64::from(self.seating_capacity) - i64::from(self.current_attendance)
    }

    /// Check the invariants a loader must enforce before a bus enters a snapshot.
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.seating_capacity == 0 {
            return Err(FleetError::ZeroCapacity(self.id.clone()));
        }
        if self.driver.trim().is_empty() {
            return Err(FleetError::MissingDriver(self.id.clone()));
        }
        let GeoPoint {
            latitude,
            longitude,
        } = self.position;
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(FleetError::CoordinateOutOfRange {
                id: self.id.clone(),
                field: "latitude",
                value: latitude,
            });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(FleetError::CoordinateOutOfRange {
                id: self.id.clone(),
                field: "longitude",
                value: longitude,
            });
        }
        Ok(())
    }
}

/// An ordered, validated, read-only view of the fleet at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    buses: Vec<Bus>,
    loaded_at: DateTime<Utc>,
}

impl FleetSnapshot {
    /// Build a snapshot, rejecting invalid buses, duplicate ids, and empty fleets.
    pub fn new(buses: Vec<Bus>) -> Result<Self, FleetError> {
        if buses.is_empty() {
            return Err(FleetError::Empty);
        }

        let mut seen = HashSet::with_capacity(buses.len());
        for bus in &buses {
            bus.validate()?;
            if !seen.insert(&bus.id) {
                return Err(FleetError::DuplicateId(bus.id.clone()));
            }
        }

        Ok(Self {
            buses,
            loaded_at: Utc::now(),
        })
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn get(&self, id: &BusId) -> Option<&Bus> {
        self.buses.iter().find(|b| &b.id == id)
    }

    /// Every bus except `origin`, in snapshot order.
    pub fn others<'a>(&'a self, origin: &'a BusId) -> impl Iterator<Item = &'a Bus> + 'a {
        self.buses.iter().filter(move |b| &b.id != origin)
    }
}
