//! Fleet rebalancing primitives.
//!
//! This library holds the pure decision logic of the advisor. Given a
//! snapshot of the fleet it answers two questions:
//!
//! - **Which buses need attention?** A bus at or over capacity is `Full`, a bus
//!   below half capacity is `Underfilled` (see [`classify`]).
//! - **Which bus should take over?** For a full bus, the nearest bus with free
//!   seats; for an underfilled bus, the nearest bus it can be combined with
//!   (see [`select_candidate`]).
//!
//! Nothing in here performs I/O. Distances are supplied by the caller, either
//! from an external distance service or from [`estimate_km`].
//!
//! # Invariants
//!
//! - Decisions are deterministic given the same snapshot and distances
//! - The origin bus is never its own candidate
//! - Ties resolve to the candidate that appears first in snapshot order
//! - Proposed actions own copies of both bus records

mod action;
mod bus;
mod distance;
mod occupancy;
mod selector;

pub use action::{ActionKind, DriverNotice, ProposedAction};
pub use bus::{Bus, FleetError, FleetSnapshot, GeoPoint};
pub use distance::{estimate_km, DistanceBasis, KM_PER_DEGREE};
pub use occupancy::{classify, Occupancy, SeekMode};
pub use selector::{is_eligible, select_candidate, Candidate};

pub use rebal_id::BusId;
