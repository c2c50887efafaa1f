//! Nearest compatible bus selection.

use crate::{Bus, SeekMode};

/// The bus chosen to pair with an origin bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<'a> {
    pub bus: &'a Bus,
    pub distance_km: f64,
}

/// Whether `candidate` can absorb the situation of `origin`.
///
/// - `EmptySeats`: the candidate has at least one free seat.
/// - `Combine`: both loads together fit in the larger of the two buses.
pub fn is_eligible(origin: &Bus, candidate: &Bus, mode: SeekMode) -> bool {
    if candidate.id == origin.id {
        return false;
    }
    match mode {
        SeekMode::EmptySeats => candidate.available_seats() > 0,
        SeekMode::Combine => {
            let combined =
                u64::from(origin.current_attendance) + u64::from(candidate.current_attendance);
            let largest = origin.seating_capacity.max(candidate.seating_capacity);
            combined <= u64::from(largest)
        }
    }
}

/// Pick the nearest eligible candidate.
///
/// `candidates` and `distances_km` are walked in lockstep, so the i-th distance
/// must belong to the i-th candidate. Strict comparison keeps the earliest
/// candidate on ties. Non-finite distances never win.
pub fn select_candidate<'a, I>(
    origin: &Bus,
    candidates: I,
    distances_km: &[f64],
    mode: SeekMode,
) -> Option<Candidate<'a>>
where
    I: IntoIterator<Item = &'a Bus>,
{
    let mut best: Option<Candidate<'a>> = None;

    for (bus, &distance_km) in candidates.into_iter().zip(distances_km) {
        if !distance_km.is_finite() || !is_eligible(origin, bus, mode) {
            continue;
        }
        match best {
            Some(current) if current.distance_km <= distance_km => {}
            _ => best = Some(Candidate { bus, distance_km }),
        }
    }

    best
}
