//! Fallback distance estimation.

use serde::{Deserialize, Serialize};

use crate::GeoPoint;

/// Approximate kilometres per degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Where the distances behind a selection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceBasis {
    /// Reported by the external distance service.
    Service,

    /// Computed by [`estimate_km`].
    Estimated,
}

/// Coarse Manhattan estimate in kilometres: `(|Δlat| + |Δlng|) * 111`.
///
/// This ignores longitude convergence and road layout entirely. It only has
/// to rank nearby buses sensibly when no distance service is reachable.
pub fn estimate_km(a: GeoPoint, b: GeoPoint) -> f64 {
    ((a.latitude - b.latitude).abs() + (a.longitude - b.longitude).abs()) * KM_PER_DEGREE
}
