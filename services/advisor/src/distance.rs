//! Distance lookups with a deterministic fallback.
//!
//! The primary source is a Distance Matrix style HTTP API: one origin, N
//! destinations, N road distances back in input order. Anything that keeps us
//! from trusting that answer (no credential, transport error, bad status, a
//! response whose shape does not line up with the request) sends the whole
//! lookup to the Manhattan estimator instead. One origin's candidates are
//! never measured with a mix of the two.

use std::time::Duration;

use async_trait::async_trait;
use rebal_fleet::{estimate_km, Bus, DistanceBasis, GeoPoint};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Public Google endpoint.
pub const DEFAULT_DISTANCE_MATRIX_URL: &str =
    "https://maps.googleapis.com/maps/api/distancematrix/json";

/// Errors from the primary distance source. None of these reach callers of
/// [`lookup_with_fallback`].
#[derive(Debug, Error)]
pub enum DistanceError {
    #[error("distance service credential is not configured")]
    MissingCredential,

    #[error("distance request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("distance service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("distance service rejected the request: {status}")]
    Rejected {
        status: String,
        message: Option<String>,
    },

    #[error("distance response has no rows")]
    MissingRows,

    #[error("distance response has {actual} elements for {expected} destinations")]
    CountMismatch { expected: usize, actual: usize },

    #[error("no distance for destination {index}: element status {status}")]
    Element { index: usize, status: String },
}

/// Source of road distances from one origin to many destinations.
#[async_trait]
pub trait DistanceSource: Send + Sync {
    /// Distances in kilometres, one per destination, in input order.
    async fn distances_km(
        &self,
        origin: GeoPoint,
        destinations: &[GeoPoint],
    ) -> Result<Vec<f64>, DistanceError>;
}

/// Client for the Google Distance Matrix JSON API.
#[derive(Debug, Clone)]
pub struct DistanceMatrixClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl DistanceMatrixClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DistanceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    #[serde(default)]
    distance: Option<MatrixValue>,
}

#[derive(Debug, Deserialize)]
struct MatrixValue {
    /// Metres.
    value: f64,
}

#[async_trait]
impl DistanceSource for DistanceMatrixClient {
    async fn distances_km(
        &self,
        origin: GeoPoint,
        destinations: &[GeoPoint],
    ) -> Result<Vec<f64>, DistanceError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(DistanceError::MissingCredential);
        };
        if destinations.is_empty() {
            return Ok(Vec::new());
        }

        let joined = destinations
            .iter()
            .map(GeoPoint::to_query)
            .collect::<Vec<_>>()
            .join("|");
        let origin = origin.to_query();

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("origins", origin.as_str()),
                ("destinations", joined.as_str()),
                ("key", api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DistanceError::Status { status, body });
        }

        let payload: MatrixResponse = response.json().await?;
        parse_matrix(payload, destinations.len())
    }
}

fn parse_matrix(payload: MatrixResponse, expected: usize) -> Result<Vec<f64>, DistanceError> {
    if payload.status != "OK" {
        return Err(DistanceError::Rejected {
            status: payload.status,
            message: payload.error_message,
        });
    }

    let row = payload
        .rows
        .into_iter()
        .next()
        .ok_or(DistanceError::MissingRows)?;

    if row.elements.len() != expected {
        return Err(DistanceError::CountMismatch {
            expected,
            actual: row.elements.len(),
        });
    }

    row.elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| match (element.status.as_str(), element.distance) {
            ("OK", Some(d)) if d.value.is_finite() && d.value >= 0.0 => Ok(d.value / 1000.0),
            _ => Err(DistanceError::Element {
                index,
                status: element.status,
            }),
        })
        .collect()
}

/// Distances for one origin together with where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Distances {
    pub km: Vec<f64>,
    pub basis: DistanceBasis,
}

/// Estimator-only distances from `origin` to each candidate.
pub fn estimated(origin: &Bus, candidates: &[&Bus]) -> Distances {
    Distances {
        km: candidates
            .iter()
            .map(|c| estimate_km(origin.position, c.position))
            .collect(),
        basis: DistanceBasis::Estimated,
    }
}

/// Ask `source` for distances and fall back to the estimator on any failure.
pub async fn lookup_with_fallback(
    source: &dyn DistanceSource,
    origin: &Bus,
    candidates: &[&Bus],
) -> Distances {
    let destinations: Vec<GeoPoint> = candidates.iter().map(|c| c.position).collect();

    match source.distances_km(origin.position, &destinations).await {
        Ok(km) if km.len() == candidates.len() => {
            debug!(bus_id = %origin.id, candidates = km.len(), "Using service distances");
            Distances {
                km,
                basis: DistanceBasis::Service,
            }
        }
        Ok(km) => {
            warn!(
                bus_id = %origin.id,
                expected = candidates.len(),
                actual = km.len(),
                "Distance source returned the wrong number of distances, using estimator"
            );
            estimated(origin, candidates)
        }
        Err(DistanceError::MissingCredential) => {
            warn!(bus_id = %origin.id, "No distance service credential, using estimator");
            estimated(origin, candidates)
        }
        Err(e) => {
            warn!(bus_id = %origin.id, error = %e, "Distance lookup failed, using estimator");
            estimated(origin, candidates)
        }
    }
}
