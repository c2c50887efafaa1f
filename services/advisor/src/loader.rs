//! Fleet snapshot loading.
//!
//! Fleet files come in two shapes:
//! - `.json`: an array of bus objects
//! - `.csv`: a header row followed by one bus per line
//!
//! Both use the same column names (`id`, `driver`, `phone`, `seatingCapacity`,
//! `currentAttendance`, `latitude`, `longitude`). Unknown columns are ignored.
//! Every row is validated before the snapshot is built; the first bad row
//! aborts the load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rebal_fleet::{Bus, BusId, FleetError, FleetSnapshot, GeoPoint};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while loading a fleet snapshot.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a JSON array of buses: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("row {row}: {message}")]
    MalformedRow { row: usize, message: String },

    #[error("row {row}: {source}")]
    InvalidRow {
        row: usize,
        #[source]
        source: FleetError,
    },

    #[error("invalid fleet: {0}")]
    InvalidFleet(#[from] FleetError),

    #[error("unsupported fleet file format: {0} (expected .json or .csv)")]
    UnsupportedFormat(PathBuf),
}

/// Source of fleet snapshots.
#[async_trait]
pub trait FleetLoader: Send + Sync {
    /// Load a fresh, validated snapshot.
    async fn load(&self) -> Result<FleetSnapshot, LoadError>;

    /// Human-readable description of where buses come from.
    fn describe(&self) -> String;
}

/// Loads buses from a JSON or CSV file on disk.
#[derive(Debug, Clone)]
pub struct FileFleetLoader {
    path: PathBuf,
}

impl FileFleetLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FleetLoader for FileFleetLoader {
    async fn load(&self) -> Result<FleetSnapshot, LoadError> {
        let format = FileFormat::detect(&self.path)?;
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| LoadError::Io {
                path: self.path.clone(),
                source,
            })?;

        let buses = match format {
            FileFormat::Json => parse_json(&self.path, &contents)?,
            FileFormat::Csv => parse_csv(&contents)?,
        };
        debug!(path = %self.path.display(), rows = buses.len(), "Parsed fleet file");

        let snapshot = FleetSnapshot::new(buses)?;
        info!(
            path = %self.path.display(),
            buses = snapshot.len(),
            "Fleet snapshot loaded"
        );
        Ok(snapshot)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Clone, Copy)]
enum FileFormat {
    Json,
    Csv,
}

impl FileFormat {
    fn detect(path: &Path) -> Result<Self, LoadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            _ => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Parse a JSON array, reporting the index of the first row that fails.
pub fn parse_json(path: &Path, contents: &str) -> Result<Vec<Bus>, LoadError> {
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(contents).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    rows.into_iter()
        .enumerate()
        .map(|(row, value)| {
            let bus: Bus = serde_json::from_value(value).map_err(|e| LoadError::MalformedRow {
                row,
                message: e.to_string(),
            })?;
            bus.validate()
                .map_err(|source| LoadError::InvalidRow { row, source })?;
            Ok(bus)
        })
        .collect()
}

/// CSV rows are read flat; the position is assembled afterwards.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsvRow {
    id: BusId,
    driver: String,
    #[serde(default)]
    phone: Option<String>,
    seating_capacity: u32,
    current_attendance: u32,
    latitude: f64,
    longitude: f64,
}

impl From<CsvRow> for Bus {
    fn from(row: CsvRow) -> Self {
        Self {
            id: row.id,
            driver: row.driver,
            phone: row.phone.filter(|p| !p.trim().is_empty()),
            seating_capacity: row.seating_capacity,
            current_attendance: row.current_attendance,
            position: GeoPoint::new(row.latitude, row.longitude),
        }
    }
}

/// Parse CSV with a header row. Row numbers count data rows from zero.
pub fn parse_csv(contents: &str) -> Result<Vec<Bus>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    reader
        .deserialize::<CsvRow>()
        .enumerate()
        .map(|(row, record)| {
            let bus = Bus::from(record.map_err(|e| LoadError::MalformedRow {
                row,
                message: e.to_string(),
            })?);
            bus.validate()
                .map_err(|source| LoadError::InvalidRow { row, source })?;
            Ok(bus)
        })
        .collect()
}
