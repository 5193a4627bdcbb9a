// src/telemetry.rs
//
// Lap telemetry ingestion. Column names vary between logger exports, so
// schema resolution happens once at load time into a typed channel set;
// downstream analysis never probes headers again. A lap without any
// resolvable distance column is still usable, it just routes to the
// aggregate (distance-less) analysis path.

use crate::error::TelemetryError;
use csv::ReaderBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A telemetry channel: one sample per row, gaps preserved.
pub type Channel = Vec<Option<f64>>;

pub const STEERING_COLUMN: &str = "steering_angle";
pub const BRAKE_COLUMN: &str = "pbrake_f";
pub const THROTTLE_COLUMN: &str = "ath";
pub const SPEED_COLUMN: &str = "speed";

/// Lap-distance columns, highest priority first.
pub const DISTANCE_COLUMNS: [&str; 4] = ["lapdist_dls", "trigger_lapdist_dls", "Lap", "distance"];

/// Time columns, highest priority first.
pub const TIME_COLUMNS: [&str; 6] = [
    "timestamp",
    "time",
    "sessiontime",
    "laptime",
    "elapsed_time",
    "Time",
];

/// A channel that kept track of which header it was resolved from.
#[derive(Debug, Clone)]
pub struct ResolvedChannel {
    pub column: String,
    pub values: Channel,
}

/// One lap of telemetry with the channel schema already resolved.
#[derive(Debug, Clone, Default)]
pub struct LapTelemetry {
    pub source: Option<PathBuf>,
    pub rows: usize,
    pub steering: Option<Channel>,
    pub brake: Option<Channel>,
    pub throttle: Option<Channel>,
    pub speed: Option<Channel>,
    pub distance: Option<ResolvedChannel>,
    pub time: Option<ResolvedChannel>,
}

impl LapTelemetry {
    /// Load a lap CSV and resolve its channels. Unparseable or empty
    /// cells become gaps; a file without data rows is an error.
    pub fn from_csv(path: &Path) -> Result<Self, TelemetryError> {
        let file = std::fs::File::open(path).map_err(|e| TelemetryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| TelemetryError::Csv {
                path: path.to_path_buf(),
                source: e,
            })?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut columns: Vec<Channel> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record.map_err(|e| TelemetryError::Csv {
                path: path.to_path_buf(),
                source: e,
            })?;
            for (i, column) in columns.iter_mut().enumerate() {
                column.push(record.get(i).and_then(parse_cell));
            }
        }

        if columns.first().map_or(true, |c| c.is_empty()) {
            return Err(TelemetryError::Empty {
                path: path.to_path_buf(),
            });
        }

        let mut lap = Self::from_columns(headers.into_iter().zip(columns).collect());
        lap.source = Some(path.to_path_buf());
        debug!(
            rows = lap.rows,
            distance = lap.distance.as_ref().map(|c| c.column.as_str()),
            time = lap.time.as_ref().map(|c| c.column.as_str()),
            "loaded lap telemetry from {}",
            path.display()
        );
        Ok(lap)
    }

    /// Resolve the channel schema from already-parsed columns. Priority
    /// lists pick the first matching header; duplicates keep the first
    /// occurrence.
    pub fn from_columns(columns: Vec<(String, Channel)>) -> Self {
        let rows = columns.first().map_or(0, |(_, c)| c.len());
        let find = |name: &str| -> Option<Channel> {
            columns
                .iter()
                .find(|(header, _)| header == name)
                .map(|(_, values)| values.clone())
        };
        let resolve = |priority: &[&str]| -> Option<ResolvedChannel> {
            priority.iter().find_map(|name| {
                find(name).map(|values| ResolvedChannel {
                    column: (*name).to_string(),
                    values,
                })
            })
        };

        Self {
            source: None,
            rows,
            steering: find(STEERING_COLUMN),
            brake: find(BRAKE_COLUMN),
            throttle: find(THROTTLE_COLUMN),
            speed: find(SPEED_COLUMN),
            distance: resolve(&DISTANCE_COLUMNS),
            time: resolve(&TIME_COLUMNS),
        }
    }

    /// Whether corner-level analysis is possible for this lap.
    pub fn has_distance(&self) -> bool {
        self.distance.is_some()
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}
