// src/error.rs
//
// Error taxonomy for the data boundaries. Analysis code itself stays
// infallible: degenerate inputs degrade to absent metrics instead of
// erroring, so only ingestion and session plumbing can fail.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading a lap telemetry file.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to read lap file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed telemetry CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Lap file {path} contains no telemetry rows")]
    Empty { path: PathBuf },
}

/// Errors raised while loading an external timing table.
#[derive(Error, Debug)]
pub enum TimingError {
    #[error("Failed to read timing file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed timing CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Timing file {path} is missing required columns: {missing:?}")]
    MissingColumns { path: PathBuf, missing: Vec<String> },
}

/// A lap the live session could not process. Session state is left
/// untouched when this is returned.
#[derive(Error, Debug)]
#[error("Lap {lap} could not be processed: {source}")]
pub struct LapProcessError {
    pub lap: u32,
    #[source]
    pub source: TelemetryError,
}
