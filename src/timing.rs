// src/timing.rs
//
// External timing-table support: the series' endurance CSV export
// (semicolon-delimited, one row per car per lap) keyed by car number
// and lap. Telemetry loggers don't know official lap times, so the
// session layer resolves them here first and only falls back to
// telemetry-derived estimates when a lap has no row.

use crate::error::TimingError;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

// ============================================================================
// FLAGS
// ============================================================================

/// Race-control flag shown at the finish line for a lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagCode {
    #[serde(rename = "GF")]
    Green,
    #[serde(rename = "FCY")]
    FullCourseYellow,
    #[serde(rename = "SC")]
    SafetyCar,
    #[serde(rename = "RED")]
    Red,
    #[serde(rename = "FF")]
    FinishFlag,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl FlagCode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "GF" => Self::Green,
            "FCY" => Self::FullCourseYellow,
            "SC" => Self::SafetyCar,
            "RED" => Self::Red,
            "FF" => Self::FinishFlag,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "GF",
            Self::FullCourseYellow => "FCY",
            Self::SafetyCar => "SC",
            Self::Red => "RED",
            Self::FinishFlag => "FF",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Clean means the lap ran under racing conditions.
    pub fn is_clean(&self) -> bool {
        !matches!(
            self,
            Self::FullCourseYellow | Self::SafetyCar | Self::Red | Self::FinishFlag
        )
    }
}

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapRecord {
    pub vehicle: u32,
    pub lap: u32,
    pub time_s: Option<f64>,
    pub kph: Option<f64>,
    pub top_speed: Option<f64>,
    pub sectors: [Option<f64>; 3],
    pub flag: FlagCode,
}

/// Timing table for one race, keyed by (car number, lap number).
#[derive(Debug, Clone, Default)]
pub struct TimingTable {
    records: HashMap<(u32, u32), LapRecord>,
}

impl TimingTable {
    /// Load the endurance export. `NUMBER` and `LAP_NUMBER` are
    /// required; every other column degrades to a gap per row.
    pub fn load(path: &Path) -> Result<Self, TimingError> {
        let file = std::fs::File::open(path).map_err(|e| TimingError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| TimingError::Csv {
                path: path.to_path_buf(),
                source: e,
            })?
            .clone();
        let col = |name: &str| headers.iter().position(|h| h.trim() == name);

        let number_idx = col("NUMBER");
        let lap_idx = col("LAP_NUMBER");
        let missing: Vec<String> = [("NUMBER", number_idx), ("LAP_NUMBER", lap_idx)]
            .iter()
            .filter(|(_, idx)| idx.is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(TimingError::MissingColumns {
                path: path.to_path_buf(),
                missing,
            });
        }
        let number_idx = number_idx.unwrap_or_default();
        let lap_idx = lap_idx.unwrap_or_default();

        let time_idx = col("LAP_TIME");
        let kph_idx = col("KPH");
        let top_idx = col("TOP_SPEED");
        let sector_idx = [col("S1_SECONDS"), col("S2_SECONDS"), col("S3_SECONDS")];
        let flag_idx = col("FLAG_AT_FL");

        let mut records = HashMap::new();
        for record in reader.records() {
            let record = record.map_err(|e| TimingError::Csv {
                path: path.to_path_buf(),
                source: e,
            })?;
            let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::trim);

            let vehicle = match field(Some(number_idx)).and_then(|v| v.parse::<u32>().ok()) {
                Some(v) => v,
                None => continue,
            };
            let lap = match field(Some(lap_idx)).and_then(|v| v.parse::<u32>().ok()) {
                Some(v) => v,
                None => continue,
            };

            let numeric = |idx: Option<usize>| field(idx).and_then(|v| v.parse::<f64>().ok());
            records.insert(
                (vehicle, lap),
                LapRecord {
                    vehicle,
                    lap,
                    time_s: field(time_idx).and_then(parse_lap_time),
                    kph: numeric(kph_idx),
                    top_speed: numeric(top_idx),
                    sectors: [
                        numeric(sector_idx[0]),
                        numeric(sector_idx[1]),
                        numeric(sector_idx[2]),
                    ],
                    flag: field(flag_idx).map_or(FlagCode::Green, FlagCode::parse),
                },
            );
        }

        debug!(
            laps = records.len(),
            "loaded timing table from {}",
            path.display()
        );
        Ok(Self { records })
    }

    pub fn record(&self, vehicle_id: &str, lap: u32) -> Option<&LapRecord> {
        let number = vehicle_number(vehicle_id)?;
        self.records.get(&(number, lap))
    }

    pub fn lap_time(&self, vehicle_id: &str, lap: u32) -> Option<f64> {
        self.record(vehicle_id, lap).and_then(|r| r.time_s)
    }

    pub fn flag(&self, vehicle_id: &str, lap: u32) -> Option<FlagCode> {
        self.record(vehicle_id, lap).map(|r| r.flag)
    }

    /// Unknown laps are assumed clean.
    pub fn is_clean(&self, vehicle_id: &str, lap: u32) -> bool {
        self.record(vehicle_id, lap).map_or(true, |r| r.flag.is_clean())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Parse `m:ss.xxx` lap times; plain seconds pass through.
pub fn parse_lap_time(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.split_once(':') {
        Some((minutes, seconds)) => {
            let m: f64 = minutes.parse().ok()?;
            let s: f64 = seconds.parse().ok()?;
            Some(m * 60.0 + s)
        }
        None => trimmed.parse().ok(),
    }
}

/// Resolve a car number from either a bare number or a chassis-style
/// id like `GR86-002-13` (trailing segment).
pub fn vehicle_number(vehicle_id: &str) -> Option<u32> {
    let trimmed = vehicle_id.trim();
    if let Ok(number) = trimmed.parse::<u32>() {
        return Some(number);
    }
    trimmed.rsplit('-').next().and_then(|tail| tail.parse().ok())
}

/// Find the endurance export in a directory. First case-insensitive
/// filename containing "endurance" with a .csv extension wins, in
/// sorted order for determinism.
pub fn discover_timing_file(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(2)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default();
            name.ends_with(".csv") && name.contains("endurance")
        })
        .collect();
    candidates.sort();
    if candidates.len() > 1 {
        warn!(
            "multiple timing exports under {}; using {}",
            dir.display(),
            candidates[0].display()
        );
    }
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn test_parse_lap_time_formats() {
        assert_relative_eq!(parse_lap_time("1:53.862").unwrap(), 113.862, epsilon = 1e-9);
        assert_eq!(parse_lap_time("95.5"), Some(95.5));
        assert_eq!(parse_lap_time(""), None);
        assert_eq!(parse_lap_time("abc"), None);
    }

    #[test]
    fn test_vehicle_number_resolution() {
        assert_eq!(vehicle_number("13"), Some(13));
        assert_eq!(vehicle_number("GR86-002-13"), Some(13));
        assert_eq!(vehicle_number("GR86-002-xx"), None);
    }

    #[test]
    fn test_flag_parse_and_clean() {
        assert_eq!(FlagCode::parse("FCY"), FlagCode::FullCourseYellow);
        assert_eq!(FlagCode::parse(""), FlagCode::Green);
        assert_eq!(FlagCode::parse("YELLOW?"), FlagCode::Unknown);
        assert!(FlagCode::Green.is_clean());
        assert!(FlagCode::Unknown.is_clean());
        assert!(!FlagCode::SafetyCar.is_clean());
        assert!(!FlagCode::FullCourseYellow.is_clean());
    }

    fn sample_table() -> TimingTable {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "NUMBER;LAP_NUMBER;LAP_TIME;KPH;TOP_SPEED;S1_SECONDS;S2_SECONDS;S3_SECONDS;FLAG_AT_FL"
        )
        .unwrap();
        writeln!(file, "13;1;1:53.862;116.9;162.1;38.1;40.2;35.5;GF").unwrap();
        writeln!(file, "13;2;2:10.411;102.0;140.3;45.0;44.8;40.6;FCY").unwrap();
        writeln!(file, "13;3;1:52.990;117.8;163.4;37.9;39.9;35.2;").unwrap();
        writeln!(file, "7;1;1:55.000;;;;;;GF").unwrap();
        file.flush().unwrap();
        TimingTable::load(file.path()).unwrap()
    }

    #[test]
    fn test_load_endurance_export() {
        let table = sample_table();
        assert_eq!(table.len(), 4);
        assert_relative_eq!(
            table.lap_time("GR86-002-13", 1).unwrap(),
            113.862,
            epsilon = 1e-9
        );
        assert_relative_eq!(table.lap_time("13", 3).unwrap(), 112.99, epsilon = 1e-9);

        let record = table.record("13", 1).unwrap();
        assert_eq!(record.top_speed, Some(162.1));
        assert_eq!(record.sectors[2], Some(35.5));
        assert_eq!(record.flag, FlagCode::Green);
    }

    #[test]
    fn test_fcy_lap_is_not_clean() {
        let table = sample_table();
        assert!(!table.is_clean("13", 2));
        assert_eq!(table.flag("13", 2), Some(FlagCode::FullCourseYellow));
        // Empty flag cell defaults to green
        assert!(table.is_clean("13", 3));
        // Unknown laps assumed clean
        assert!(table.is_clean("13", 99));
        assert_eq!(table.lap_time("13", 99), None);
    }

    #[test]
    fn test_missing_required_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "CAR;LAP_TIME").unwrap();
        writeln!(file, "13;1:53.0").unwrap();
        file.flush().unwrap();

        match TimingTable::load(file.path()) {
            Err(TimingError::MissingColumns { missing, .. }) => {
                assert!(missing.contains(&"NUMBER".to_string()));
                assert!(missing.contains(&"LAP_NUMBER".to_string()));
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }
}
