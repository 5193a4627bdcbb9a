// src/session/state.rs
//
// Session state types: per-corner baselines and histories, alerts, and
// the serializable snapshot. Telemetry blobs never leave the analyzer;
// the snapshot carries derived numbers only.

use crate::analysis::trend::ConsistencyTrend;
use crate::corners::CornerWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    AwaitingBaseline,
    Tracking,
    Complete,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingBaseline => "awaiting_baseline",
            Self::Tracking => "tracking",
            Self::Complete => "complete",
        }
    }
}

/// The reference window one corner is compared against.
#[derive(Debug, Clone)]
pub struct CornerBaseline {
    /// Lap the window was extracted from.
    pub lap: u32,
    pub window: CornerWindow,
}

/// One lap's trace through one corner. The baseline seed has no
/// classification; comparison laps always do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerHistoryEntry {
    pub lap: u32,
    pub smoothness: Option<f64>,
    pub classification: Option<String>,
    pub confidence: Option<f64>,
}

/// Rolling consistency for one corner, refreshed once enough laps are in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CornerScore {
    pub score: f64,
    pub laps_analyzed: usize,
    pub trend: ConsistencyTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    High,
    Medium,
    Low,
}

/// Session alerts. Equality doubles as the dedup key, so consistency
/// alerts carry no per-lap fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    Mistake {
        lap: u32,
        corner: String,
        confidence: f64,
        message: String,
    },
    Consistency {
        corner: String,
        severity: AlertSeverity,
        message: String,
    },
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapTimeEntry {
    pub lap: u32,
    pub time_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CornerSnapshot {
    pub corner: String,
    pub baseline_lap: Option<u32>,
    pub history: Vec<CornerHistoryEntry>,
    pub consistency: Option<CornerScore>,
}

/// Point-in-time dump of session state, in corner-definition order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub track: String,
    pub vehicle: Option<String>,
    pub started_at: DateTime<Utc>,
    pub laps_processed: u32,
    pub reference_lap: Option<u32>,
    pub reference_time_s: Option<f64>,
    pub lap_times: Vec<LapTimeEntry>,
    pub corners: Vec<CornerSnapshot>,
    pub alerts: Vec<Alert>,
}
