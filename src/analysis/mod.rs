// src/analysis/mod.rs
//
// Driving-behavior analysis modules.
//
// Signal flow:
//   LapTelemetry → corners::extract_corner_window ─┬→ gradient  → CornerAssessment
//                                                  └→ consistency → CornerConsistency
//   LapTelemetry (full lap) → aggregate → LapCharacter / AggregateComparison
//   Lap times → consistency → LapTimeConsistency ─→ trend → TrendAssessment
//
// Orchestrated per-session by session::LiveSessionAnalyzer.

pub mod aggregate;
pub mod consistency;
pub mod gradient;
pub mod trend;

use serde::{Deserialize, Serialize};

// Re-exports for ergonomic access from main.rs
pub use aggregate::{
    aggregate_recommendations, analyze_lap, compare_aggregate, AggregateComparison,
    AggregateConfig, AggregateScore, DrivingStyle, LapCharacter,
};
pub use consistency::{
    analyze_corner_consistency, analyze_lap_times, consistency_report, ConsistencyConfig,
    CornerConsistency, LapTimeConsistency, OutlierLap,
};
pub use gradient::{
    classify_corner_pair, corner_recommendations, Behavior, ClassifierConfig, CornerAssessment,
    CornerSide,
};
pub use trend::{
    classify_corner_trend, classify_lap_time_trend, ConsistencyTrend, LapTimeTrend,
    TrendAssessment,
};

// ============================================================================
// SHARED TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

/// A coaching recommendation attached to an analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    /// Which part of the driving it concerns ("steering", "braking", ...).
    pub area: String,
    pub message: String,
}
