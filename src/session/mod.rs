// src/session/mod.rs
//
// Live stint tracking. `LiveSessionAnalyzer` consumes laps one at a
// time as they complete, keeps bounded per-corner state, and raises
// alerts while the car is still on track; `source` feeds it from a
// directory of lap files, either all at once or replayed on a timer.

pub mod live;
pub mod source;
pub mod state;

pub use live::{
    CornerReport, LapOutcome, LapReport, LapTimeStats, LiveSessionAnalyzer, ReferenceLapMetrics,
    SessionSummary, SummaryCorner,
};
pub use source::{scan_lap_files, DirectorySource, LapArrival, LapSource, ReplaySource};
pub use state::{
    Alert, AlertSeverity, CornerHistoryEntry, CornerScore, CornerSnapshot, LapTimeEntry,
    SessionPhase, SessionSnapshot,
};
