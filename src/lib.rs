// src/lib.rs
//
// Corner-by-corner lap comparison and driving-behavior analysis for
// circuit telemetry. Data layers (telemetry, track, timing) feed the
// signal primitives; `analysis` classifies corners and stints after
// the fact, `session` does the same lap-by-lap while the car is still
// on track.

pub mod analysis;
pub mod config;
pub mod corners;
pub mod error;
pub mod session;
pub mod signal;
pub mod telemetry;
pub mod time_delta;
pub mod timing;
pub mod track;

pub use analysis::{
    classify_corner_pair, AggregateConfig, Behavior, ClassifierConfig, ConsistencyConfig,
    CornerAssessment, CornerSide, Priority, Recommendation,
};
pub use config::{AnalysisConfig, CornerWindowConfig, SessionConfig};
pub use corners::{extract_corner_window, CornerWindow};
pub use error::{LapProcessError, TelemetryError, TimingError};
pub use session::{LapOutcome, LapReport, LiveSessionAnalyzer, SessionSummary};
pub use telemetry::LapTelemetry;
pub use timing::{FlagCode, TimingTable};
pub use track::TrackLayout;
