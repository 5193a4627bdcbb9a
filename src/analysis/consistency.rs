// src/analysis/consistency.rs
//
// Multi-lap consistency: coefficient-of-variation scoring over lap
// times, outlier laps, lap-time trend, and per-corner smoothness
// spread across a stint. Batch counterpart of the live session's
// rolling consistency scores.

use super::trend::{classify_lap_time_trend, TrendAssessment};
use crate::config::CornerWindowConfig;
use crate::corners::{extract_corner_window, CornerWindow};
use crate::signal::{compact, gradient, mean, mean_abs, std_pop};
use crate::telemetry::LapTelemetry;
use crate::track::TrackLayout;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    pub cv_scale: f64,
    pub outlier_sigma: f64,
    /// Leave-one-out outlier stats need this many valid lap times.
    pub min_outlier_laps: usize,
    pub laptime_trend_tolerance: f64,
    pub min_corner_laps: usize,
    /// Corner scores below this are flagged in the report.
    pub report_flag_below: f64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            cv_scale: 50.0,                // score = 100 / (1 + CV/50)
            outlier_sigma: 2.0,
            min_outlier_laps: 4,
            laptime_trend_tolerance: 0.0,  // batch engine classifies strictly
            min_corner_laps: 2,
            report_flag_below: 70.0,
        }
    }
}

// ============================================================================
// LAP TIMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierDirection {
    Faster,
    Slower,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierLap {
    pub lap: u32,
    pub time_s: f64,
    /// Deviation from the overall mean, for display.
    pub deviation_s: f64,
    pub direction: OutlierDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapTimeConsistency {
    pub laps_analyzed: usize,
    pub fastest_s: f64,
    pub slowest_s: f64,
    pub mean_s: f64,
    pub std_s: f64,
    pub range_s: f64,
    pub cv_pct: f64,
    pub score: f64,
    pub outliers: Vec<OutlierLap>,
    pub trend: Option<TrendAssessment>,
}

/// Score a stint of lap times. Needs at least two positive times;
/// returns None otherwise.
pub fn analyze_lap_times(
    times: &[(u32, f64)],
    config: &ConsistencyConfig,
) -> Option<LapTimeConsistency> {
    let valid: Vec<(u32, f64)> = times
        .iter()
        .copied()
        .filter(|(_, t)| t.is_finite() && *t > 0.0)
        .collect();
    if valid.len() < 2 {
        return None;
    }

    let values: Vec<f64> = valid.iter().map(|(_, t)| *t).collect();
    let mean_s = mean(&values);
    let std_s = std_pop(&values);
    let cv_pct = if mean_s > 0.0 { std_s / mean_s * 100.0 } else { 0.0 };
    let score = (100.0 / (1.0 + cv_pct / config.cv_scale)).clamp(0.0, 100.0);

    let fastest = values.iter().copied().fold(f64::INFINITY, f64::min);
    let slowest = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(LapTimeConsistency {
        laps_analyzed: valid.len(),
        fastest_s: fastest,
        slowest_s: slowest,
        mean_s,
        std_s,
        range_s: slowest - fastest,
        cv_pct,
        score,
        outliers: detect_outliers(&valid, config),
        trend: classify_lap_time_trend(&values, config.laptime_trend_tolerance),
    })
}

/// Leave-one-out outlier test: a lap is an outlier when it deviates
/// from the mean of the other laps by more than `outlier_sigma` times
/// their spread. With the candidate included, the attainable z-score is
/// capped at (n-1)/sqrt(n), which never reaches 2 in short stints.
fn detect_outliers(valid: &[(u32, f64)], config: &ConsistencyConfig) -> Vec<OutlierLap> {
    if valid.len() < config.min_outlier_laps {
        return Vec::new();
    }
    let all: Vec<f64> = valid.iter().map(|(_, t)| *t).collect();
    let overall_mean = mean(&all);

    let mut outliers = Vec::new();
    for (i, (lap, time)) in valid.iter().enumerate() {
        let others: Vec<f64> = all
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, t)| *t)
            .collect();
        let loo_mean = mean(&others);
        let loo_std = std_pop(&others);
        if (time - loo_mean).abs() > config.outlier_sigma * loo_std {
            outliers.push(OutlierLap {
                lap: *lap,
                time_s: *time,
                deviation_s: (time - overall_mean).abs(),
                direction: if *time < overall_mean {
                    OutlierDirection::Faster
                } else {
                    OutlierDirection::Slower
                },
            });
        }
    }
    outliers
}

// ============================================================================
// CORNER SMOOTHNESS
// ============================================================================

/// Roughness of the raw steering trace in one corner window: mean
/// absolute gradient of the non-missing samples. Needs two samples.
pub fn corner_smoothness(window: &CornerWindow) -> Option<f64> {
    let steering = compact(window.steering.as_ref()?);
    if steering.len() < 2 {
        return None;
    }
    Some(mean_abs(&gradient(&steering)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CornerConsistency {
    pub corner: String,
    pub score: f64,
    pub laps: usize,
    pub mean_smoothness: f64,
}

/// Per-corner consistency across a stint: CV of the per-lap smoothness
/// values, folded into the same 0..100 score as lap times.
pub fn analyze_corner_consistency(
    laps: &[(u32, &LapTelemetry)],
    layout: &TrackLayout,
    window_config: &CornerWindowConfig,
    config: &ConsistencyConfig,
) -> Vec<CornerConsistency> {
    let mut results = Vec::new();
    for corner in &layout.corners {
        let smoothness: Vec<f64> = laps
            .iter()
            .filter_map(|(_, lap)| {
                extract_corner_window(lap, corner.apex_dist_m, window_config)
                    .as_ref()
                    .and_then(corner_smoothness)
            })
            .collect();
        if smoothness.len() < config.min_corner_laps {
            debug!(corner = corner.name.as_str(), "insufficient laps for corner consistency");
            continue;
        }
        let m = mean(&smoothness);
        let cv = if m > 0.0 {
            std_pop(&smoothness) / m * 100.0
        } else {
            0.0
        };
        results.push(CornerConsistency {
            corner: corner.name.clone(),
            score: (100.0 / (1.0 + cv / config.cv_scale)).clamp(0.0, 100.0),
            laps: smoothness.len(),
            mean_smoothness: m,
        });
    }
    results
}

// ============================================================================
// REPORT
// ============================================================================

/// Render `m:ss.xxx` for report lines.
pub fn format_lap_time(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor() as u32;
    let rem = seconds - minutes as f64 * 60.0;
    format!("{minutes}:{rem:06.3}")
}

/// Plain-text stint report.
pub fn consistency_report(
    lap_times: Option<&LapTimeConsistency>,
    corners: &[CornerConsistency],
    config: &ConsistencyConfig,
) -> String {
    let mut lines = Vec::new();
    lines.push("=".repeat(50));
    lines.push(" LAP CONSISTENCY REPORT".to_string());
    lines.push("=".repeat(50));

    match lap_times {
        Some(stats) => {
            lines.push(format!("Laps analyzed:      {}", stats.laps_analyzed));
            lines.push(format!("Consistency score:  {:.1} / 100", stats.score));
            lines.push(format!(
                "Fastest lap:        {}",
                format_lap_time(stats.fastest_s)
            ));
            lines.push(format!(
                "Slowest lap:        {}",
                format_lap_time(stats.slowest_s)
            ));
            lines.push(format!(
                "Mean lap time:      {}  (std {:.3}s)",
                format_lap_time(stats.mean_s),
                stats.std_s
            ));
            if let Some(trend) = &stats.trend {
                lines.push(format!(
                    "Trend:              {} ({:+.2}%)",
                    trend.trend.as_str(),
                    trend.change_pct
                ));
            }
            if !stats.outliers.is_empty() {
                lines.push("Outliers:".to_string());
                for outlier in &stats.outliers {
                    lines.push(format!(
                        "  Lap {}: {} ({:+.3}s vs mean, {})",
                        outlier.lap,
                        format_lap_time(outlier.time_s),
                        match outlier.direction {
                            OutlierDirection::Faster => -outlier.deviation_s,
                            OutlierDirection::Slower => outlier.deviation_s,
                        },
                        match outlier.direction {
                            OutlierDirection::Faster => "faster",
                            OutlierDirection::Slower => "slower",
                        }
                    ));
                }
            }
        }
        None => lines.push("Not enough timed laps for lap-time statistics".to_string()),
    }

    if !corners.is_empty() {
        lines.push("Corner consistency:".to_string());
        for corner in corners {
            let flag = if corner.score < config.report_flag_below {
                "  << inconsistent"
            } else {
                ""
            };
            lines.push(format!(
                "  {:<12} {:>5.1}  ({} laps){}",
                corner.corner, corner.score, corner.laps, flag
            ));
        }
    }
    lines.push("=".repeat(50));
    lines.join("\n")
}
