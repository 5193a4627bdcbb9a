// src/time_delta.rs
//
// Time arithmetic over telemetry: lap-time estimation when the timing
// table has no row, corner-duration deltas, and time-at-distance
// interpolation for cumulative delta traces.

use crate::corners::CornerWindow;
use crate::signal::compact;
use crate::telemetry::LapTelemetry;
use serde::{Deserialize, Serialize};

/// Plausibility band for a full lap, seconds.
const MIN_LAP_SECONDS: f64 = 0.0;
const MAX_LAP_SECONDS: f64 = 500.0;
/// Distance/speed estimates get a tighter lower bound; sub-30s numbers
/// mean the speed units don't match the distance units.
const MIN_ESTIMATED_SECONDS: f64 = 30.0;

/// Estimate a lap time from telemetry alone.
///
/// The resolved time channel is tried first: the span of its values
/// counts when it lands inside (0, 500) seconds. Otherwise distance
/// covered divided by average speed is used, accepted inside (30, 500).
pub fn estimate_lap_time(lap: &LapTelemetry) -> Option<f64> {
    if let Some(time) = &lap.time {
        let values = compact(&time.values);
        if values.len() >= 2 {
            let span = fold_max(&values) - fold_min(&values);
            if span > MIN_LAP_SECONDS && span < MAX_LAP_SECONDS {
                return Some(span);
            }
        }
    }

    let distance = compact(&lap.distance.as_ref()?.values);
    let speed = compact(lap.speed.as_ref()?);
    if distance.len() <= 10 || speed.len() <= 10 {
        return None;
    }
    let covered = fold_max(&distance) - fold_min(&distance);
    let avg_speed = speed.iter().sum::<f64>() / speed.len() as f64;
    if avg_speed <= 0.0 {
        return None;
    }
    let estimate = covered / avg_speed;
    if estimate > MIN_ESTIMATED_SECONDS && estimate < MAX_LAP_SECONDS {
        Some(estimate)
    } else {
        None
    }
}

/// Time spent in two corner windows and their difference (A − B).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CornerTimeDelta {
    pub duration_a: f64,
    pub duration_b: f64,
    pub delta: f64,
}

pub fn corner_time_delta(a: &CornerWindow, b: &CornerWindow) -> Option<CornerTimeDelta> {
    let duration = |window: &CornerWindow| -> Option<f64> {
        let times = compact(window.time.as_ref()?);
        if times.is_empty() {
            return None;
        }
        Some(fold_max(&times) - fold_min(&times))
    };
    let duration_a = duration(a)?;
    let duration_b = duration(b)?;
    Some(CornerTimeDelta {
        duration_a,
        duration_b,
        delta: duration_a - duration_b,
    })
}

/// Linear interpolation of the time channel at a lap distance, clamped
/// to the sampled range. Needs both distance and time channels.
pub fn interpolate_time_at_distance(lap: &LapTelemetry, target_dist_m: f64) -> Option<f64> {
    let distance = &lap.distance.as_ref()?.values;
    let time = &lap.time.as_ref()?.values;

    let mut points: Vec<(f64, f64)> = distance
        .iter()
        .zip(time.iter())
        .filter_map(|(d, t)| Some(((*d)?, (*t)?)))
        .collect();
    if points.is_empty() {
        return None;
    }
    points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    if target_dist_m <= points[0].0 {
        return Some(points[0].1);
    }
    if target_dist_m >= points[points.len() - 1].0 {
        return Some(points[points.len() - 1].1);
    }
    for pair in points.windows(2) {
        let (d0, t0) = pair[0];
        let (d1, t1) = pair[1];
        if target_dist_m >= d0 && target_dist_m <= d1 {
            if d1 == d0 {
                return Some(t1);
            }
            let frac = (target_dist_m - d0) / (d1 - d0);
            return Some(t0 + frac * (t1 - t0));
        }
    }
    None
}

/// One point of a cumulative delta trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeDeltaPoint {
    pub distance_m: f64,
    pub delta_s: Option<f64>,
}

/// Elapsed-time difference (A − B) at each requested distance. Both
/// laps are rebased to their own first timestamp so wallclock offsets
/// cancel out.
pub fn cumulative_delta(
    lap_a: &LapTelemetry,
    lap_b: &LapTelemetry,
    distances: &[f64],
) -> Vec<TimeDeltaPoint> {
    let base = |lap: &LapTelemetry| -> Option<f64> {
        let time = compact(&lap.time.as_ref()?.values);
        if time.is_empty() {
            None
        } else {
            Some(fold_min(&time))
        }
    };
    let base_a = base(lap_a);
    let base_b = base(lap_b);

    distances
        .iter()
        .map(|&d| {
            let delta = match (
                interpolate_time_at_distance(lap_a, d),
                interpolate_time_at_distance(lap_b, d),
                base_a,
                base_b,
            ) {
                (Some(ta), Some(tb), Some(ba), Some(bb)) => Some((ta - ba) - (tb - bb)),
                _ => None,
            };
            TimeDeltaPoint {
                distance_m: d,
                delta_s: delta,
            }
        })
        .collect()
}

fn fold_max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn fold_min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
