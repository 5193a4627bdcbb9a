// src/corners.rs
//
// Corner windowing and per-corner performance comparison. A window is
// the slice of telemetry within ±window_m of a corner's apex distance,
// sorted by distance; undersized windows are discarded rather than
// analyzed.

use crate::config::CornerWindowConfig;
use crate::signal::compact;
use crate::telemetry::{Channel, LapTelemetry};
use crate::track::TrackLayout;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// WINDOW EXTRACTION
// ============================================================================

/// Telemetry rows around one corner, sorted by lap distance.
#[derive(Debug, Clone)]
pub struct CornerWindow {
    pub distance: Vec<f64>,
    pub steering: Option<Channel>,
    pub brake: Option<Channel>,
    pub throttle: Option<Channel>,
    pub speed: Option<Channel>,
    pub time: Option<Channel>,
}

impl CornerWindow {
    pub fn len(&self) -> usize {
        self.distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }
}

/// Cut the window around an apex. Returns None when the lap has no
/// distance channel or fewer than `min_rows` rows fall inside.
pub fn extract_corner_window(
    lap: &LapTelemetry,
    apex_dist_m: f64,
    config: &CornerWindowConfig,
) -> Option<CornerWindow> {
    let distance = lap.distance.as_ref()?;

    let mut picked: Vec<(usize, f64)> = distance
        .values
        .iter()
        .enumerate()
        .filter_map(|(i, d)| d.map(|d| (i, d)))
        .filter(|(_, d)| (d - apex_dist_m).abs() <= config.window_m)
        .collect();

    if picked.len() < config.min_rows {
        debug!(
            apex = apex_dist_m,
            rows = picked.len(),
            "corner window too small, skipping"
        );
        return None;
    }
    picked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let select = |channel: &Option<Channel>| -> Option<Channel> {
        channel
            .as_ref()
            .map(|values| picked.iter().map(|(i, _)| values[*i]).collect())
    };

    Some(CornerWindow {
        distance: picked.iter().map(|(_, d)| *d).collect(),
        steering: select(&lap.steering),
        brake: select(&lap.brake),
        throttle: select(&lap.throttle),
        speed: select(&lap.speed),
        time: select(&lap.time.as_ref().map(|t| t.values.clone())),
    })
}

// ============================================================================
// CORNER METRICS
// ============================================================================

/// Headline numbers for one corner of one lap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CornerMetrics {
    pub max_steering: Option<f64>,
    pub avg_steering: Option<f64>,
    pub max_brake: Option<f64>,
    pub min_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub samples: usize,
}

pub fn corner_metrics(window: &CornerWindow) -> CornerMetrics {
    let steering = window.steering.as_ref().map(|c| compact(c)).unwrap_or_default();
    let speed = window.speed.as_ref().map(|c| compact(c)).unwrap_or_default();
    let brake = window.brake.as_ref().map(|c| compact(c)).unwrap_or_default();

    let abs_steering: Vec<f64> = steering.iter().map(|v| v.abs()).collect();
    CornerMetrics {
        max_steering: fold_max(&abs_steering),
        avg_steering: if abs_steering.is_empty() {
            None
        } else {
            Some(abs_steering.iter().sum::<f64>() / abs_steering.len() as f64)
        },
        max_brake: fold_max(&brake),
        min_speed: fold_min(&speed),
        max_speed: fold_max(&speed),
        samples: window.len(),
    }
}

fn fold_max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn fold_min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

// ============================================================================
// TWO-LAP COMPARISON
// ============================================================================

/// Metric deltas (A − B) for one corner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CornerDelta {
    pub corner: String,
    pub a: CornerMetrics,
    pub b: CornerMetrics,
    pub max_steering_delta: Option<f64>,
    pub avg_steering_delta: Option<f64>,
    pub max_brake_delta: Option<f64>,
    pub min_speed_delta: Option<f64>,
}

pub fn compare_corner(corner: &str, a: CornerMetrics, b: CornerMetrics) -> CornerDelta {
    let delta = |x: Option<f64>, y: Option<f64>| match (x, y) {
        (Some(x), Some(y)) => Some(x - y),
        _ => None,
    };
    CornerDelta {
        corner: corner.to_string(),
        max_steering_delta: delta(a.max_steering, b.max_steering),
        avg_steering_delta: delta(a.avg_steering, b.avg_steering),
        max_brake_delta: delta(a.max_brake, b.max_brake),
        min_speed_delta: delta(a.min_speed, b.min_speed),
        a,
        b,
    }
}

/// Whole-track corner-by-corner comparison of two laps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackComparison {
    pub track: String,
    pub corners: Vec<CornerDelta>,
    pub corners_compared: usize,
    /// Corners where lap A carried more minimum speed than lap B.
    pub a_higher_min_speed: usize,
    pub b_higher_min_speed: usize,
    pub mean_min_speed_delta: Option<f64>,
    pub mean_max_steering_delta: Option<f64>,
}

pub fn compare_laps(
    layout: &TrackLayout,
    lap_a: &LapTelemetry,
    lap_b: &LapTelemetry,
    config: &CornerWindowConfig,
) -> TrackComparison {
    let mut corners = Vec::new();
    for corner in &layout.corners {
        let (Some(win_a), Some(win_b)) = (
            extract_corner_window(lap_a, corner.apex_dist_m, config),
            extract_corner_window(lap_b, corner.apex_dist_m, config),
        ) else {
            continue;
        };
        corners.push(compare_corner(
            &corner.name,
            corner_metrics(&win_a),
            corner_metrics(&win_b),
        ));
    }

    let speed_deltas: Vec<f64> = corners.iter().filter_map(|c| c.min_speed_delta).collect();
    let steering_deltas: Vec<f64> = corners
        .iter()
        .filter_map(|c| c.max_steering_delta)
        .collect();

    TrackComparison {
        track: layout.name.clone(),
        corners_compared: corners.len(),
        a_higher_min_speed: speed_deltas.iter().filter(|d| **d > 0.0).count(),
        b_higher_min_speed: speed_deltas.iter().filter(|d| **d < 0.0).count(),
        mean_min_speed_delta: mean_of(&speed_deltas),
        mean_max_steering_delta: mean_of(&steering_deltas),
        corners,
    }
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Channel;
    use approx::assert_relative_eq;

    fn lap_with_distances(step: f64, count: usize) -> LapTelemetry {
        let distance: Channel = (0..count).map(|i| Some(i as f64 * step)).collect();
        let steering: Channel = (0..count).map(|i| Some((i % 7) as f64 - 3.0)).collect();
        let speed: Channel = (0..count).map(|i| Some(100.0 + (i % 10) as f64)).collect();
        LapTelemetry::from_columns(vec![
            ("lapdist_dls".into(), distance),
            ("steering_angle".into(), steering),
            ("speed".into(), speed),
        ])
    }

    #[test]
    fn test_window_bounds_and_sorting() {
        let lap = lap_with_distances(10.0, 101); // 0..=1000m
        let config = CornerWindowConfig::default();
        let window = extract_corner_window(&lap, 500.0, &config).unwrap();

        // 400..=600 inclusive at 10m steps
        assert_eq!(window.len(), 21);
        assert_relative_eq!(window.distance[0], 400.0);
        assert_relative_eq!(*window.distance.last().unwrap(), 600.0);
        assert!(window.distance.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_window_sorts_unordered_distance() {
        let distance: Channel = vec![Some(520.0), Some(480.0), Some(510.0), Some(490.0), Some(500.0)];
        let lap = LapTelemetry::from_columns(vec![("distance".into(), distance)]);
        let window = extract_corner_window(&lap, 500.0, &CornerWindowConfig::default()).unwrap();
        assert_eq!(window.distance, vec![480.0, 490.0, 500.0, 510.0, 520.0]);
    }

    #[test]
    fn test_window_requires_min_rows() {
        let distance: Channel = vec![Some(490.0), Some(500.0), Some(510.0), Some(2000.0)];
        let lap = LapTelemetry::from_columns(vec![("distance".into(), distance)]);
        assert!(extract_corner_window(&lap, 500.0, &CornerWindowConfig::default()).is_none());
    }

    #[test]
    fn test_window_requires_distance_channel() {
        let steering: Channel = vec![Some(1.0); 50];
        let lap = LapTelemetry::from_columns(vec![("steering_angle".into(), steering)]);
        assert!(extract_corner_window(&lap, 500.0, &CornerWindowConfig::default()).is_none());
    }

    #[test]
    fn test_corner_metrics_and_delta() {
        let window = CornerWindow {
            distance: vec![0.0, 1.0, 2.0, 3.0],
            steering: Some(vec![Some(-10.0), Some(5.0), None, Some(7.0)]),
            brake: Some(vec![Some(20.0), Some(35.0), Some(5.0), None]),
            throttle: None,
            speed: Some(vec![Some(80.0), Some(76.0), Some(92.0), Some(85.0)]),
            time: None,
        };
        let m = corner_metrics(&window);
        assert_relative_eq!(m.max_steering.unwrap(), 10.0);
        assert_relative_eq!(m.avg_steering.unwrap(), 22.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(m.max_brake.unwrap(), 35.0);
        assert_relative_eq!(m.min_speed.unwrap(), 76.0);
        assert_eq!(m.samples, 4);

        let mut other = m.clone();
        other.min_speed = Some(80.0);
        other.max_steering = Some(4.0);
        let delta = compare_corner("T1", m, other);
        assert_relative_eq!(delta.min_speed_delta.unwrap(), -4.0);
        assert_relative_eq!(delta.max_steering_delta.unwrap(), 6.0);
    }
}
