// src/analysis/trend.rs
//
// Trend classification shared by the batch consistency engine and the
// live session summary. Both compare the first third of a series with
// the last third; they differ only in tolerance, which is why the
// tolerance is a parameter and not a constant.

use crate::signal::mean;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LapTimeTrend {
    Improving,
    Deteriorating,
    Stable,
}

impl LapTimeTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Deteriorating => "deteriorating",
            Self::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendAssessment {
    pub trend: LapTimeTrend,
    /// Percentage change of the late mean relative to the early mean,
    /// positive in the direction of the classified trend.
    pub change_pct: f64,
}

/// Classify a lap-time trend from at least three values.
///
/// Early is the first floor(n/3) values, late the last ceil(n/3); the
/// asymmetry is part of the contract. `tolerance` is a relative dead
/// band: 0.0 classifies on any difference, 0.005 ignores ±0.5%.
pub fn classify_lap_time_trend(times: &[f64], tolerance: f64) -> Option<TrendAssessment> {
    let n = times.len();
    if n < 3 {
        return None;
    }
    let early = mean(&times[..n / 3]);
    let late = mean(&times[n - (n + 2) / 3..]);

    let assessment = if late < early * (1.0 - tolerance) {
        TrendAssessment {
            trend: LapTimeTrend::Improving,
            change_pct: (early - late) / early * 100.0,
        }
    } else if late > early * (1.0 + tolerance) {
        TrendAssessment {
            trend: LapTimeTrend::Deteriorating,
            change_pct: (late - early) / early * 100.0,
        }
    } else {
        TrendAssessment {
            trend: LapTimeTrend::Stable,
            change_pct: 0.0,
        }
    };
    Some(assessment)
}

/// Corner smoothness across laps; higher raw values mean rougher
/// steering, so a rising series is getting worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyTrend {
    Improving,
    Declining,
    Stable,
}

impl ConsistencyTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
        }
    }
}

/// Half-split trend over per-lap roughness values. Needs five values;
/// late mean above 1.2x the early mean is declining, below 0.8x is
/// improving.
pub fn classify_corner_trend(
    values: &[f64],
    declining_ratio: f64,
    improving_ratio: f64,
) -> ConsistencyTrend {
    if values.len() < 5 {
        return ConsistencyTrend::Stable;
    }
    let half = values.len() / 2;
    let early = mean(&values[..half]);
    let late = mean(&values[half..]);

    if late > early * declining_ratio {
        ConsistencyTrend::Declining
    } else if late < early * improving_ratio {
        ConsistencyTrend::Improving
    } else {
        ConsistencyTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_thirds_split_is_asymmetric() {
        // n = 5: early is 1 value, late is 2. A late pair straddling
        // the early value still registers.
        let times = vec![90.0, 90.1, 95.0, 90.2, 90.0];
        let t = classify_lap_time_trend(&times, 0.0).unwrap();
        assert_eq!(t.trend, LapTimeTrend::Deteriorating);
        assert_relative_eq!(t.change_pct, 0.1 / 90.0 * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tolerance_policies_diverge_at_the_borderline() {
        // 0.11% drift: the strict policy calls it, the banded one does
        // not. The two engines intentionally disagree here.
        let times = vec![90.0, 90.1, 95.0, 90.2, 90.0];
        let strict = classify_lap_time_trend(&times, 0.0).unwrap();
        let banded = classify_lap_time_trend(&times, 0.005).unwrap();
        assert_eq!(strict.trend, LapTimeTrend::Deteriorating);
        assert_eq!(banded.trend, LapTimeTrend::Stable);
        assert_relative_eq!(banded.change_pct, 0.0);
    }

    #[test]
    fn test_improving_trend() {
        let times = vec![95.0, 94.0, 93.0, 91.0, 90.5, 90.0];
        let t = classify_lap_time_trend(&times, 0.005).unwrap();
        assert_eq!(t.trend, LapTimeTrend::Improving);
        assert!(t.change_pct > 0.0);
    }

    #[test]
    fn test_trend_needs_three_values() {
        assert!(classify_lap_time_trend(&[90.0, 91.0], 0.0).is_none());
    }

    #[test]
    fn test_corner_trend_bands() {
        assert_eq!(
            classify_corner_trend(&[1.0, 1.0, 1.0, 1.0, 2.0], 1.2, 0.8),
            ConsistencyTrend::Declining
        );
        assert_eq!(
            classify_corner_trend(&[2.0, 2.0, 1.0, 1.0, 1.0], 1.2, 0.8),
            ConsistencyTrend::Improving
        );
        assert_eq!(
            classify_corner_trend(&[1.0, 1.05, 1.0, 0.95, 1.0], 1.2, 0.8),
            ConsistencyTrend::Stable
        );
        // Under five values the call is always stable
        assert_eq!(
            classify_corner_trend(&[1.0, 5.0, 9.0, 14.0], 1.2, 0.8),
            ConsistencyTrend::Stable
        );
    }
}
