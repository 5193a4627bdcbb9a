// src/config.rs
//
// Analysis configuration. Every section has a Default carrying the
// tuned thresholds; a YAML file may override any subset of them.

use crate::analysis::{AggregateConfig, ClassifierConfig, ConsistencyConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub classifier: ClassifierConfig,
    pub window: CornerWindowConfig,
    pub aggregate: AggregateConfig,
    pub consistency: ConsistencyConfig,
    pub session: SessionConfig,
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: AnalysisConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerWindowConfig {
    /// Half-width of the corner window around the apex distance.
    pub window_m: f64,
    /// Windows with fewer rows than this are discarded.
    pub min_rows: usize,
}

impl Default for CornerWindowConfig {
    fn default() -> Self {
        Self {
            window_m: 100.0,
            min_rows: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-corner history entries kept per session.
    pub history_cap: usize,
    pub mistake_alert_confidence: f64,
    /// Laps processed before rolling consistency scores are computed.
    pub consistency_refresh_after: u32,
    /// Smoothness values a corner needs before it gets a score.
    pub consistency_min_values: usize,
    pub corner_declining_ratio: f64,
    pub corner_improving_ratio: f64,
    pub consistency_alert_below: f64,
    /// Recent-history window and mistake count for consistency alerts.
    pub recent_mistake_window: usize,
    pub recent_mistake_min: usize,
    /// Dead band for the session-summary lap-time trend.
    pub summary_trend_tolerance: f64,
    pub summary_problem_below: f64,
    pub summary_good_at_least: f64,
    /// Reference-lap steering smoothness scale in the summary.
    pub smoothness_scale: f64,
    /// Reference-lap brake consistency scale in the summary.
    pub brake_std_scale: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_cap: 20,
            mistake_alert_confidence: 0.75,
            consistency_refresh_after: 3,
            consistency_min_values: 3,
            corner_declining_ratio: 1.2,
            corner_improving_ratio: 0.8,
            consistency_alert_below: 65.0,
            recent_mistake_window: 3,
            recent_mistake_min: 2,
            summary_trend_tolerance: 0.005,  // ±0.5% band
            summary_problem_below: 70.0,
            summary_good_at_least: 85.0,
            smoothness_scale: 50.0,
            brake_std_scale: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = "
window:
  window_m: 80.0
session:
  history_cap: 10
";
        let config: AnalysisConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.window.window_m, 80.0);
        assert_eq!(config.window.min_rows, 5);
        assert_eq!(config.session.history_cap, 10);
        assert_eq!(config.session.mistake_alert_confidence, 0.75);
        assert_eq!(config.classifier.spikiness_ratio, 2.0);
    }

    #[test]
    fn test_empty_yaml_is_all_defaults() {
        let config: AnalysisConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.consistency.outlier_sigma, 2.0);
        assert_eq!(config.aggregate.min_samples, 10);
    }
}
