// src/analysis/aggregate.rs
//
// Whole-lap fallback analysis for telemetry without a usable distance
// channel. No corners, no windows: just lap-level character metrics
// (steering smoothness, brake consistency, throttle commitment), a
// coarse style label, and coaching notes.

use super::{Priority, Recommendation};
use crate::signal::{compact, gradient, mean_abs, savgol_smooth, std_pop};
use crate::telemetry::LapTelemetry;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub min_samples: usize,
    pub smoothing_window: usize,
    pub jerk_scale: f64,
    pub brake_event_threshold: f64,
    pub min_brake_events: usize,
    pub brake_std_scale: f64,
    pub full_throttle_threshold: f64,
    pub throttle_boost: f64,
    pub style_threshold: f64,
    pub rec_high_below: f64,
    pub rec_medium_below: f64,
    pub throttle_rec_below: f64,
    pub missing_score_substitute: f64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,              // channel must carry real data
            smoothing_window: 11,
            jerk_scale: 50.0,             // smoothness = 100 - mean|jerk| * 50
            brake_event_threshold: 10.0,  // bar; below this is noise/idle
            min_brake_events: 5,
            brake_std_scale: 25.0,        // consistency = 100 / (1 + std/25)
            full_throttle_threshold: 80.0,
            throttle_boost: 1.2,
            style_threshold: 70.0,
            rec_high_below: 50.0,
            rec_medium_below: 70.0,
            throttle_rec_below: 40.0,
            missing_score_substitute: 50.0,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivingStyle {
    SmoothTechnical,
    SmoothAggressive,
    PreciseAggressive,
    Developing,
    Unknown,
}

impl DrivingStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SmoothTechnical => "smooth_technical",
            Self::SmoothAggressive => "smooth_aggressive",
            Self::PreciseAggressive => "precise_aggressive",
            Self::Developing => "developing",
            Self::Unknown => "unknown",
        }
    }
}

/// Lap-level character metrics. Each score lives on a 0..100 scale and
/// is absent when its channel failed the sample gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapCharacter {
    pub steering_smoothness: Option<f64>,
    pub brake_consistency: Option<f64>,
    pub throttle_confidence: Option<f64>,
    pub full_throttle_pct: Option<f64>,
    pub style: DrivingStyle,
}

// ============================================================================
// ANALYSIS
// ============================================================================

pub fn analyze_lap(lap: &LapTelemetry, config: &AggregateConfig) -> LapCharacter {
    let steering_smoothness = lap
        .steering
        .as_ref()
        .and_then(|c| steering_smoothness(&compact(c), config));
    let brake_consistency = lap
        .brake
        .as_ref()
        .and_then(|c| brake_consistency(&compact(c), config));
    let throttle = lap
        .throttle
        .as_ref()
        .and_then(|c| throttle_commitment(&compact(c), config));

    let character = LapCharacter {
        steering_smoothness,
        brake_consistency,
        throttle_confidence: throttle.map(|t| t.0),
        full_throttle_pct: throttle.map(|t| t.1),
        style: style_of(steering_smoothness, brake_consistency, config),
    };
    debug!(
        style = character.style.as_str(),
        smoothness = character.steering_smoothness,
        brake = character.brake_consistency,
        "aggregate lap analysis"
    );
    character
}

/// Smoothness from steering jerk: smooth the compacted series, take the
/// second gradient, and scale its mean magnitude into 0..100.
fn steering_smoothness(steering: &[f64], config: &AggregateConfig) -> Option<f64> {
    if steering.len() < config.min_samples {
        return None;
    }
    let smoothed = savgol_smooth(steering, config.smoothing_window);
    let jerk = gradient(&gradient(&smoothed));
    Some((100.0 - mean_abs(&jerk) * config.jerk_scale).max(0.0))
}

/// Consistency of brake application across braking events (samples
/// above the event threshold, differentiated as one series).
fn brake_consistency(brake: &[f64], config: &AggregateConfig) -> Option<f64> {
    if brake.len() < config.min_samples {
        return None;
    }
    let events: Vec<f64> = brake
        .iter()
        .copied()
        .filter(|v| *v > config.brake_event_threshold)
        .collect();
    if events.len() < config.min_brake_events {
        return None;
    }
    let spread = std_pop(&gradient(&events));
    Some(100.0 / (1.0 + spread / config.brake_std_scale))
}

/// (confidence, full-throttle percentage).
fn throttle_commitment(throttle: &[f64], config: &AggregateConfig) -> Option<(f64, f64)> {
    if throttle.len() < config.min_samples {
        return None;
    }
    let full = throttle
        .iter()
        .filter(|v| **v > config.full_throttle_threshold)
        .count() as f64
        / throttle.len() as f64
        * 100.0;
    Some(((full * config.throttle_boost).min(100.0), full))
}

fn style_of(
    smoothness: Option<f64>,
    brake: Option<f64>,
    config: &AggregateConfig,
) -> DrivingStyle {
    match (smoothness, brake) {
        (Some(s), Some(b)) => {
            let t = config.style_threshold;
            if s > t && b > t {
                DrivingStyle::SmoothTechnical
            } else if s > t {
                DrivingStyle::SmoothAggressive
            } else if b > t {
                DrivingStyle::PreciseAggressive
            } else {
                DrivingStyle::Developing
            }
        }
        _ => DrivingStyle::Unknown,
    }
}

// ============================================================================
// RECOMMENDATIONS
// ============================================================================

pub fn aggregate_recommendations(
    character: &LapCharacter,
    config: &AggregateConfig,
) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    if let Some(s) = character.steering_smoothness {
        if s < config.rec_high_below {
            recs.push(Recommendation {
                priority: Priority::High,
                area: "steering".to_string(),
                message: "Focus on smoother steering inputs - current trace shows jerky movements"
                    .to_string(),
            });
        } else if s < config.rec_medium_below {
            recs.push(Recommendation {
                priority: Priority::Medium,
                area: "steering".to_string(),
                message: "Work on steering smoothness for better tire grip and stability"
                    .to_string(),
            });
        }
    }

    if let Some(b) = character.brake_consistency {
        if b < config.rec_high_below {
            recs.push(Recommendation {
                priority: Priority::High,
                area: "braking".to_string(),
                message: "Brake pressure is inconsistent - practice progressive application"
                    .to_string(),
            });
        } else if b < config.rec_medium_below {
            recs.push(Recommendation {
                priority: Priority::Medium,
                area: "braking".to_string(),
                message: "Improve brake modulation for more consistent corner entry".to_string(),
            });
        }
    }

    if let Some(t) = character.throttle_confidence {
        if t < config.throttle_rec_below {
            recs.push(Recommendation {
                priority: Priority::Medium,
                area: "throttle".to_string(),
                message: "Build confidence toward earlier full-throttle commitment".to_string(),
            });
        }
    }

    if recs.is_empty() {
        recs.push(Recommendation {
            priority: Priority::Low,
            area: "overall".to_string(),
            message: "Strong fundamentals - focus on fine-tuning racecraft".to_string(),
        });
    }
    recs
}

// ============================================================================
// CROSS-LAP COMPARISON
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateScore {
    pub vehicle: String,
    pub steering_smoothness: f64,
    pub brake_consistency: f64,
    pub throttle_confidence: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateComparison {
    pub a: AggregateScore,
    pub b: AggregateScore,
    pub winner: String,
    pub margin: f64,
}

/// Compare two laps on aggregate character. Both need a smoothness
/// score; missing brake/throttle scores substitute a neutral 50.
pub fn compare_aggregate(
    (id_a, a): (&str, &LapCharacter),
    (id_b, b): (&str, &LapCharacter),
    config: &AggregateConfig,
) -> Option<AggregateComparison> {
    let score = |id: &str, c: &LapCharacter| -> Option<AggregateScore> {
        let smoothness = c.steering_smoothness?;
        let brake = c
            .brake_consistency
            .unwrap_or(config.missing_score_substitute);
        let throttle = c
            .throttle_confidence
            .unwrap_or(config.missing_score_substitute);
        Some(AggregateScore {
            vehicle: id.to_string(),
            steering_smoothness: smoothness,
            brake_consistency: brake,
            throttle_confidence: throttle,
            overall: (smoothness + brake + throttle) / 3.0,
        })
    };

    let score_a = score(id_a, a)?;
    let score_b = score(id_b, b)?;
    let winner = if score_a.overall > score_b.overall {
        score_a.vehicle.clone()
    } else {
        score_b.vehicle.clone()
    };
    let margin = (score_a.overall - score_b.overall).abs();
    Some(AggregateComparison {
        a: score_a,
        b: score_b,
        winner,
        margin,
    })
}
