// src/analysis/gradient.rs
//
// Behavioral corner classifier: given the same corner from two laps,
// decide whether the difference in steering texture is a correction
// (mistake), an intentional line choice, or a braking-style difference,
// with a confidence score and human-readable evidence.

use super::{Priority, Recommendation};
use crate::corners::CornerWindow;
use crate::signal::{differentiate, max_abs, std_sample};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub smoothing_window: usize,
    pub spikiness_ratio: f64,
    pub peak_grad_ratio: f64,
    pub mistake_confidence_divisor: f64,
    pub mistake_confidence_cap: f64,
    pub top_speed_bonus: f64,
    pub bonus_confidence_cap: f64,
    pub line_peak_diff: f64,
    pub line_std_band: f64,
    pub line_confidence_divisor: f64,
    pub line_confidence_cap: f64,
    pub brake_peak_diff: f64,
    pub brake_confidence_divisor: f64,
    pub brake_confidence_cap: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            spikiness_ratio: 2.0,          // spike must double the reference
            peak_grad_ratio: 1.5,          // and peak slope must be 1.5x
            mistake_confidence_divisor: 10.0,
            mistake_confidence_cap: 0.95,
            top_speed_bonus: 0.05,         // lost top speed corroborates a mistake
            bonus_confidence_cap: 0.98,
            line_peak_diff: 5.0,           // °/m between peak slopes
            line_std_band: 2.0,            // both sides still controlled
            line_confidence_divisor: 20.0,
            line_confidence_cap: 0.85,
            brake_peak_diff: 10.0,         // bar/m between brake slopes
            brake_confidence_divisor: 50.0,
            brake_confidence_cap: 0.80,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// What the corner pair revealed, attributed to one side where the
/// verdict is about a specific driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "classification", rename_all = "snake_case")]
pub enum Behavior {
    Normal,
    DriverMistake { vehicle: String },
    DifferentLine { vehicle: String },
    BrakeTechnique { vehicle: String },
}

impl Behavior {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::DriverMistake { .. } => "driver_mistake",
            Self::DifferentLine { .. } => "different_line",
            Self::BrakeTechnique { .. } => "brake_technique",
        }
    }

    pub fn attributed(&self) -> Option<&str> {
        match self {
            Self::Normal => None,
            Self::DriverMistake { vehicle }
            | Self::DifferentLine { vehicle }
            | Self::BrakeTechnique { vehicle } => Some(vehicle),
        }
    }

    pub fn is_mistake(&self) -> bool {
        matches!(self, Self::DriverMistake { .. })
    }
}

/// Full verdict for one corner pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerAssessment {
    #[serde(flatten)]
    pub behavior: Behavior,
    pub confidence: f64,
    pub description: String,
    pub evidence: Vec<String>,
}

impl CornerAssessment {
    fn normal() -> Self {
        Self {
            behavior: Behavior::Normal,
            confidence: 0.0,
            description: "Similar driving approach".to_string(),
            evidence: Vec::new(),
        }
    }
}

/// One side of a comparison: the window plus identity and the official
/// top speed for that lap when the timing table knows it.
#[derive(Debug, Clone, Copy)]
pub struct CornerSide<'a> {
    pub window: &'a CornerWindow,
    pub id: &'a str,
    pub top_speed: Option<f64>,
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct SteeringStats {
    /// Peak |dSteering| across the window.
    max_grad: f64,
    /// Sample std of |dSteering|.
    std_grad: f64,
    /// Peak |d²Steering|: corrections show up here.
    spikiness: f64,
}

fn steering_stats(window: &CornerWindow, smoothing_window: usize) -> Option<SteeringStats> {
    let steering = window.steering.as_ref()?;
    let d = differentiate(steering, smoothing_window);
    let abs_first: Vec<f64> = d.first.iter().map(|v| v.abs()).collect();
    Some(SteeringStats {
        max_grad: max_abs(&d.first),
        std_grad: std_sample(&abs_first),
        spikiness: max_abs(&d.second),
    })
}

fn brake_peak(window: &CornerWindow, smoothing_window: usize) -> Option<f64> {
    let brake = window.brake.as_ref()?;
    let d = differentiate(brake, smoothing_window);
    Some(max_abs(&d.first))
}

#[derive(Debug, Clone)]
struct SideMetrics<'a> {
    id: &'a str,
    top_speed: Option<f64>,
    steering: Option<SteeringStats>,
    brake_peak: Option<f64>,
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Classify one corner across two laps. A is conventionally the lap
/// under scrutiny, B the reference.
pub fn classify_corner_pair(
    a: CornerSide<'_>,
    b: CornerSide<'_>,
    config: &ClassifierConfig,
) -> CornerAssessment {
    let metrics_a = SideMetrics {
        id: a.id,
        top_speed: a.top_speed,
        steering: steering_stats(a.window, config.smoothing_window),
        brake_peak: brake_peak(a.window, config.smoothing_window),
    };
    let metrics_b = SideMetrics {
        id: b.id,
        top_speed: b.top_speed,
        steering: steering_stats(b.window, config.smoothing_window),
        brake_peak: brake_peak(b.window, config.smoothing_window),
    };

    let assessment = decide(&metrics_a, &metrics_b, config);
    debug!(
        verdict = assessment.behavior.label(),
        confidence = assessment.confidence,
        "classified corner pair {} vs {}",
        a.id,
        b.id
    );
    assessment
}

fn decide(a: &SideMetrics<'_>, b: &SideMetrics<'_>, config: &ClassifierConfig) -> CornerAssessment {
    // Without steering texture on both sides there is nothing to say,
    // and the brake overlay stays silent too.
    let (Some(sa), Some(sb)) = (a.steering, b.steering) else {
        return CornerAssessment::normal();
    };

    let mut assessment = if is_mistake(&sa, &sb, config) {
        build_mistake(a, &sa, &sb, config)
    } else if is_mistake(&sb, &sa, config) {
        build_mistake(b, &sb, &sa, config)
    } else if line_difference(&sa, &sb, config) {
        build_different_line(a, &sa, b, &sb, config)
    } else {
        CornerAssessment::normal()
    };

    // Brake overlay: refines a normal verdict, annotates a firm one.
    if let (Some(pa), Some(pb)) = (a.brake_peak, b.brake_peak) {
        let diff = (pa - pb).abs();
        if diff > config.brake_peak_diff {
            if assessment.behavior == Behavior::Normal {
                assessment = build_brake_technique(a, pa, b, pb, config);
            } else {
                assessment
                    .evidence
                    .push(format!("Brake difference detected: {pa:.2} vs {pb:.2} bar/m"));
            }
        }
    }

    // Top-speed corroboration for mistakes only
    let mistake_vehicle = match &assessment.behavior {
        Behavior::DriverMistake { vehicle } => Some(vehicle.clone()),
        _ => None,
    };
    if let (Some(vehicle), Some(ta), Some(tb)) = (mistake_vehicle, a.top_speed, b.top_speed) {
        let (mistake_speed, other_speed) = if vehicle == a.id { (ta, tb) } else { (tb, ta) };
        if mistake_speed < other_speed {
            assessment.confidence =
                (assessment.confidence + config.top_speed_bonus).min(config.bonus_confidence_cap);
        }
        assessment
            .evidence
            .push(format!("Top speed: {ta:.1} km/h vs {tb:.1} km/h"));
    }

    assessment
}

fn is_mistake(side: &SteeringStats, reference: &SteeringStats, config: &ClassifierConfig) -> bool {
    side.spikiness > config.spikiness_ratio * reference.spikiness
        && side.max_grad > config.peak_grad_ratio * reference.max_grad
}

fn line_difference(sa: &SteeringStats, sb: &SteeringStats, config: &ClassifierConfig) -> bool {
    (sa.max_grad - sb.max_grad).abs() > config.line_peak_diff
        && (sa.std_grad - sb.std_grad).abs() < config.line_std_band
}

// ── VERDICT BUILDERS ─────────────────────────────────────────────────

fn build_mistake(
    side: &SideMetrics<'_>,
    stats: &SteeringStats,
    ref_stats: &SteeringStats,
    config: &ClassifierConfig,
) -> CornerAssessment {
    let confidence = ((stats.spikiness / (ref_stats.spikiness + 1.0))
        / config.mistake_confidence_divisor)
        .min(config.mistake_confidence_cap);

    CornerAssessment {
        behavior: Behavior::DriverMistake {
            vehicle: side.id.to_string(),
        },
        confidence,
        description: format!(
            "{} made a driving mistake (steering correction detected)",
            side.id
        ),
        evidence: vec![
            format!(
                "Steering correction: {:.2} rate-of-change vs {:.2} on reference (2x higher)",
                stats.spikiness, ref_stats.spikiness
            ),
            format!(
                "Peak steering input: {:.2}°/m vs {:.2}°/m (1.5x higher)",
                stats.max_grad, ref_stats.max_grad
            ),
            "Indicates: Late braking or missed turn-in point requiring correction".to_string(),
        ],
    }
}

fn build_different_line(
    a: &SideMetrics<'_>,
    sa: &SteeringStats,
    b: &SideMetrics<'_>,
    sb: &SteeringStats,
    config: &ClassifierConfig,
) -> CornerAssessment {
    let (sharper, smoother) = if sa.max_grad > sb.max_grad {
        ((a, sa), (b, sb))
    } else {
        ((b, sb), (a, sa))
    };
    let diff = (sa.max_grad - sb.max_grad).abs();
    let confidence = (diff / config.line_confidence_divisor).min(config.line_confidence_cap);

    CornerAssessment {
        behavior: Behavior::DifferentLine {
            vehicle: smoother.0.id.to_string(),
        },
        confidence,
        description: format!(
            "{} using different racing line with sharper steering inputs vs {} smoother approach",
            sharper.0.id, smoother.0.id
        ),
        evidence: vec![
            format!(
                "Steering profile difference: {:.2}°/m vs {:.2}°/m",
                sharper.1.max_grad, smoother.1.max_grad
            ),
            format!(
                "Both controlled (similar variability: {:.2} vs {:.2})",
                sa.std_grad, sb.std_grad
            ),
            "Indicates: Intentional line choice, not a mistake".to_string(),
        ],
    }
}

fn build_brake_technique(
    a: &SideMetrics<'_>,
    peak_a: f64,
    b: &SideMetrics<'_>,
    peak_b: f64,
    config: &ClassifierConfig,
) -> CornerAssessment {
    let (sharper, smoother) = if peak_a > peak_b {
        ((a, peak_a), (b, peak_b))
    } else {
        ((b, peak_b), (a, peak_a))
    };
    let diff = (peak_a - peak_b).abs();
    let confidence = (diff / config.brake_confidence_divisor).min(config.brake_confidence_cap);

    CornerAssessment {
        behavior: Behavior::BrakeTechnique {
            vehicle: smoother.0.id.to_string(),
        },
        confidence,
        description: format!(
            "{} using sharper brake inputs vs {} progressive braking",
            sharper.0.id, smoother.0.id
        ),
        evidence: vec![
            format!(
                "Brake application: {:.2} bar/m vs {:.2} bar/m",
                sharper.1, smoother.1
            ),
            "Smoother braking typically yields better tire grip and corner entry stability"
                .to_string(),
        ],
    }
}

// ============================================================================
// RECOMMENDATIONS
// ============================================================================

/// Turn a lap's corner assessments into prioritized coaching notes for
/// one driver.
pub fn corner_recommendations(
    assessments: &[(String, CornerAssessment)],
    vehicle_id: &str,
) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    for (corner, assessment) in assessments {
        match &assessment.behavior {
            Behavior::DriverMistake { vehicle }
                if vehicle == vehicle_id && assessment.confidence > 0.7 =>
            {
                recs.push(Recommendation {
                    priority: Priority::High,
                    area: corner.clone(),
                    message: format!(
                        "Review {}: steering correction detected ({:.0}% confidence)",
                        corner,
                        assessment.confidence * 100.0
                    ),
                });
            }
            Behavior::DifferentLine { vehicle } if vehicle != vehicle_id => {
                recs.push(Recommendation {
                    priority: Priority::Medium,
                    area: corner.clone(),
                    message: format!(
                        "Compare lines through {}: the reference lap carries a smoother arc",
                        corner
                    ),
                });
            }
            Behavior::BrakeTechnique { vehicle } if vehicle != vehicle_id => {
                recs.push(Recommendation {
                    priority: Priority::Medium,
                    area: corner.clone(),
                    message: format!(
                        "Brake application into {} is abrupt; the reference trace builds pressure progressively",
                        corner
                    ),
                });
            }
            _ => {}
        }
    }
    if recs.is_empty() {
        recs.push(Recommendation {
            priority: Priority::Low,
            area: "overall".to_string(),
            message: "No recurring issues detected, maintain current approach".to_string(),
        });
    }
    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corners::CornerWindow;
    use proptest::prelude::*;

    fn window_from_steering(values: Vec<f64>) -> CornerWindow {
        let n = values.len();
        CornerWindow {
            distance: (0..n).map(|i| i as f64).collect(),
            steering: Some(values.into_iter().map(Some).collect()),
            brake: None,
            throttle: None,
            speed: None,
            time: None,
        }
    }

    fn smooth_sine(n: usize, amplitude: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * std::f64::consts::PI * 1.5 * i as f64 / n as f64).sin())
            .collect()
    }

    fn stats(max_grad: f64, std_grad: f64, spikiness: f64) -> SteeringStats {
        SteeringStats {
            max_grad,
            std_grad,
            spikiness,
        }
    }

    fn side<'a>(id: &'a str, steering: Option<SteeringStats>) -> SideMetrics<'a> {
        SideMetrics {
            id,
            top_speed: None,
            steering,
            brake_peak: None,
        }
    }

    #[test]
    fn test_spike_is_flagged_as_mistake_with_high_confidence() {
        let clean = smooth_sine(50, 5.0);
        let mut spiky = clean.clone();
        for v in spiky.iter_mut().skip(24).take(3) {
            *v = 25.0;
        }

        let win_a = window_from_steering(clean);
        let win_b = window_from_steering(spiky);
        let verdict = classify_corner_pair(
            CornerSide {
                window: &win_a,
                id: "CAR-A",
                top_speed: None,
            },
            CornerSide {
                window: &win_b,
                id: "CAR-B",
                top_speed: None,
            },
            &ClassifierConfig::default(),
        );

        assert_eq!(
            verdict.behavior,
            Behavior::DriverMistake {
                vehicle: "CAR-B".to_string()
            }
        );
        assert!(
            verdict.confidence > 0.75,
            "confidence {} too low",
            verdict.confidence
        );
        assert!(verdict.evidence[0].starts_with("Steering correction:"));
    }

    #[test]
    fn test_classification_is_antisymmetric() {
        let clean = smooth_sine(50, 5.0);
        let mut spiky = clean.clone();
        for v in spiky.iter_mut().skip(20).take(3) {
            *v = 22.0;
        }
        let win_clean = window_from_steering(clean);
        let win_spiky = window_from_steering(spiky);
        let config = ClassifierConfig::default();

        let forward = classify_corner_pair(
            CornerSide {
                window: &win_spiky,
                id: "X",
                top_speed: None,
            },
            CornerSide {
                window: &win_clean,
                id: "Y",
                top_speed: None,
            },
            &config,
        );
        let reversed = classify_corner_pair(
            CornerSide {
                window: &win_clean,
                id: "Y",
                top_speed: None,
            },
            CornerSide {
                window: &win_spiky,
                id: "X",
                top_speed: None,
            },
            &config,
        );

        assert_eq!(forward.behavior, reversed.behavior);
        assert!((forward.confidence - reversed.confidence).abs() < 1e-12);
    }

    #[test]
    fn test_identical_windows_are_normal() {
        let series = smooth_sine(40, 8.0);
        let win_a = window_from_steering(series.clone());
        let win_b = window_from_steering(series);
        let verdict = classify_corner_pair(
            CornerSide {
                window: &win_a,
                id: "A",
                top_speed: None,
            },
            CornerSide {
                window: &win_b,
                id: "B",
                top_speed: None,
            },
            &ClassifierConfig::default(),
        );
        assert_eq!(verdict.behavior, Behavior::Normal);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.description, "Similar driving approach");
    }

    #[test]
    fn test_missing_steering_short_circuits_brake_overlay() {
        // Brake difference alone must not classify when steering is absent
        let mut win_a = window_from_steering(vec![0.0; 10]);
        win_a.steering = None;
        win_a.brake = Some((0..10).map(|i| Some(i as f64 * 30.0)).collect());
        let mut win_b = window_from_steering(vec![0.0; 10]);
        win_b.steering = None;
        win_b.brake = Some(vec![Some(1.0); 10]);

        let verdict = classify_corner_pair(
            CornerSide {
                window: &win_a,
                id: "A",
                top_speed: None,
            },
            CornerSide {
                window: &win_b,
                id: "B",
                top_speed: None,
            },
            &ClassifierConfig::default(),
        );
        assert_eq!(verdict.behavior, Behavior::Normal);
        assert!(verdict.evidence.is_empty());
    }

    #[test]
    fn test_different_line_decision_table() {
        // Peaks 20 vs 12 with matching variability: a line choice, not
        // a mistake; attribution goes to the smoother side
        let config = ClassifierConfig::default();
        let a = side("A", Some(stats(20.0, 3.5, 4.0)));
        let b = side("B", Some(stats(12.0, 3.0, 3.0)));
        let verdict = decide(&a, &b, &config);

        assert_eq!(
            verdict.behavior,
            Behavior::DifferentLine {
                vehicle: "B".to_string()
            }
        );
        assert!((verdict.confidence - 0.4).abs() < 1e-12); // 8 / 20
        assert!(verdict.description.starts_with("A using different racing line"));
        assert!(verdict.evidence[0].contains("20.00°/m vs 12.00°/m"));
    }

    #[test]
    fn test_line_rule_needs_tight_variability() {
        let config = ClassifierConfig::default();
        let a = side("A", Some(stats(20.0, 8.0, 4.0)));
        let b = side("B", Some(stats(12.0, 3.0, 3.0)));
        assert_eq!(decide(&a, &b, &config).behavior, Behavior::Normal);
    }

    #[test]
    fn test_brake_overlay_refines_normal_verdict() {
        let config = ClassifierConfig::default();
        let mut a = side("A", Some(stats(5.0, 2.0, 1.0)));
        let mut b = side("B", Some(stats(5.5, 2.1, 1.1)));
        a.brake_peak = Some(26.0);
        b.brake_peak = Some(8.0);

        let verdict = decide(&a, &b, &config);
        assert_eq!(
            verdict.behavior,
            Behavior::BrakeTechnique {
                vehicle: "B".to_string()
            }
        );
        assert!((verdict.confidence - 0.36).abs() < 1e-12); // 18 / 50
        assert!(verdict.evidence[0].contains("26.00 bar/m vs 8.00 bar/m"));
    }

    #[test]
    fn test_brake_overlay_annotates_existing_verdict() {
        let config = ClassifierConfig::default();
        let mut a = side("A", Some(stats(30.0, 5.0, 50.0)));
        let mut b = side("B", Some(stats(4.0, 1.0, 2.0)));
        a.brake_peak = Some(40.0);
        b.brake_peak = Some(5.0);

        let verdict = decide(&a, &b, &config);
        assert!(verdict.behavior.is_mistake());
        assert!(verdict
            .evidence
            .iter()
            .any(|e| e.starts_with("Brake difference detected:")));
    }

    #[test]
    fn test_top_speed_bonus_applies_to_slower_mistake_side() {
        let config = ClassifierConfig::default();
        let mut a = side("A", Some(stats(30.0, 5.0, 50.0)));
        let mut b = side("B", Some(stats(4.0, 1.0, 2.0)));
        a.top_speed = Some(150.0);
        b.top_speed = Some(161.3);

        let verdict = decide(&a, &b, &config);
        assert!(verdict.behavior.is_mistake());
        // base: min((50 / 3) / 10, 0.95) = 0.95, bonus capped at 0.98
        assert!((verdict.confidence - 0.98).abs() < 1e-12);
        assert!(verdict
            .evidence
            .iter()
            .any(|e| e == "Top speed: 150.0 km/h vs 161.3 km/h"));
    }

    #[test]
    fn test_recommendations_cover_all_verdicts() {
        let assessments = vec![
            (
                "T1".to_string(),
                CornerAssessment {
                    behavior: Behavior::DriverMistake {
                        vehicle: "ME".to_string(),
                    },
                    confidence: 0.9,
                    description: String::new(),
                    evidence: vec![],
                },
            ),
            (
                "T4".to_string(),
                CornerAssessment {
                    behavior: Behavior::DifferentLine {
                        vehicle: "REF".to_string(),
                    },
                    confidence: 0.4,
                    description: String::new(),
                    evidence: vec![],
                },
            ),
        ];
        let recs = corner_recommendations(&assessments, "ME");
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].priority, Priority::High);
        assert!(recs[0].message.contains("T1"));
        assert_eq!(recs[1].priority, Priority::Medium);

        let clean = corner_recommendations(&[], "ME");
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].priority, Priority::Low);
    }

    proptest! {
        #[test]
        fn prop_confidence_stays_within_bounds(
            max_a in 0.0..500.0f64,
            std_a in 0.0..50.0f64,
            spik_a in 0.0..500.0f64,
            max_b in 0.0..500.0f64,
            std_b in 0.0..50.0f64,
            spik_b in 0.0..500.0f64,
            brake_a in proptest::option::of(0.0..300.0f64),
            brake_b in proptest::option::of(0.0..300.0f64),
            top_a in proptest::option::of(80.0..200.0f64),
            top_b in proptest::option::of(80.0..200.0f64),
        ) {
            let config = ClassifierConfig::default();
            let mut a = side("A", Some(stats(max_a, std_a, spik_a)));
            let mut b = side("B", Some(stats(max_b, std_b, spik_b)));
            a.brake_peak = brake_a;
            b.brake_peak = brake_b;
            a.top_speed = top_a;
            b.top_speed = top_b;

            let verdict = decide(&a, &b, &config);
            prop_assert!(verdict.confidence >= 0.0);
            prop_assert!(verdict.confidence <= 0.98);
        }
    }
}
