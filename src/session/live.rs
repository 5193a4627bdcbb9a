// src/session/live.rs
//
// Lap-by-lap session engine. The first processed lap seeds per-corner
// baseline windows and the reference time; every later lap is classified
// corner-by-corner against those baselines, personal bests re-base them,
// and rolling consistency scores raise alerts when a corner degrades.
//
// Single entry point: call process_telemetry() (or process_lap_file())
// once per completed lap, in lap order.

use super::state::{
    Alert, AlertSeverity, CornerBaseline, CornerHistoryEntry, CornerScore, CornerSnapshot,
    LapTimeEntry, SessionPhase, SessionSnapshot,
};
use crate::analysis::consistency::corner_smoothness;
use crate::analysis::gradient::{classify_corner_pair, CornerAssessment, CornerSide};
use crate::analysis::trend::{
    classify_corner_trend, classify_lap_time_trend, ConsistencyTrend, TrendAssessment,
};
use crate::config::AnalysisConfig;
use crate::corners::{extract_corner_window, CornerWindow};
use crate::error::LapProcessError;
use crate::signal::{compact, gradient, mean, mean_abs, std_pop, std_sample};
use crate::telemetry::LapTelemetry;
use crate::time_delta::estimate_lap_time;
use crate::timing::{FlagCode, TimingTable};
use crate::track::TrackLayout;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use tracing::{debug, info, warn};

// ============================================================================
// INPUT / OUTPUT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LapReport {
    pub lap: u32,
    #[serde(flatten)]
    pub outcome: LapOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LapOutcome {
    /// Lap ran under full-course yellow; nothing was recorded.
    Skipped { flag: FlagCode },
    /// First processed lap, now the reference.
    Baseline {
        corners_recorded: usize,
        reference_time_s: Option<f64>,
    },
    Comparison {
        delta_to_reference_s: Option<f64>,
        top_speed_delta_kph: Option<f64>,
        corners: Vec<CornerReport>,
        alerts: Vec<Alert>,
        new_reference: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CornerReport {
    pub corner: String,
    #[serde(flatten)]
    pub assessment: CornerAssessment,
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    pub phase: SessionPhase,
    pub track: String,
    pub laps_processed: u32,
    pub reference_lap: Option<u32>,
    pub reference_time_s: Option<f64>,
    pub lap_times: Vec<LapTimeEntry>,
    pub lap_time_stats: Option<LapTimeStats>,
    pub trend: Option<TrendAssessment>,
    /// Corners scoring below the problem threshold, worst first.
    pub problem_corners: Vec<SummaryCorner>,
    /// Corners at or above the good threshold, best first.
    pub good_corners: Vec<SummaryCorner>,
    pub reference_metrics: Option<ReferenceLapMetrics>,
    pub alert_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LapTimeStats {
    pub valid_laps: usize,
    pub fastest_s: f64,
    pub slowest_s: f64,
    pub mean_s: f64,
    pub std_s: f64,
    pub range_s: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryCorner {
    pub corner: String,
    pub score: f64,
    pub trend: ConsistencyTrend,
}

/// Full-lap channel metrics of the reference lap.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceLapMetrics {
    pub steering_smoothness: Option<f64>,
    pub steering_variability: Option<f64>,
    pub full_throttle_pct: Option<f64>,
    pub mean_throttle: Option<f64>,
    pub brake_consistency: Option<f64>,
}

// ============================================================================
// ANALYZER
// ============================================================================

pub struct LiveSessionAnalyzer {
    config: AnalysisConfig,
    layout: TrackLayout,
    timing: Option<TimingTable>,
    vehicle: Option<String>,
    phase: SessionPhase,
    started_at: DateTime<Utc>,
    laps_processed: u32,
    reference_lap: Option<u32>,
    reference_time_s: Option<f64>,
    reference: Option<LapTelemetry>,
    baselines: HashMap<String, CornerBaseline>,
    histories: HashMap<String, VecDeque<CornerHistoryEntry>>,
    consistency: HashMap<String, CornerScore>,
    lap_times: Vec<LapTimeEntry>,
    alerts: Vec<Alert>,
}

struct ComparedCorner {
    name: String,
    window: CornerWindow,
    assessment: CornerAssessment,
}

impl LiveSessionAnalyzer {
    pub fn new(layout: TrackLayout, config: AnalysisConfig) -> Self {
        Self {
            config,
            layout,
            timing: None,
            vehicle: None,
            phase: SessionPhase::AwaitingBaseline,
            started_at: Utc::now(),
            laps_processed: 0,
            reference_lap: None,
            reference_time_s: None,
            reference: None,
            baselines: HashMap::new(),
            histories: HashMap::new(),
            consistency: HashMap::new(),
            lap_times: Vec::new(),
            alerts: Vec::new(),
        }
    }

    /// Attach the official timing table; lap times and flags for
    /// `vehicle_id` then take precedence over telemetry estimates.
    pub fn with_timing(mut self, timing: TimingTable, vehicle_id: &str) -> Self {
        self.timing = Some(timing);
        self.vehicle = Some(vehicle_id.to_string());
        self
    }

    /// Load one lap file and process it. A load failure leaves the
    /// session untouched.
    pub fn process_lap_file(&mut self, path: &Path, lap: u32) -> Result<LapReport, LapProcessError> {
        let telemetry =
            LapTelemetry::from_csv(path).map_err(|source| LapProcessError { lap, source })?;
        Ok(self.process_telemetry(telemetry, lap))
    }

    /// Process one completed lap.
    pub fn process_telemetry(&mut self, telemetry: LapTelemetry, lap: u32) -> LapReport {
        // Full-course yellow laps never touch state, not even the lap
        // counter.
        if let (Some(timing), Some(vehicle)) = (&self.timing, self.vehicle.as_deref()) {
            if timing.flag(vehicle, lap) == Some(FlagCode::FullCourseYellow) {
                info!(lap, "lap ran under FCY, skipped");
                return LapReport {
                    lap,
                    outcome: LapOutcome::Skipped {
                        flag: FlagCode::FullCourseYellow,
                    },
                };
            }
        }

        if self.phase == SessionPhase::Complete {
            warn!(lap, "lap received after session end, processing anyway");
        }

        match self.phase {
            SessionPhase::AwaitingBaseline => self.process_baseline(telemetry, lap),
            SessionPhase::Tracking | SessionPhase::Complete => {
                self.process_comparison(telemetry, lap)
            }
        }
    }

    fn process_baseline(&mut self, telemetry: LapTelemetry, lap: u32) -> LapReport {
        let mut corners_recorded = 0;
        for corner in &self.layout.corners {
            let Some(window) =
                extract_corner_window(&telemetry, corner.apex_dist_m, &self.config.window)
            else {
                debug!(lap, corner = corner.name.as_str(), "no baseline window");
                continue;
            };
            let mut history = VecDeque::new();
            history.push_back(CornerHistoryEntry {
                lap,
                smoothness: corner_smoothness(&window),
                classification: None,
                confidence: None,
            });
            self.histories.insert(corner.name.clone(), history);
            self.baselines
                .insert(corner.name.clone(), CornerBaseline { lap, window });
            corners_recorded += 1;
        }

        let reference_time = self.resolve_lap_time(&telemetry, lap);
        self.reference_lap = Some(lap);
        self.reference_time_s = reference_time;
        self.reference = Some(telemetry);
        self.lap_times.push(LapTimeEntry {
            lap,
            time_s: reference_time,
        });
        self.laps_processed = 1;
        self.phase = SessionPhase::Tracking;
        info!(
            lap,
            corners_recorded,
            reference_time_s = reference_time,
            "🏁 baseline lap recorded"
        );

        LapReport {
            lap,
            outcome: LapOutcome::Baseline {
                corners_recorded,
                reference_time_s: reference_time,
            },
        }
    }

    fn process_comparison(&mut self, telemetry: LapTelemetry, lap: u32) -> LapReport {
        // ════════════════════════════════════════════════════════════════
        // 1. LAP TIME
        // ════════════════════════════════════════════════════════════════
        let current_time = self.resolve_lap_time(&telemetry, lap);

        // ════════════════════════════════════════════════════════════════
        // 2. CLASSIFY AGAINST THE CURRENT BASELINES (no mutation yet)
        // ════════════════════════════════════════════════════════════════
        let current_label = format!("Lap {lap}");
        let reference_label = match self.reference_lap {
            Some(reference) => format!("Lap {reference}"),
            None => "reference".to_string(),
        };

        let mut compared = Vec::new();
        for corner in &self.layout.corners {
            let Some(baseline) = self.baselines.get(&corner.name) else {
                continue;
            };
            let Some(window) =
                extract_corner_window(&telemetry, corner.apex_dist_m, &self.config.window)
            else {
                debug!(lap, corner = corner.name.as_str(), "no window this lap");
                continue;
            };
            let assessment = classify_corner_pair(
                CornerSide {
                    window: &window,
                    id: &current_label,
                    top_speed: None,
                },
                CornerSide {
                    window: &baseline.window,
                    id: &reference_label,
                    top_speed: None,
                },
                &self.config.classifier,
            );
            compared.push(ComparedCorner {
                name: corner.name.clone(),
                window,
                assessment,
            });
        }

        // ════════════════════════════════════════════════════════════════
        // 3. HISTORY + MISTAKE ALERTS (mutation, corner-definition order)
        // ════════════════════════════════════════════════════════════════
        let mut lap_alerts = Vec::new();
        for compared_corner in &compared {
            let entry = CornerHistoryEntry {
                lap,
                smoothness: corner_smoothness(&compared_corner.window),
                classification: Some(compared_corner.assessment.behavior.label().to_string()),
                confidence: Some(compared_corner.assessment.confidence),
            };
            let history = self.histories.entry(compared_corner.name.clone()).or_default();
            if history.len() == self.config.session.history_cap {
                history.pop_front();
            }
            history.push_back(entry);

            let assessment = &compared_corner.assessment;
            if assessment.behavior.is_mistake()
                && assessment.confidence > self.config.session.mistake_alert_confidence
            {
                let alert = Alert::Mistake {
                    lap,
                    corner: compared_corner.name.clone(),
                    confidence: assessment.confidence,
                    message: assessment.description.clone(),
                };
                if !self.alerts.contains(&alert) {
                    warn!(
                        lap,
                        corner = compared_corner.name.as_str(),
                        confidence = assessment.confidence,
                        "🚨 {}",
                        assessment.description
                    );
                    self.alerts.push(alert.clone());
                    lap_alerts.push(alert);
                }
            }
        }

        // ════════════════════════════════════════════════════════════════
        // 4. DELTAS TO THE (STILL OLD) REFERENCE
        // ════════════════════════════════════════════════════════════════
        let delta_to_reference_s = match (current_time, self.reference_time_s) {
            (Some(current), Some(reference)) => Some(current - reference),
            _ => None,
        };
        let reference_top_speed = self
            .reference_lap
            .and_then(|reference| self.official_top_speed(reference));
        let top_speed_delta_kph = match (self.official_top_speed(lap), reference_top_speed) {
            (Some(current), Some(reference)) => Some(current - reference),
            _ => None,
        };

        // ════════════════════════════════════════════════════════════════
        // 5. NEW BEST → RE-BASE; UNKNOWN REFERENCE TIME → ADOPT
        // ════════════════════════════════════════════════════════════════
        let mut new_reference = false;
        match (current_time, self.reference_time_s) {
            (Some(current), Some(reference)) if current < reference => {
                info!(
                    lap,
                    current_s = current,
                    previous_s = reference,
                    "new best lap, re-basing corner baselines"
                );
                self.reference_lap = Some(lap);
                self.reference_time_s = Some(current);
                for corner in &self.layout.corners {
                    if let Some(window) =
                        extract_corner_window(&telemetry, corner.apex_dist_m, &self.config.window)
                    {
                        self.baselines
                            .insert(corner.name.clone(), CornerBaseline { lap, window });
                    }
                }
                self.reference = Some(telemetry);
                new_reference = true;
            }
            (Some(current), None) => {
                // The baseline lap never produced a time. Adopt this
                // lap's time and identity; the stored corner baselines
                // stay as they are.
                info!(lap, time_s = current, "reference time adopted");
                self.reference_lap = Some(lap);
                self.reference_time_s = Some(current);
                new_reference = true;
            }
            _ => {}
        }

        // ════════════════════════════════════════════════════════════════
        // 6. BOOKKEEPING + ROLLING CONSISTENCY
        // ════════════════════════════════════════════════════════════════
        self.lap_times.push(LapTimeEntry {
            lap,
            time_s: current_time,
        });
        self.laps_processed += 1;
        if self.laps_processed >= self.config.session.consistency_refresh_after {
            lap_alerts.extend(self.refresh_consistency());
        }

        let corners = compared
            .into_iter()
            .map(|compared_corner| CornerReport {
                corner: compared_corner.name,
                assessment: compared_corner.assessment,
            })
            .collect();
        LapReport {
            lap,
            outcome: LapOutcome::Comparison {
                delta_to_reference_s,
                top_speed_delta_kph,
                corners,
                alerts: lap_alerts,
                new_reference,
            },
        }
    }

    /// Recompute per-corner consistency scores from the histories and
    /// raise alerts for corners that are degrading with mistakes.
    fn refresh_consistency(&mut self) -> Vec<Alert> {
        let mut new_alerts = Vec::new();
        for corner in &self.layout.corners {
            let Some(history) = self.histories.get(&corner.name) else {
                continue;
            };
            let smoothness: Vec<f64> = history.iter().filter_map(|entry| entry.smoothness).collect();
            if smoothness.len() < self.config.session.consistency_min_values {
                continue;
            }

            let smoothness_mean = mean(&smoothness);
            let cv = if smoothness_mean > 0.0 {
                std_pop(&smoothness) / smoothness_mean * 100.0
            } else {
                0.0
            };
            let score = (100.0 / (1.0 + cv / self.config.consistency.cv_scale)).clamp(0.0, 100.0);
            let trend = classify_corner_trend(
                &smoothness,
                self.config.session.corner_declining_ratio,
                self.config.session.corner_improving_ratio,
            );
            self.consistency.insert(
                corner.name.clone(),
                CornerScore {
                    score,
                    laps_analyzed: smoothness.len(),
                    trend,
                },
            );

            if score < self.config.session.consistency_alert_below
                && trend == ConsistencyTrend::Declining
            {
                let recent_mistakes = history
                    .iter()
                    .rev()
                    .take(self.config.session.recent_mistake_window)
                    .filter(|entry| entry.classification.as_deref() == Some("driver_mistake"))
                    .count();
                if recent_mistakes >= self.config.session.recent_mistake_min {
                    let alert = Alert::Consistency {
                        corner: corner.name.clone(),
                        severity: AlertSeverity::High,
                        message: format!(
                            "Consistency declining in {} with repeated mistakes",
                            corner.name
                        ),
                    };
                    if !self.alerts.contains(&alert) {
                        warn!(
                            corner = corner.name.as_str(),
                            score, "🚨 corner consistency degrading"
                        );
                        self.alerts.push(alert.clone());
                        new_alerts.push(alert);
                    }
                }
            }
        }
        new_alerts
    }

    fn resolve_lap_time(&self, telemetry: &LapTelemetry, lap: u32) -> Option<f64> {
        if let (Some(timing), Some(vehicle)) = (&self.timing, self.vehicle.as_deref()) {
            if let Some(time) = timing.lap_time(vehicle, lap) {
                return Some(time);
            }
        }
        estimate_lap_time(telemetry)
    }

    fn official_top_speed(&self, lap: u32) -> Option<f64> {
        let timing = self.timing.as_ref()?;
        let vehicle = self.vehicle.as_deref()?;
        timing.record(vehicle, lap)?.top_speed
    }

    // ── SUMMARY ──────────────────────────────────────────────────────────

    pub fn session_summary(&self) -> SessionSummary {
        let session = &self.config.session;
        let valid: Vec<f64> = self
            .lap_times
            .iter()
            .filter_map(|entry| entry.time_s)
            .filter(|time| time.is_finite() && *time > 0.0)
            .collect();

        let lap_time_stats = if valid.len() >= 2 {
            let mean_s = mean(&valid);
            let std_s = std_sample(&valid);
            let cv = if mean_s > 0.0 { std_s / mean_s * 100.0 } else { 0.0 };
            let fastest_s = valid.iter().copied().fold(f64::INFINITY, f64::min);
            let slowest_s = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Some(LapTimeStats {
                valid_laps: valid.len(),
                fastest_s,
                slowest_s,
                mean_s,
                std_s,
                range_s: slowest_s - fastest_s,
                score: (100.0 / (1.0 + cv / self.config.consistency.cv_scale)).clamp(0.0, 100.0),
            })
        } else {
            None
        };

        let mut problem_corners = Vec::new();
        let mut good_corners = Vec::new();
        for corner in &self.layout.corners {
            let Some(score) = self.consistency.get(&corner.name) else {
                continue;
            };
            let entry = SummaryCorner {
                corner: corner.name.clone(),
                score: score.score,
                trend: score.trend,
            };
            if score.score < session.summary_problem_below {
                problem_corners.push(entry);
            } else if score.score >= session.summary_good_at_least {
                good_corners.push(entry);
            }
        }
        problem_corners.sort_by(|a, b| a.score.total_cmp(&b.score));
        good_corners.sort_by(|a, b| b.score.total_cmp(&a.score));

        SessionSummary {
            started_at: self.started_at,
            phase: self.phase,
            track: self.layout.name.clone(),
            laps_processed: self.laps_processed,
            reference_lap: self.reference_lap,
            reference_time_s: self.reference_time_s,
            lap_times: self.lap_times.clone(),
            lap_time_stats,
            trend: classify_lap_time_trend(&valid, session.summary_trend_tolerance),
            problem_corners,
            good_corners,
            reference_metrics: self
                .reference
                .as_ref()
                .map(|lap| reference_lap_metrics(lap, &self.config)),
            alert_count: self.alerts.len(),
        }
    }

    /// Mark the session complete and return the final summary.
    pub fn end_session(&mut self) -> SessionSummary {
        self.phase = SessionPhase::Complete;
        info!(
            laps = self.laps_processed,
            alerts = self.alerts.len(),
            "session ended"
        );
        self.session_summary()
    }

    // ── PERSISTENCE / ACCESSORS ──────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        let corners = self
            .layout
            .corners
            .iter()
            .filter_map(|corner| {
                let history = self.histories.get(&corner.name)?;
                Some(CornerSnapshot {
                    corner: corner.name.clone(),
                    baseline_lap: self.baselines.get(&corner.name).map(|b| b.lap),
                    history: history.iter().cloned().collect(),
                    consistency: self.consistency.get(&corner.name).cloned(),
                })
            })
            .collect();

        SessionSnapshot {
            phase: self.phase,
            track: self.layout.name.clone(),
            vehicle: self.vehicle.clone(),
            started_at: self.started_at,
            laps_processed: self.laps_processed,
            reference_lap: self.reference_lap,
            reference_time_s: self.reference_time_s,
            lap_times: self.lap_times.clone(),
            corners,
            alerts: self.alerts.clone(),
        }
    }

    pub fn save_snapshot(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)
            .with_context(|| format!("writing session snapshot to {}", path.display()))?;
        Ok(())
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn laps_processed(&self) -> u32 {
        self.laps_processed
    }
}

/// Full-lap channel metrics of one lap, for the session summary.
fn reference_lap_metrics(lap: &LapTelemetry, config: &AnalysisConfig) -> ReferenceLapMetrics {
    let session = &config.session;

    let steering: Vec<f64> = lap.steering.as_deref().map(compact).unwrap_or_default();
    let (steering_smoothness, steering_variability) = if steering.len() >= 2 {
        let roughness = mean_abs(&gradient(&steering));
        (
            Some((100.0 - roughness * session.smoothness_scale).max(0.0)),
            Some(std_sample(&steering)),
        )
    } else {
        (None, None)
    };

    let throttle: Vec<f64> = lap.throttle.as_deref().map(compact).unwrap_or_default();
    let (full_throttle_pct, mean_throttle) = if throttle.is_empty() {
        (None, None)
    } else {
        let full = throttle
            .iter()
            .filter(|v| **v > config.aggregate.full_throttle_threshold)
            .count();
        (
            Some(full as f64 / throttle.len() as f64 * 100.0),
            Some(mean(&throttle)),
        )
    };

    let brake: Vec<f64> = lap.brake.as_deref().map(compact).unwrap_or_default();
    let brake_consistency = if brake.len() >= 2 {
        Some((100.0 - std_sample(&brake) * session.brake_std_scale).max(0.0))
    } else {
        None
    };

    ReferenceLapMetrics {
        steering_smoothness,
        steering_variability,
        full_throttle_pct,
        mean_throttle,
        brake_consistency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::gradient::Behavior;
    use crate::analysis::trend::LapTimeTrend;
    use crate::telemetry::Channel;
    use crate::track::{CornerDefinition, CornerKind};
    use approx::assert_relative_eq;
    use std::io::Write;

    fn track_one_corner() -> TrackLayout {
        TrackLayout {
            name: "Test Ring".into(),
            sectors: vec![],
            corners: vec![CornerDefinition {
                name: "T1".into(),
                apex_dist_m: 500.0,
                kind: CornerKind::Medium,
                sector: None,
            }],
        }
    }

    /// 41 rows over 400..600 m. Identical steering every lap; brake is
    /// either a progressive ramp or an abrupt step.
    fn brake_lap(step_brake: bool, lap_seconds: f64) -> LapTelemetry {
        let n = 41;
        let distance: Channel = (0..n).map(|i| Some(400.0 + i as f64 * 5.0)).collect();
        let steering: Channel = (0..n).map(|i| Some((i as f64 * 0.3).sin() * 8.0)).collect();
        let brake: Channel = (0..n)
            .map(|i| {
                Some(if step_brake {
                    if i < 20 {
                        0.0
                    } else {
                        40.0
                    }
                } else {
                    i as f64
                })
            })
            .collect();
        let time: Channel = (0..n)
            .map(|i| Some(i as f64 * lap_seconds / 40.0))
            .collect();
        LapTelemetry::from_columns(vec![
            ("lapdist_dls".to_string(), distance),
            ("steering_angle".to_string(), steering),
            ("pbrake_f".to_string(), brake),
            ("timestamp".to_string(), time),
        ])
    }

    /// Steering-only lap with a rectangular correction of the given
    /// amplitude mid-corner. No time channel, so lap times stay unknown.
    fn spike_lap(spike_amplitude: f64) -> LapTelemetry {
        let n = 41;
        let distance: Channel = (0..n).map(|i| Some(400.0 + i as f64 * 5.0)).collect();
        let steering: Channel = (0..n)
            .map(|i| {
                let base = (i as f64 * 0.3).sin() * 2.0;
                let spike = if (18..22).contains(&i) {
                    spike_amplitude
                } else {
                    0.0
                };
                Some(base + spike)
            })
            .collect();
        LapTelemetry::from_columns(vec![
            ("lapdist_dls".to_string(), distance),
            ("steering_angle".to_string(), steering),
        ])
    }

    #[test]
    fn test_first_lap_becomes_the_baseline() {
        let mut analyzer = LiveSessionAnalyzer::new(track_one_corner(), AnalysisConfig::default());
        assert_eq!(analyzer.phase(), SessionPhase::AwaitingBaseline);

        let report = analyzer.process_telemetry(brake_lap(false, 90.0), 1);
        match report.outcome {
            LapOutcome::Baseline {
                corners_recorded,
                reference_time_s,
            } => {
                assert_eq!(corners_recorded, 1);
                assert_relative_eq!(reference_time_s.unwrap(), 90.0, epsilon = 1e-9);
            }
            other => panic!("expected baseline outcome, got {other:?}"),
        }
        assert_eq!(analyzer.phase(), SessionPhase::Tracking);

        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.corners.len(), 1);
        assert_eq!(snapshot.corners[0].history.len(), 1);
        assert_eq!(snapshot.corners[0].history[0].classification, None);
    }

    #[test]
    fn test_session_flags_abrupt_braking_from_lap_two() {
        let mut analyzer = LiveSessionAnalyzer::new(track_one_corner(), AnalysisConfig::default());
        analyzer.process_telemetry(brake_lap(false, 90.0), 1);

        for lap in 2..=5 {
            let report = analyzer.process_telemetry(brake_lap(true, 89.0 + lap as f64), lap);
            let LapOutcome::Comparison {
                corners,
                new_reference,
                delta_to_reference_s,
                ..
            } = report.outcome
            else {
                panic!("expected comparison for lap {lap}");
            };
            assert!(!new_reference);
            assert_relative_eq!(
                delta_to_reference_s.unwrap(),
                (lap - 1) as f64,
                epsilon = 1e-9
            );
            assert_eq!(corners.len(), 1);
            let assessment = &corners[0].assessment;
            assert_eq!(
                assessment.behavior,
                Behavior::BrakeTechnique {
                    vehicle: "Lap 1".to_string()
                }
            );
            assert!(
                assessment.confidence > 0.25 && assessment.confidence < 0.40,
                "confidence {}",
                assessment.confidence
            );
        }
        // Brake-technique differences are not mistakes; no alerts.
        assert!(analyzer.alerts().is_empty());

        let summary = analyzer.end_session();
        assert_eq!(summary.phase, SessionPhase::Complete);
        assert_eq!(summary.laps_processed, 5);
        assert_eq!(summary.reference_lap, Some(1));

        let stats = summary.lap_time_stats.unwrap();
        assert_eq!(stats.valid_laps, 5);
        assert_relative_eq!(stats.fastest_s, 90.0, epsilon = 1e-9);
        assert_relative_eq!(stats.slowest_s, 94.0, epsilon = 1e-9);
        assert_relative_eq!(stats.mean_s, 92.0, epsilon = 1e-9);
        assert_eq!(summary.trend.unwrap().trend, LapTimeTrend::Deteriorating);

        // Identical steering every lap → perfectly consistent corner.
        assert_eq!(summary.good_corners.len(), 1);
        assert!(summary.problem_corners.is_empty());

        let metrics = summary.reference_metrics.unwrap();
        assert!(metrics.steering_smoothness.unwrap() > 0.0);
        assert!(metrics.full_throttle_pct.is_none());
        // Ramp 0..40 bar: sample std 11.98 → 100 - 2*std
        assert_relative_eq!(metrics.brake_consistency.unwrap(), 76.04, epsilon = 0.05);
    }

    fn timing_with_fcy() -> TimingTable {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "NUMBER;LAP_NUMBER;LAP_TIME;FLAG_AT_FL").unwrap();
        writeln!(file, "13;1;1:30.000;GF").unwrap();
        writeln!(file, "13;2;1:31.000;FCY").unwrap();
        writeln!(file, "13;3;1:31.500;GF").unwrap();
        file.flush().unwrap();
        TimingTable::load(file.path()).unwrap()
    }

    #[test]
    fn test_full_course_yellow_lap_mutates_nothing() {
        let mut analyzer = LiveSessionAnalyzer::new(track_one_corner(), AnalysisConfig::default())
            .with_timing(timing_with_fcy(), "13");

        analyzer.process_telemetry(brake_lap(false, 90.0), 1);
        let before = analyzer.snapshot();
        assert_relative_eq!(before.reference_time_s.unwrap(), 90.0, epsilon = 1e-9);

        let report = analyzer.process_telemetry(brake_lap(true, 91.0), 2);
        assert!(matches!(
            report.outcome,
            LapOutcome::Skipped {
                flag: FlagCode::FullCourseYellow
            }
        ));

        let after = analyzer.snapshot();
        assert_eq!(after.laps_processed, before.laps_processed);
        assert_eq!(after.lap_times, before.lap_times);
        assert_eq!(after.corners[0].history.len(), 1);
        assert!(after.alerts.is_empty());

        // The next green lap processes normally.
        let report = analyzer.process_telemetry(brake_lap(true, 91.5), 3);
        assert!(matches!(report.outcome, LapOutcome::Comparison { .. }));
        assert_eq!(analyzer.laps_processed(), 2);
    }

    #[test]
    fn test_faster_lap_becomes_the_new_reference() {
        let mut analyzer = LiveSessionAnalyzer::new(track_one_corner(), AnalysisConfig::default());
        analyzer.process_telemetry(brake_lap(false, 92.0), 1);

        let report = analyzer.process_telemetry(brake_lap(true, 90.0), 2);
        let LapOutcome::Comparison {
            new_reference,
            delta_to_reference_s,
            corners,
            ..
        } = report.outcome
        else {
            panic!("expected comparison");
        };
        assert!(new_reference);
        assert_relative_eq!(delta_to_reference_s.unwrap(), -2.0, epsilon = 1e-9);
        // Classified against the old baseline before re-basing.
        assert_eq!(corners[0].assessment.behavior.label(), "brake_technique");

        // Lap 3 brakes exactly like the new reference → nothing to report.
        let report = analyzer.process_telemetry(brake_lap(true, 91.0), 3);
        let LapOutcome::Comparison {
            corners,
            new_reference,
            ..
        } = report.outcome
        else {
            panic!("expected comparison");
        };
        assert!(!new_reference);
        assert_eq!(corners[0].assessment.behavior, Behavior::Normal);

        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.reference_lap, Some(2));
        assert_eq!(snapshot.corners[0].baseline_lap, Some(2));
        assert_relative_eq!(snapshot.reference_time_s.unwrap(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reference_time_adoption_keeps_baselines() {
        let mut analyzer = LiveSessionAnalyzer::new(track_one_corner(), AnalysisConfig::default());
        analyzer.process_telemetry(spike_lap(0.0), 1);
        assert_eq!(analyzer.snapshot().reference_time_s, None);

        let report = analyzer.process_telemetry(brake_lap(false, 90.0), 2);
        let LapOutcome::Comparison {
            new_reference,
            delta_to_reference_s,
            ..
        } = report.outcome
        else {
            panic!("expected comparison");
        };
        assert!(new_reference);
        assert_eq!(delta_to_reference_s, None);

        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.reference_lap, Some(2));
        assert_relative_eq!(snapshot.reference_time_s.unwrap(), 90.0, epsilon = 1e-9);
        // Adoption does not swap the stored corner baselines.
        assert_eq!(snapshot.corners[0].baseline_lap, Some(1));
    }

    #[test]
    fn test_declining_corner_raises_one_consistency_alert() {
        let mut analyzer = LiveSessionAnalyzer::new(track_one_corner(), AnalysisConfig::default());
        analyzer.process_telemetry(spike_lap(0.0), 1);
        for (lap, amplitude) in [(2, 10.0), (3, 20.0), (4, 35.0), (5, 60.0), (6, 80.0)] {
            analyzer.process_telemetry(spike_lap(amplitude), lap);
        }

        let consistency_alerts = analyzer
            .alerts()
            .iter()
            .filter(|alert| matches!(alert, Alert::Consistency { .. }))
            .count();
        assert_eq!(consistency_alerts, 1, "alerts: {:?}", analyzer.alerts());

        let mistake_alerts = analyzer
            .alerts()
            .iter()
            .filter(|alert| matches!(alert, Alert::Mistake { .. }))
            .count();
        assert!(mistake_alerts >= 1);

        let summary = analyzer.session_summary();
        assert_eq!(summary.problem_corners.len(), 1);
        assert_eq!(summary.problem_corners[0].trend, ConsistencyTrend::Declining);
        assert_eq!(summary.alert_count, analyzer.alerts().len());
    }

    #[test]
    fn test_identical_sessions_produce_identical_state() {
        let run = || {
            let mut analyzer =
                LiveSessionAnalyzer::new(track_one_corner(), AnalysisConfig::default());
            analyzer.process_telemetry(brake_lap(false, 90.0), 1);
            analyzer.process_telemetry(brake_lap(true, 91.0), 2);
            analyzer.process_telemetry(spike_lap(30.0), 3);
            let mut snapshot = serde_json::to_value(analyzer.snapshot()).unwrap();
            snapshot.as_object_mut().unwrap().remove("started_at");
            snapshot
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_load_failure_leaves_session_untouched() {
        let mut analyzer = LiveSessionAnalyzer::new(track_one_corner(), AnalysisConfig::default());
        analyzer.process_telemetry(brake_lap(false, 90.0), 1);

        let err = analyzer
            .process_lap_file(Path::new("/nonexistent/lap2.csv"), 2)
            .unwrap_err();
        assert_eq!(err.lap, 2);
        assert_eq!(analyzer.laps_processed(), 1);
    }

    #[test]
    fn test_snapshot_roundtrips_as_json() {
        let mut analyzer = LiveSessionAnalyzer::new(track_one_corner(), AnalysisConfig::default());
        analyzer.process_telemetry(brake_lap(false, 90.0), 1);
        analyzer.process_telemetry(brake_lap(true, 91.0), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        analyzer.save_snapshot(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let restored: SessionSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored.laps_processed, 2);
        assert_eq!(restored.corners[0].history.len(), 2);
        assert_eq!(
            restored.corners[0].history[1].classification.as_deref(),
            Some("brake_technique")
        );
    }
}
