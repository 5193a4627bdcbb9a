// src/main.rs

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use lapsight::analysis::{
    aggregate_recommendations, analyze_corner_consistency, analyze_lap, analyze_lap_times,
    classify_corner_pair, compare_aggregate, consistency_report, corner_recommendations, Behavior,
    CornerSide,
};
use lapsight::config::AnalysisConfig;
use lapsight::corners::{compare_laps, extract_corner_window};
use lapsight::session::{scan_lap_files, LapSource, LiveSessionAnalyzer, ReplaySource};
use lapsight::telemetry::LapTelemetry;
use lapsight::time_delta::{corner_time_delta, estimate_lap_time};
use lapsight::timing::{discover_timing_file, TimingTable};
use lapsight::track::TrackLayout;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lapsight",
    version,
    about = "Corner-by-corner lap comparison and driving-behavior analysis for circuit telemetry"
)]
struct Cli {
    /// YAML file overriding the built-in analysis thresholds
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify two laps corner by corner (JSON to stdout)
    Compare {
        /// Telemetry CSV of the lap under analysis
        #[arg(long)]
        lap_a: PathBuf,
        /// Telemetry CSV of the reference lap
        #[arg(long)]
        lap_b: PathBuf,
        /// Track layout YAML (corner names and apex distances)
        #[arg(long)]
        track: PathBuf,
        /// Endurance timing export; discovered next to lap A when omitted
        #[arg(long)]
        timing: Option<PathBuf>,
        /// Car number behind lap A in the timing table
        #[arg(long)]
        vehicle_a: Option<String>,
        #[arg(long)]
        vehicle_b: Option<String>,
        /// Lap numbers for the timing lookups
        #[arg(long)]
        lap_number_a: Option<u32>,
        #[arg(long)]
        lap_number_b: Option<u32>,
        /// Display labels in the output
        #[arg(long, default_value = "Lap A")]
        id_a: String,
        #[arg(long, default_value = "Lap B")]
        id_b: String,
    },
    /// Score a stint of lap files for consistency (text report)
    Consistency {
        /// Directory of per-lap telemetry CSVs
        #[arg(long)]
        laps_dir: PathBuf,
        #[arg(long)]
        track: PathBuf,
        #[arg(long)]
        timing: Option<PathBuf>,
        /// Car number for timing lookups
        #[arg(long)]
        vehicle: Option<String>,
    },
    /// Replay a stint lap by lap through the live session engine
    Live {
        #[arg(long)]
        laps_dir: PathBuf,
        #[arg(long)]
        track: PathBuf,
        #[arg(long)]
        timing: Option<PathBuf>,
        #[arg(long)]
        vehicle: Option<String>,
        /// Delay between replayed laps
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
        /// Write the final session snapshot to this path
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lapsight=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            let config = AnalysisConfig::load(path)?;
            info!("✓ Configuration loaded from {}", path.display());
            config
        }
        None => AnalysisConfig::default(),
    };

    match cli.command {
        Command::Compare {
            lap_a,
            lap_b,
            track,
            timing,
            vehicle_a,
            vehicle_b,
            lap_number_a,
            lap_number_b,
            id_a,
            id_b,
        } => run_compare(
            &lap_a,
            &lap_b,
            &track,
            timing.as_deref(),
            vehicle_a.as_deref(),
            vehicle_b.as_deref(),
            lap_number_a,
            lap_number_b,
            &id_a,
            &id_b,
            &config,
        ),
        Command::Consistency {
            laps_dir,
            track,
            timing,
            vehicle,
        } => run_consistency(&laps_dir, &track, timing.as_deref(), vehicle.as_deref(), &config),
        Command::Live {
            laps_dir,
            track,
            timing,
            vehicle,
            interval_ms,
            snapshot,
        } => run_live(
            &laps_dir,
            &track,
            timing.as_deref(),
            vehicle.as_deref(),
            interval_ms,
            snapshot.as_deref(),
            config,
        ),
    }
}

// ============================================================================
// COMPARE
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn run_compare(
    lap_a_path: &Path,
    lap_b_path: &Path,
    track: &Path,
    timing_path: Option<&Path>,
    vehicle_a: Option<&str>,
    vehicle_b: Option<&str>,
    lap_number_a: Option<u32>,
    lap_number_b: Option<u32>,
    id_a: &str,
    id_b: &str,
    config: &AnalysisConfig,
) -> Result<()> {
    let layout = TrackLayout::load(track)?;
    let lap_a = LapTelemetry::from_csv(lap_a_path)?;
    let lap_b = LapTelemetry::from_csv(lap_b_path)?;
    info!("🏁 Comparing {} vs {} on {}", id_a, id_b, layout.name);

    let timing = resolve_timing(timing_path, lap_a_path.parent())?;
    let lookup = |vehicle: Option<&str>, lap: Option<u32>| -> (Option<f64>, Option<f64>) {
        match (&timing, vehicle, lap) {
            (Some(table), Some(vehicle), Some(lap)) => {
                let record = table.record(vehicle, lap);
                (
                    record.and_then(|r| r.time_s),
                    record.and_then(|r| r.top_speed),
                )
            }
            _ => (None, None),
        }
    };
    let (time_a, top_speed_a) = lookup(vehicle_a, lap_number_a);
    let (time_b, top_speed_b) = lookup(vehicle_b, lap_number_b);
    let time_a = time_a.or_else(|| estimate_lap_time(&lap_a));
    let time_b = time_b.or_else(|| estimate_lap_time(&lap_b));

    let mut payload = serde_json::json!({
        "track": layout.name,
        "a": { "id": id_a, "lap_time_s": time_a, "top_speed_kph": top_speed_a },
        "b": { "id": id_b, "lap_time_s": time_b, "top_speed_kph": top_speed_b },
        "lap_time_delta_s": match (time_a, time_b) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        },
    });

    if lap_a.has_distance() && lap_b.has_distance() {
        let mut corners = Vec::new();
        let mut assessments = Vec::new();
        for corner in &layout.corners {
            let (Some(win_a), Some(win_b)) = (
                extract_corner_window(&lap_a, corner.apex_dist_m, &config.window),
                extract_corner_window(&lap_b, corner.apex_dist_m, &config.window),
            ) else {
                debug!(corner = corner.name.as_str(), "no window in one of the laps");
                continue;
            };
            let assessment = classify_corner_pair(
                CornerSide {
                    window: &win_a,
                    id: id_a,
                    top_speed: top_speed_a,
                },
                CornerSide {
                    window: &win_b,
                    id: id_b,
                    top_speed: top_speed_b,
                },
                &config.classifier,
            );
            if assessment.behavior != Behavior::Normal {
                info!(
                    "  {} → {} ({:.0}%)",
                    corner.name,
                    assessment.behavior.label(),
                    assessment.confidence * 100.0
                );
            }
            corners.push(serde_json::json!({
                "corner": corner.name,
                "assessment": assessment,
                "time_delta_s": corner_time_delta(&win_a, &win_b).map(|d| d.delta),
            }));
            assessments.push((corner.name.clone(), assessment));
        }
        info!("📊 {} corner(s) compared", corners.len());

        payload["corners"] = serde_json::json!(corners);
        payload["metrics"] = serde_json::to_value(compare_laps(
            &layout,
            &lap_a,
            &lap_b,
            &config.window,
        ))?;
        payload["recommendations"] = serde_json::json!({
            "a": corner_recommendations(&assessments, id_a),
            "b": corner_recommendations(&assessments, id_b),
        });
    } else {
        warn!("no usable distance channel, falling back to whole-lap aggregate analysis");
        let character_a = analyze_lap(&lap_a, &config.aggregate);
        let character_b = analyze_lap(&lap_b, &config.aggregate);
        payload["aggregate"] = serde_json::json!({
            "a": character_a,
            "b": character_b,
            "comparison": compare_aggregate(
                (id_a, &character_a),
                (id_b, &character_b),
                &config.aggregate,
            ),
        });
        payload["recommendations"] = serde_json::json!({
            "a": aggregate_recommendations(&character_a, &config.aggregate),
            "b": aggregate_recommendations(&character_b, &config.aggregate),
        });
    }

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

// ============================================================================
// CONSISTENCY
// ============================================================================

fn run_consistency(
    laps_dir: &Path,
    track: &Path,
    timing_path: Option<&Path>,
    vehicle: Option<&str>,
    config: &AnalysisConfig,
) -> Result<()> {
    let layout = TrackLayout::load(track)?;
    let arrivals = scan_lap_files(laps_dir)?;
    if arrivals.is_empty() {
        bail!("no lap files found in {}", laps_dir.display());
    }
    info!("📊 Analyzing {} lap(s) on {}", arrivals.len(), layout.name);

    let timing = resolve_timing(timing_path, Some(laps_dir))?;

    let mut laps: Vec<(u32, LapTelemetry)> = Vec::new();
    for arrival in &arrivals {
        match LapTelemetry::from_csv(&arrival.path) {
            Ok(lap) => laps.push((arrival.lap_number, lap)),
            Err(e) => warn!("⏭ skipping {}: {}", arrival.path.display(), e),
        }
    }

    // Official times for clean laps where the table covers them,
    // telemetry estimates otherwise. Flagged laps stay out of the
    // lap-time statistics.
    let mut times: Vec<(u32, f64)> = Vec::new();
    for (lap, telemetry) in &laps {
        if let (Some(table), Some(vehicle)) = (&timing, vehicle) {
            if !table.is_clean(vehicle, *lap) {
                info!(lap, "excluded from lap-time stats (flagged)");
                continue;
            }
            if let Some(time) = table.lap_time(vehicle, *lap) {
                times.push((*lap, time));
                continue;
            }
        }
        if let Some(time) = estimate_lap_time(telemetry) {
            times.push((*lap, time));
        }
    }

    let lap_stats = analyze_lap_times(&times, &config.consistency);
    let lap_refs: Vec<(u32, &LapTelemetry)> =
        laps.iter().map(|(lap, telemetry)| (*lap, telemetry)).collect();
    let corners =
        analyze_corner_consistency(&lap_refs, &layout, &config.window, &config.consistency);

    println!(
        "{}",
        consistency_report(lap_stats.as_ref(), &corners, &config.consistency)
    );
    Ok(())
}

// ============================================================================
// LIVE
// ============================================================================

fn run_live(
    laps_dir: &Path,
    track: &Path,
    timing_path: Option<&Path>,
    vehicle: Option<&str>,
    interval_ms: u64,
    snapshot: Option<&Path>,
    config: AnalysisConfig,
) -> Result<()> {
    let layout = TrackLayout::load(track)?;
    let arrivals = scan_lap_files(laps_dir)?;
    if arrivals.is_empty() {
        bail!("no lap files found in {}", laps_dir.display());
    }

    let mut analyzer = LiveSessionAnalyzer::new(layout, config);
    if let (Some(table), Some(vehicle)) = (resolve_timing(timing_path, Some(laps_dir))?, vehicle) {
        analyzer = analyzer.with_timing(table, vehicle);
    }

    info!(
        "🔴 Live replay: {} lap(s), {}ms interval",
        arrivals.len(),
        interval_ms
    );
    let mut source = ReplaySource::new(arrivals, Duration::from_millis(interval_ms));
    while let Some(arrival) = source.next_lap() {
        match analyzer.process_lap_file(&arrival.path, arrival.lap_number) {
            Ok(report) => println!("{}", serde_json::to_string(&report)?),
            Err(e) => warn!("⏭ lap {} skipped: {}", e.lap, e),
        }
    }

    let summary = analyzer.end_session();
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(path) = snapshot {
        analyzer.save_snapshot(path)?;
        info!("💾 Session snapshot written to {}", path.display());
    }
    Ok(())
}

// ============================================================================
// HELPERS
// ============================================================================

fn resolve_timing(
    explicit: Option<&Path>,
    search_dir: Option<&Path>,
) -> Result<Option<TimingTable>> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => search_dir.and_then(discover_timing_file),
    };
    match path {
        Some(path) => {
            let table = TimingTable::load(&path)?;
            info!(
                "✓ Timing table loaded from {} ({} laps)",
                path.display(),
                table.len()
            );
            Ok(Some(table))
        }
        None => Ok(None),
    }
}
