// src/session/source.rs
//
// Where completed laps come from. The analyzer itself never watches the
// filesystem; a LapSource hands it (path, lap number) pairs and decides
// the pacing. DirectorySource drains a folder once; ReplaySource feeds
// the same folder on a timer to simulate a running session.

use anyhow::Result;
use crossbeam::channel::{unbounded, Receiver, Sender};
use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LapArrival {
    pub path: PathBuf,
    pub lap_number: u32,
}

/// Blocking pull of the next completed lap. None ends the session.
pub trait LapSource {
    fn next_lap(&mut self) -> Option<LapArrival>;
}

// ============================================================================
// DIRECTORY SOURCE
// ============================================================================

/// One-shot ordered scan of a directory of lap CSVs.
pub struct DirectorySource {
    queue: VecDeque<LapArrival>,
}

impl DirectorySource {
    pub fn new(dir: &Path) -> Result<Self> {
        let arrivals = scan_lap_files(dir)?;
        info!(
            laps = arrivals.len(),
            "directory source ready at {}",
            dir.display()
        );
        Ok(Self {
            queue: arrivals.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl LapSource for DirectorySource {
    fn next_lap(&mut self) -> Option<LapArrival> {
        self.queue.pop_front()
    }
}

/// Scan a directory for lap CSVs, ordered by lap number. Lap numbers
/// come from the filename; files naming none are numbered positionally
/// after the named ones.
pub fn scan_lap_files(dir: &Path) -> Result<Vec<LapArrival>> {
    let named = Regex::new(r"(?i)lap[_-]?(\d+)")?;
    let trailing = Regex::new(r"_(\d+)\.csv$")?;

    let mut csv_files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    csv_files.sort();

    let mut arrivals = Vec::new();
    let mut unnumbered = Vec::new();
    for path in csv_files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        match extract_lap_number(&name, &named, &trailing) {
            Some(lap_number) => arrivals.push(LapArrival { path, lap_number }),
            None => unnumbered.push(path),
        }
    }
    arrivals.sort_by_key(|a| a.lap_number);

    let mut next = arrivals.last().map_or(0, |a| a.lap_number);
    for path in unnumbered {
        next += 1;
        warn!(
            assigned = next,
            "no lap number in {}, assigned by position",
            path.display()
        );
        arrivals.push(LapArrival {
            path,
            lap_number: next,
        });
    }
    Ok(arrivals)
}

fn extract_lap_number(name: &str, named: &Regex, trailing: &Regex) -> Option<u32> {
    named
        .captures(name)
        .or_else(|| trailing.captures(name))
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ============================================================================
// REPLAY SOURCE
// ============================================================================

/// Replays historical laps on a fixed interval over a channel, as if
/// the session were running now. Cancelling stops the feeder between
/// laps; dropping the source cancels and joins it.
pub struct ReplaySource {
    receiver: Receiver<LapArrival>,
    cancel: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(arrivals: Vec<LapArrival>, interval: Duration) -> Self {
        let (sender, receiver) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let feeder = thread::spawn(move || feed(arrivals, interval, sender, flag));
        Self {
            receiver,
            cancel,
            feeder: Some(feeder),
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

fn feed(
    arrivals: Vec<LapArrival>,
    interval: Duration,
    sender: Sender<LapArrival>,
    cancel: Arc<AtomicBool>,
) {
    for arrival in arrivals {
        if cancel.load(Ordering::Relaxed) {
            debug!("replay feeder cancelled");
            return;
        }
        let lap = arrival.lap_number;
        if sender.send(arrival).is_err() {
            return;
        }
        debug!(lap, "replayed lap arrival");
        thread::sleep(interval);
    }
}

impl LapSource for ReplaySource {
    fn next_lap(&mut self) -> Option<LapArrival> {
        self.receiver.recv().ok()
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.feeder.take() {
            let _ = handle.join();
        }
    }
}
