// src/track.rs
//
// Track layout: named corners with apex distances, grouped into
// sectors. Layouts are plain YAML files so adding a circuit never
// touches code.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CornerKind {
    Slow,
    Medium,
    Fast,
}

impl CornerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Medium => "medium",
            Self::Fast => "fast",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CornerDefinition {
    pub name: String,
    /// Apex position along the lap, meters from start/finish.
    pub apex_dist_m: f64,
    pub kind: CornerKind,
    #[serde(default)]
    pub sector: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorDefinition {
    pub name: String,
    /// Where the sector ends, meters from start/finish.
    pub end_dist_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackLayout {
    pub name: String,
    #[serde(default)]
    pub sectors: Vec<SectorDefinition>,
    pub corners: Vec<CornerDefinition>,
}

impl TrackLayout {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading track layout {}", path.display()))?;
        let layout: TrackLayout = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing track layout {}", path.display()))?;
        Ok(layout)
    }

    pub fn corner(&self, name: &str) -> Option<&CornerDefinition> {
        self.corners.iter().find(|c| c.name == name)
    }
}
