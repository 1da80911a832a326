//! Log-metrics extraction
//!
//! Turns unstructured tool output into a [`MetricsRecord`]. Patterns that do
//! not match any line are recorded as unavailable instead of failing, so
//! callers always get a complete (possibly partial) record.

use chrono::Local;
use once_cell::sync::Lazy;
use recon_core::{MetricValue, MetricsRecord, ReconError, ReconResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CAMERAS: &str = "cameras";
pub const IMAGES: &str = "images";
pub const REGISTERED_IMAGES: &str = "registered_images";
pub const POINTS3D: &str = "points3d";
pub const OBSERVATIONS: &str = "observations";
pub const MEAN_TRACK_LENGTH: &str = "mean_track_length";
pub const MEAN_OBSERVATIONS_PER_IMAGE: &str = "mean_observations_per_image";
pub const MEAN_REPROJECTION_ERROR: &str = "mean_reprojection_error";

/// A metric name and the line pattern whose first capture group holds its value.
#[derive(Debug, Clone)]
pub struct MetricPattern {
    pub name: String,
    pub regex: Regex,
}

impl MetricPattern {
    pub fn new(name: impl Into<String>, pattern: &str) -> ReconResult<Self> {
        let name = name.into();
        let regex = Regex::new(pattern)
            .map_err(|e| ReconError::Config(format!("pattern for {name}: {e}")))?;
        Ok(Self { name, regex })
    }

    fn capture<'t>(&self, line: &'t str) -> Option<&'t str> {
        let caps = self.regex.captures(line)?;
        caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str())
    }
}

/// Statistics printed by the sparse-model analyzer, e.g.
/// `I0101 12:00:00.000 model.cc:42] Registered images: 118`.
pub static MODEL_ANALYZER_PATTERNS: Lazy<Vec<MetricPattern>> = Lazy::new(|| {
    [
        (CAMERAS, r"\]\s+Cameras:\s+(\d+)"),
        (IMAGES, r"\]\s+Images:\s+(\d+)"),
        (REGISTERED_IMAGES, r"\]\s+Registered images:\s+(\d+)"),
        (POINTS3D, r"\]\s+Points:\s+(\d+)"),
        (OBSERVATIONS, r"\]\s+Observations:\s+(\d+)"),
        (MEAN_TRACK_LENGTH, r"\]\s+Mean track length:\s+([\d\.]+)"),
        (MEAN_OBSERVATIONS_PER_IMAGE, r"\]\s+Mean observations per image:\s+([\d\.]+)"),
        (MEAN_REPROJECTION_ERROR, r"\]\s+Mean reprojection error:\s+([\d\.]+)"),
    ]
    .into_iter()
    .map(|(name, pattern)| MetricPattern {
        name: name.to_string(),
        regex: Regex::new(pattern).expect("static analyzer pattern"),
    })
    .collect()
});

/// Scans `text` line by line and keeps the first match of every pattern.
pub fn parse_log_metrics(source: &str, text: &str, patterns: &[MetricPattern]) -> MetricsRecord {
    let values = patterns.iter().map(|pattern| {
        let value = text
            .lines()
            .find_map(|line| pattern.capture(line))
            .map(MetricValue::parse)
            .unwrap_or(MetricValue::Unavailable);
        (pattern.name.clone(), value)
    });
    let record = MetricsRecord::new(source, values);

    let missing = record.unavailable();
    if !missing.is_empty() {
        tracing::warn!(source, missing = ?missing, "metrics not reported");
    }
    record
}

pub fn parse_model_analyzer(source: &str, text: &str) -> MetricsRecord {
    parse_log_metrics(source, text, &MODEL_ANALYZER_PATTERNS)
}

/// Persisted diagnostic record of one sparse model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    #[serde(rename = "Scenario")]
    pub scenario: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Cameras")]
    pub cameras: MetricValue,
    #[serde(rename = "Images")]
    pub images: MetricValue,
    #[serde(rename = "Registered Images")]
    pub registered_images: MetricValue,
    #[serde(rename = "Points3D")]
    pub points3d: MetricValue,
    #[serde(rename = "Observations")]
    pub observations: MetricValue,
    #[serde(rename = "Mean Track Length")]
    pub mean_track_length: MetricValue,
    #[serde(rename = "Mean Observations per Image")]
    pub mean_observations_per_image: MetricValue,
    #[serde(rename = "Mean Reprojection Error")]
    pub mean_reprojection_error: MetricValue,
}

impl ModelStats {
    pub fn from_record(scenario: impl Into<String>, record: &MetricsRecord) -> Self {
        Self {
            scenario: scenario.into(),
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            cameras: record.get(CAMERAS),
            images: record.get(IMAGES),
            registered_images: record.get(REGISTERED_IMAGES),
            points3d: record.get(POINTS3D),
            observations: record.get(OBSERVATIONS),
            mean_track_length: record.get(MEAN_TRACK_LENGTH),
            mean_observations_per_image: record.get(MEAN_OBSERVATIONS_PER_IMAGE),
            mean_reprojection_error: record.get(MEAN_REPROJECTION_ERROR),
        }
    }

    pub fn to_record(&self) -> MetricsRecord {
        MetricsRecord::new(
            self.scenario.clone(),
            [
                (CAMERAS, self.cameras),
                (IMAGES, self.images),
                (REGISTERED_IMAGES, self.registered_images),
                (POINTS3D, self.points3d),
                (OBSERVATIONS, self.observations),
                (MEAN_TRACK_LENGTH, self.mean_track_length),
                (MEAN_OBSERVATIONS_PER_IMAGE, self.mean_observations_per_image),
                (MEAN_REPROJECTION_ERROR, self.mean_reprojection_error),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v)),
        )
    }

    pub fn load(path: &Path) -> ReconResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReconError::io(path.display().to_string(), e))?;
        serde_json::from_str(&text).map_err(|e| ReconError::malformed(path, e.to_string()))
    }
}

/// Scenario label for a model folder: basename of `<output>` in `<output>/sparse/<n>`.
pub fn scenario_name(model_dir: &Path) -> String {
    model_dir
        .ancestors()
        .nth(2)
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Writes `stats` as pretty JSON to `json_path` and the raw tool output next
/// to it with a `.txt` extension. Returns the raw-text path.
pub fn persist_model_stats(
    json_path: &Path,
    stats: &ModelStats,
    raw: &str,
) -> ReconResult<PathBuf> {
    if let Some(parent) = json_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ReconError::io(parent.display().to_string(), e))?;
    }
    let json = serde_json::to_string_pretty(stats)
        .map_err(|e| ReconError::Config(format!("stats serialization: {e}")))?;
    std::fs::write(json_path, json)
        .map_err(|e| ReconError::io(json_path.display().to_string(), e))?;

    let txt_path = json_path.with_extension("txt");
    std::fs::write(&txt_path, raw).map_err(|e| ReconError::io(txt_path.display().to_string(), e))?;
    tracing::info!(path = %json_path.display(), "model statistics saved");
    Ok(txt_path)
}
