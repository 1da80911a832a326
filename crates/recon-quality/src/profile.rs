//! Gate Profiles
//!
//! Thresholds applied at the pipeline checkpoints, grouped into named
//! presets. Every field has a default so a YAML profile only needs to
//! name what it changes.

use crate::gate::{MissingMetricPolicy, Threshold};
use recon_core::{ReconError, ReconResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateProfile {
    /// Profile name (e.g., "standard@1.0")
    pub name: String,

    // === Match selection ===
    /// Qualifying pairs a match file needs before SfM runs
    pub min_valid_matches: i64,

    /// Correspondences for a pair to qualify
    pub min_matches_per_pair: usize,

    // === Sparse reconstruction ===
    /// Reconstructed camera poses / registered images
    pub min_poses: u64,

    pub warn_poses: Option<u64>,

    /// Mean reprojection error above this only warns
    pub warn_reprojection_error: Option<f64>,

    // === Dense reconstruction ===
    pub min_dense_points: u64,

    pub warn_dense_points: Option<u64>,

    /// Applied when a gated metric is missing from tool output
    pub missing_metric: MissingMetricPolicy,
}

impl GateProfile {
    /// Default floors.
    pub fn standard() -> Self {
        Self {
            name: "standard@1.0".to_string(),
            min_valid_matches: 10,
            min_matches_per_pair: 10,
            min_poses: 3,
            warn_poses: None,
            warn_reprojection_error: Some(2.0),
            min_dense_points: 1000,
            warn_dense_points: None,
            missing_metric: MissingMetricPolicy::Warn,
        }
    }

    /// Stricter floors for mapping-grade captures.
    pub fn survey() -> Self {
        Self {
            name: "survey@1.0".to_string(),
            min_valid_matches: 50,
            min_matches_per_pair: 30,
            min_poses: 10,
            warn_poses: Some(25),
            warn_reprojection_error: Some(1.0),
            min_dense_points: 10_000,
            warn_dense_points: Some(100_000),
            missing_metric: MissingMetricPolicy::Abort,
        }
    }

    pub fn from_yaml(yaml: &str) -> ReconResult<Self> {
        let profile: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ReconError::Config(format!("gate profile: {e}")))?;
        profile.validate()?;
        Ok(profile)
    }

    /// A negative match floor would let unreadable candidates (score -1)
    /// through, so it is refused.
    pub fn validate(&self) -> ReconResult<()> {
        if self.min_valid_matches < 0 {
            return Err(ReconError::Config(format!(
                "gate profile {}: min_valid_matches must be >= 0, got {}",
                self.name, self.min_valid_matches
            )));
        }
        Ok(())
    }

    pub fn for_mode(mode: &str) -> Self {
        match mode {
            "survey" => Self::survey(),
            _ => Self::standard(),
        }
    }

    pub fn poses(&self) -> Threshold {
        Threshold::at_least(self.min_poses as f64).warn_below(self.warn_poses.map(|v| v as f64))
    }

    pub fn dense_points(&self) -> Threshold {
        Threshold::at_least(self.min_dense_points as f64)
            .warn_below(self.warn_dense_points.map(|v| v as f64))
    }
}

impl Default for GateProfile {
    fn default() -> Self {
        Self::standard()
    }
}
