//! Checkpoints evaluated between stages.
//!
//! A gate looks at the stage that just succeeded (its output text or the
//! artifacts it wrote) and returns a [`GateReport`]. Reports may carry
//! metrics for the run summary and host paths to bind into later stages.

use recon_core::{
    GateDecision, LogSink, MetricValue, MetricsRecord, ReconError, ReconResult, StageResult,
};
use recon_quality::{
    count_ply_vertices, decide, evaluate_poses, floor_check, persist_model_stats,
    relative_paths_check, select_best, GateProfile, ModelStats, SceneSummary,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Slot the selected match file is bound to.
pub const MATCHES_SLOT: &str = "matches";

/// What a gate sees besides the stage result.
pub struct GateEnv<'a> {
    pub profile: &'a GateProfile,
    pub sink: &'a dyn LogSink,
}

#[derive(Debug, Clone)]
pub struct GateReport {
    pub decision: GateDecision,
    pub metrics: Option<MetricsRecord>,
    /// Host paths for [`recon_core::Arg::Bound`] slots of later stages.
    pub bindings: BTreeMap<String, PathBuf>,
}

impl GateReport {
    pub fn new(decision: GateDecision) -> Self {
        Self {
            decision,
            metrics: None,
            bindings: BTreeMap::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRecord) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn bind(mut self, slot: impl Into<String>, host: PathBuf) -> Self {
        self.bindings.insert(slot.into(), host);
        self
    }
}

pub trait Gate: Send + Sync {
    fn name(&self) -> &str;

    /// `Err` is reserved for failures of the gate itself; a result that is
    /// merely not good enough is an `Ok` report with an abort decision.
    fn check(&self, result: &StageResult, env: &GateEnv<'_>) -> ReconResult<GateReport>;
}

/// The checkpoints used by the built-in pipelines.
#[derive(Debug, Clone, PartialEq)]
pub enum Checkpoint {
    /// Pick the best of several match files and bind it to `slot`.
    MatchSelection { candidates: Vec<PathBuf>, slot: String },
    /// A declared output must exist.
    ModelPresent { path: PathBuf },
    /// Parse analyzer output, persist it, check registered images.
    AnalyzerMetrics { stats_json: PathBuf, scenario: String },
    /// Reconstructed poses in an OpenMVG scene.
    SparsePoses { sfm_data_json: PathBuf },
    /// Every image reference in an OpenMVG scene must be relative.
    PathHygiene { sfm_data_json: PathBuf },
    /// Vertex count of a dense point cloud.
    DensePoints { ply: PathBuf },
}

impl Gate for Checkpoint {
    fn name(&self) -> &str {
        match self {
            Self::MatchSelection { .. } => "match_selection",
            Self::ModelPresent { .. } => "model_present",
            Self::AnalyzerMetrics { .. } => "analyzer_metrics",
            Self::SparsePoses { .. } => "sparse_poses",
            Self::PathHygiene { .. } => "path_hygiene",
            Self::DensePoints { .. } => "dense_points",
        }
    }

    fn check(&self, result: &StageResult, env: &GateEnv<'_>) -> ReconResult<GateReport> {
        match self {
            Self::MatchSelection { candidates, slot } => {
                match_selection(candidates, slot, &result.name, env)
            }
            Self::ModelPresent { path } => Ok(if path.exists() {
                GateReport::new(GateDecision::Proceed)
            } else {
                GateReport::new(GateDecision::Abort(format!(
                    "{} did not produce {}",
                    result.name,
                    path.display()
                )))
            }),
            Self::AnalyzerMetrics {
                stats_json,
                scenario,
            } => analyzer_metrics(result, stats_json, scenario, env),
            Self::SparsePoses { sfm_data_json } => {
                let scene = match load_scene(sfm_data_json) {
                    Ok(scene) => scene,
                    Err(reason) => return Ok(GateReport::new(GateDecision::Abort(reason))),
                };
                let poses = MetricValue::Int(scene.pose_count as i64);
                let check = floor_check(
                    "reconstructed_poses",
                    &poses,
                    env.profile.poses(),
                    env.profile.missing_metric,
                );
                let metrics = MetricsRecord::new(
                    sfm_data_json.display().to_string(),
                    [
                        ("views".to_string(), MetricValue::Int(scene.view_count as i64)),
                        ("reconstructed_poses".to_string(), poses),
                    ],
                );
                Ok(GateReport::new(decide(&[check])).with_metrics(metrics))
            }
            Self::PathHygiene { sfm_data_json } => {
                let scene = match load_scene(sfm_data_json) {
                    Ok(scene) => scene,
                    Err(reason) => return Ok(GateReport::new(GateDecision::Abort(reason))),
                };
                let check = relative_paths_check(self.name(), scene.absolute_refs());
                Ok(GateReport::new(decide(&[check])))
            }
            Self::DensePoints { ply } => {
                if !ply.exists() {
                    return Ok(GateReport::new(GateDecision::Abort(format!(
                        "dense point cloud {} missing",
                        ply.display()
                    ))));
                }
                // 0 here means an unreadable header, which the floor rejects.
                let count = MetricValue::Int(count_ply_vertices(ply, env.sink) as i64);
                let check = floor_check(
                    "dense_points",
                    &count,
                    env.profile.dense_points(),
                    env.profile.missing_metric,
                );
                let metrics = MetricsRecord::new(
                    ply.display().to_string(),
                    [("dense_points".to_string(), count)],
                );
                Ok(GateReport::new(decide(&[check])).with_metrics(metrics))
            }
        }
    }
}

fn load_scene(path: &std::path::Path) -> Result<SceneSummary, String> {
    SceneSummary::from_sfm_data_json(path).map_err(|e| e.to_string())
}

fn match_selection(
    candidates: &[PathBuf],
    slot: &str,
    step: &str,
    env: &GateEnv<'_>,
) -> ReconResult<GateReport> {
    let selected = select_best(
        candidates,
        env.profile.min_valid_matches,
        env.profile.min_matches_per_pair,
        env.sink,
    );
    match selected {
        Ok(best) => {
            let metrics = MetricsRecord::new(
                best.path.display().to_string(),
                [("valid_match_pairs".to_string(), MetricValue::Int(best.score))],
            );
            Ok(GateReport::new(GateDecision::Proceed)
                .with_metrics(metrics)
                .bind(slot, best.path))
        }
        Err(
            e @ (ReconError::InsufficientQuality { .. }
            | ReconError::MalformedArtifact { .. }
            | ReconError::Io { .. }),
        ) => {
            env.sink.error(step, &e.to_string());
            Ok(GateReport::new(GateDecision::Abort(e.to_string())))
        }
        Err(e) => Err(e),
    }
}

fn analyzer_metrics(
    result: &StageResult,
    stats_json: &std::path::Path,
    scenario: &str,
    env: &GateEnv<'_>,
) -> ReconResult<GateReport> {
    let raw = result.output_text();
    let record = recon_quality::parse_model_analyzer(&result.name, &raw);
    for missing in record.unavailable() {
        env.sink.warn(&result.name, &format!("metric {missing} not reported"));
    }

    let stats = ModelStats::from_record(scenario, &record);
    match persist_model_stats(stats_json, &stats, &raw) {
        Ok(txt) => env.sink.info(
            &result.name,
            &format!("stats saved to {} and {}", stats_json.display(), txt.display()),
        ),
        // Diagnostics only; the gate decision does not depend on them.
        Err(e) => env.sink.warn(&result.name, &format!("could not persist stats: {e}")),
    }

    let (decision, _) = evaluate_poses(&record, env.profile);
    Ok(GateReport::new(decision).with_metrics(record))
}
