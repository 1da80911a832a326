//! Recon Quality: metrics extraction, candidate selection and gate decisions
//!
//! Everything here is read-only with respect to reconstruction artifacts:
//! tool output and files on disk go in, [`MetricsRecord`]s, ranked
//! [`Candidate`]s and [`GateDecision`]s come out.
//!
//! # Example
//!
//! ```ignore
//! use recon_quality::{parse_model_analyzer, GateProfile};
//!
//! let record = parse_model_analyzer("model_analyzer", &tool_output);
//! let decision = recon_quality::evaluate_poses(&record, &GateProfile::standard());
//! println!("{decision:?}");
//! ```

pub mod candidates;
pub mod gate;
pub mod metrics;
pub mod pointcloud;
pub mod profile;
pub mod scene;

pub use candidates::{rank_candidates, score_match_file, select_best, Candidate, MatchFileStats};
pub use gate::{
    ceiling_check, decide, evaluate_floors, floor_check, relative_paths_check, Check,
    CheckStatus, MissingMetricPolicy, Threshold,
};
pub use metrics::{
    parse_log_metrics, parse_model_analyzer, persist_model_stats, scenario_name, MetricPattern,
    ModelStats,
};
pub use pointcloud::{count_ply_vertices, read_binary_model_count, read_ply_header, PlyHeader};
pub use profile::GateProfile;
pub use scene::{is_absolute_reference, SceneSummary};

use recon_core::{GateDecision, MetricsRecord};

/// Checks a model-analyzer record against the profile's pose floor and
/// reprojection ceiling.
pub fn evaluate_poses(record: &MetricsRecord, profile: &GateProfile) -> (GateDecision, Vec<Check>) {
    let mut checks = evaluate_floors(
        record,
        &[(metrics::REGISTERED_IMAGES, profile.poses())],
        profile.missing_metric,
    );
    checks.push(ceiling_check(
        metrics::MEAN_REPROJECTION_ERROR,
        &record.get(metrics::MEAN_REPROJECTION_ERROR),
        profile.warn_reprojection_error,
    ));
    (decide(&checks), checks)
}

/// Check if a record would clear the pose gate of the given mode
pub fn would_proceed(record: &MetricsRecord, mode: &str) -> bool {
    !evaluate_poses(record, &GateProfile::for_mode(mode)).0.is_abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYZER_OUTPUT: &str = "\
I0101 12:00:00.000 model.cc:1] Cameras: 1
I0101 12:00:00.000 model.cc:1] Images: 40
I0101 12:00:00.000 model.cc:1] Registered images: 12
I0101 12:00:00.000 model.cc:1] Points: 5321
I0101 12:00:00.000 model.cc:1] Observations: 20011
I0101 12:00:00.000 model.cc:1] Mean track length: 3.760760
I0101 12:00:00.000 model.cc:1] Mean observations per image: 1667.583333
I0101 12:00:00.000 model.cc:1] Mean reprojection error: 0.712345px
";

    #[test]
    fn test_quick_evaluate() {
        let record = parse_model_analyzer("model_analyzer", ANALYZER_OUTPUT);
        assert!(would_proceed(&record, "standard"));
        let (decision, _) = evaluate_poses(&record, &GateProfile::survey());
        assert_eq!(
            decision,
            GateDecision::ProceedWithWarning("registered_images = 12 below recommended 25".into())
        );
    }

    #[test]
    fn test_too_few_poses_aborts() {
        let record = parse_model_analyzer(
            "model_analyzer",
            "x] Registered images: 2\nx] Mean reprojection error: 3.5px\n",
        );
        let (decision, checks) = evaluate_poses(&record, &GateProfile::standard());
        assert!(decision.is_abort());
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[1].status, CheckStatus::Warn);
    }
}
