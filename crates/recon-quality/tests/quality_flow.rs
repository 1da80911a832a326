//! Cross-module checks: artifacts on disk through to gate decisions.

use recon_core::{GateDecision, LogLevel, MemorySink, MetricValue};
use recon_quality::*;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_matches(dir: &Path, name: &str, qualifying: usize, weak: usize) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for i in 0..qualifying + weak {
        let count = if i < qualifying { 10 } else { 4 };
        writeln!(file, "{} {}", i, i + 1).unwrap();
        let body: Vec<String> = (0..count).map(|k| format!("{k} {k}")).collect();
        writeln!(file, "{}", body.join(" ")).unwrap();
    }
    path
}

#[test]
fn scenario_selects_a_then_aborts_when_a_drops_to_nine() {
    let dir = tempfile::tempdir().unwrap();
    let profile = GateProfile::standard();
    let sink = MemorySink::new();

    let a = write_matches(dir.path(), "matches.f.txt", 15, 3);
    let b = write_matches(dir.path(), "matches.e.txt", 8, 10);
    let best = select_best(
        &[a.clone(), b.clone()],
        profile.min_valid_matches,
        profile.min_matches_per_pair,
        &sink,
    )
    .unwrap();
    assert_eq!(best.path, a);
    assert_eq!(best.score, 15);

    let a = write_matches(dir.path(), "matches.f.txt", 9, 3);
    let err = select_best(
        &[a, b],
        profile.min_valid_matches,
        profile.min_matches_per_pair,
        &sink,
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().starts_with("QLT/valid_match_pairs"));
}

#[test]
fn header_count_ignores_body() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dense.ply");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(
        b"ply\nformat binary_little_endian 1.0\nelement vertex 1234\nproperty float x\nend_header\n",
    )
    .unwrap();
    file.write_all(&[0xff, 0x00, 0xfe, 0x80, 0x13]).unwrap();
    drop(file);

    let sink = MemorySink::new();
    assert_eq!(count_ply_vertices(&path, &sink), 1234);
    assert_eq!(sink.count_at(LogLevel::Error), 0);

    let missing = dir.path().join("missing.ply");
    assert_eq!(count_ply_vertices(&missing, &sink), 0);
    assert_eq!(sink.count_at(LogLevel::Error), 1);
}

#[test]
fn partial_analyzer_output_keeps_the_rest_unavailable() {
    let text = "noise\n\
                I0101 model.cc:1] Images: 40\n\
                I0101 model.cc:1] Registered images: 38\n\
                I0101 model.cc:1] Mean reprojection error: 0.61px\n";
    let record = parse_model_analyzer("model_analyzer", text);

    assert_eq!(record.len(), 8);
    assert_eq!(record.get("images"), MetricValue::Int(40));
    assert_eq!(record.get("registered_images"), MetricValue::Int(38));
    assert_eq!(record.get("mean_reprojection_error"), MetricValue::Float(0.61));
    assert_eq!(record.unavailable().len(), 5);

    let (decision, _) = evaluate_poses(&record, &GateProfile::standard());
    assert_eq!(decision, GateDecision::Proceed);
}

#[test]
fn scene_hygiene_reports_absolute_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sfm_data.json");
    std::fs::write(
        &path,
        r#"{
            "root_path": "/projects/site/images",
            "views": [
                {"key": 0, "value": {"ptr_wrapper": {"data": {"local_path": "", "filename": "a.jpg"}}}},
                {"key": 1, "value": {"ptr_wrapper": {"data": {"local_path": "/host/images", "filename": "b.jpg"}}}}
            ],
            "extrinsics": [{"key": 0, "value": {}}]
        }"#,
    )
    .unwrap();

    let scene = SceneSummary::from_sfm_data_json(&path).unwrap();
    assert_eq!(scene.view_count, 2);
    assert_eq!(scene.pose_count, 1);

    let check = relative_paths_check("path_hygiene", scene.absolute_refs());
    assert_eq!(check.status, CheckStatus::Fail);
    assert!(check.message.contains("/host/images/b.jpg"));
}
