use recon_batch::{process_all, BatchError, FrameOptions};
use recon_core::ReconError;
use std::path::PathBuf;

#[test]
fn missing_file_does_not_cancel_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let mut files: Vec<PathBuf> = (0..6)
        .map(|i| {
            let path = dir.path().join(format!("frame_{i}.jpg"));
            std::fs::write(&path, vec![0u8; i * 10]).unwrap();
            path
        })
        .collect();
    files.insert(2, dir.path().join("vanished.jpg"));

    let report = process_all(
        files,
        |path| {
            std::fs::metadata(path)
                .map(|m| m.len())
                .map_err(|e| BatchError::from(ReconError::io(path.display().to_string(), e)))
        },
        3,
    )
    .unwrap();

    assert_eq!(report.len(), 7);
    assert_eq!(report.success_count(), 6);
    let (failed, err) = report.failures().next().unwrap();
    assert!(failed.ends_with("vanished.jpg"));
    assert!(matches!(err, BatchError::Item(ReconError::Io { .. })));
    assert_eq!(report.into_values(), vec![0, 10, 20, 30, 40, 50]);
}

#[test]
fn frame_options_from_partial_yaml() {
    let opts: FrameOptions = serde_yaml::from_str("fps: 2\ncapture_seconds: 60\n").unwrap();
    assert_eq!(opts.fps, 2.0);
    assert_eq!(opts.capture_seconds, Some(60.0));
    assert_eq!(opts.skip_seconds, 5.0);
    assert!(opts.tag_camera);
}
