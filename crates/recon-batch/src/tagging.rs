//! EXIF camera tagging of extracted frames.
//!
//! Video containers from DJI drones carry the camera model, the extracted
//! JPEGs do not. SfM tools need make, model and focal length to pick a
//! sensor width, so the tags are copied over with `exiftool`.

use crate::error::BatchResult;
use crate::executor::{process_all, BatchReport};
use once_cell::sync::Lazy;
use recon_core::{LogSink, ReconError, StageStatus, SubprocessRunner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const STEP: &str = "tag-frames";
const UNKNOWN_MODEL: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocalLength {
    pub millimeters: f64,
    pub equivalent_35mm: u32,
}

static KNOWN_CAMERAS: Lazy<HashMap<&'static str, FocalLength>> = Lazy::new(|| {
    HashMap::from([(
        "DJI FC3682",
        FocalLength {
            millimeters: 4.5,
            equivalent_35mm: 24,
        },
    )])
});

pub fn known_focal_length(camera: &str) -> Option<FocalLength> {
    KNOWN_CAMERAS.get(camera).copied()
}

/// Prefixes `DJI ` unless already present.
pub fn normalize_model(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("DJI ") {
        raw.to_string()
    } else {
        format!("DJI {raw}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraTag {
    pub make: String,
    pub model: String,
    pub focal: Option<FocalLength>,
}

impl CameraTag {
    pub fn from_probe(raw_model: &str) -> Self {
        let camera = normalize_model(raw_model);
        let focal = known_focal_length(&camera);
        let (make, model) = match camera.split_once(' ') {
            Some((make, model)) => (make.to_string(), model.to_string()),
            None => (UNKNOWN_MODEL.to_string(), camera.clone()),
        };
        Self { make, model, focal }
    }

    pub fn exiftool_argv(&self, files: &[&Path]) -> Vec<String> {
        let mut argv = vec![
            "exiftool".to_string(),
            format!("-Model={}", self.model),
            format!("-Make={}", self.make),
        ];
        if let Some(focal) = self.focal {
            argv.push(format!("-FocalLength={}", focal.millimeters));
            argv.push(format!("-FocalLengthIn35mmFormat={}", focal.equivalent_35mm));
        }
        argv.push("-overwrite_original".to_string());
        argv.extend(files.iter().map(|f| f.display().to_string()));
        argv
    }
}

/// Reads the `Model` tag of a video; `Unknown` when absent or unreadable.
pub fn probe_camera_model(video: &Path, runner: &SubprocessRunner, sink: &dyn LogSink) -> String {
    let argv = vec![
        "exiftool".to_string(),
        "-Model".to_string(),
        "-s3".to_string(),
        video.display().to_string(),
    ];
    match runner.run_argv("probe-camera", &argv, sink) {
        Ok(result) if result.status.succeeded() => {
            match result.lines.iter().map(|l| l.trim()).find(|l| !l.is_empty()) {
                Some(model) => model.to_string(),
                None => {
                    sink.warn(STEP, &format!("no Model tag in {}", video.display()));
                    UNKNOWN_MODEL.to_string()
                }
            }
        }
        Ok(result) => {
            sink.warn(
                STEP,
                &format!("exiftool failed on {}: {:?}", video.display(), result.status),
            );
            UNKNOWN_MODEL.to_string()
        }
        Err(e) => {
            sink.warn(STEP, &format!("exiftool unavailable: {e}"));
            UNKNOWN_MODEL.to_string()
        }
    }
}

/// Tags each frame with its own exiftool call so one bad file does not
/// block the rest.
pub fn tag_frames(
    frames: Vec<PathBuf>,
    tag: &CameraTag,
    runner: &SubprocessRunner,
    max_workers: usize,
    sink: &dyn LogSink,
) -> BatchResult<BatchReport<PathBuf, ()>> {
    if tag.focal.is_none() {
        sink.warn(
            STEP,
            &format!("no known focal length for {} {}", tag.make, tag.model),
        );
    }
    sink.info(
        STEP,
        &format!("tagging {} frames with {} {}", frames.len(), tag.make, tag.model),
    );

    process_all(
        frames,
        |frame| {
            let argv = tag.exiftool_argv(&[frame.as_path()]);
            let result = runner.run_argv(STEP, &argv, sink)?;
            match result.status {
                StageStatus::Succeeded => Ok(()),
                StageStatus::Failed(code) => Err(ReconError::StageExecution {
                    step: STEP.to_string(),
                    code: Some(code),
                    reason: format!("exiftool failed on {}", frame.display()),
                }
                .into()),
            }
        },
        max_workers,
    )
}
