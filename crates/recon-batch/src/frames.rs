//! Frame extraction from drone videos.
use crate::error::BatchResult;
use crate::executor::{process_all, BatchReport};
use crate::tagging::{probe_camera_model, tag_frames, CameraTag};
use recon_core::{LogSink, ReconError, ReconResult, StageStatus, SubprocessRunner};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const STEP: &str = "extract-frames";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameOptions {
    /// Frames sampled per second of video
    pub fps: f64,
    /// Seconds skipped at the start of every video
    pub skip_seconds: f64,
    pub threads: u32,
    /// JPEG quality scale passed to `-q:v` (2 is near lossless)
    pub quality: u32,
    /// Stop after this many seconds of input
    pub capture_seconds: Option<f64>,
    /// Write camera make/model/focal tags into the frames
    pub tag_camera: bool,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            fps: 1.0,
            skip_seconds: 5.0,
            threads: 8,
            quality: 2,
            capture_seconds: None,
            tag_camera: true,
        }
    }
}

fn stem(video: &Path) -> String {
    video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string())
}

pub fn frame_template(video: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}_frame_%05d.jpg", stem(video)))
}

pub fn ffmpeg_argv(video: &Path, output_dir: &Path, opts: &FrameOptions) -> Vec<String> {
    let mut argv = vec![
        "ffmpeg".to_string(),
        "-threads".to_string(),
        opts.threads.to_string(),
    ];
    if let Some(seconds) = opts.capture_seconds {
        argv.push("-t".to_string());
        argv.push(seconds.to_string());
    }
    argv.extend([
        "-ss".to_string(),
        opts.skip_seconds.to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-vf".to_string(),
        format!("fps={},format=yuv420p", opts.fps),
        "-q:v".to_string(),
        opts.quality.to_string(),
        frame_template(video, output_dir).display().to_string(),
    ]);
    argv
}

/// Frames previously extracted from `video` into `output_dir`, sorted.
pub fn list_frames(video: &Path, output_dir: &Path) -> ReconResult<Vec<PathBuf>> {
    let prefix = format!("{}_frame_", stem(video));
    let entries = std::fs::read_dir(output_dir)
        .map_err(|e| ReconError::io(output_dir.display().to_string(), e))?;

    let mut frames: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(&prefix) && n.ends_with(".jpg"))
        })
        .collect();
    frames.sort();
    Ok(frames)
}

/// `*.MP4` / `*.mp4` files directly inside `dir`, sorted.
pub fn find_videos(dir: &Path) -> ReconResult<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| ReconError::io(dir.display().to_string(), e))?;
    let mut videos: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| e == "MP4" || e == "mp4")
        })
        .collect();
    videos.sort();
    Ok(videos)
}

/// Runs ffmpeg for one video and returns the frames it produced.
pub fn extract_frames(
    video: &Path,
    output_dir: &Path,
    opts: &FrameOptions,
    runner: &SubprocessRunner,
    sink: &dyn LogSink,
) -> ReconResult<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .map_err(|e| ReconError::io(output_dir.display().to_string(), e))?;

    let argv = ffmpeg_argv(video, output_dir, opts);
    let result = runner.run_argv(STEP, &argv, sink)?;
    if let StageStatus::Failed(code) = result.status {
        return Err(ReconError::StageExecution {
            step: STEP.to_string(),
            code: Some(code),
            reason: format!("ffmpeg failed on {}", video.display()),
        });
    }

    let frames = list_frames(video, output_dir)?;
    sink.info(
        STEP,
        &format!("{} frames from {}", frames.len(), video.display()),
    );
    Ok(frames)
}

/// Extracts frames and, when enabled, tags them with the video's camera.
pub fn extract_and_tag(
    video: &Path,
    output_dir: &Path,
    opts: &FrameOptions,
    runner: &SubprocessRunner,
    max_workers: usize,
    sink: &dyn LogSink,
) -> ReconResult<Vec<PathBuf>> {
    let frames = extract_frames(video, output_dir, opts, runner, sink)?;
    if !opts.tag_camera || frames.is_empty() {
        return Ok(frames);
    }

    let tag = CameraTag::from_probe(&probe_camera_model(video, runner, sink));
    let report = tag_frames(frames.clone(), &tag, runner, max_workers, sink)?;
    for (frame, err) in report.failures() {
        sink.warn(STEP, &format!("tagging {} failed: {err}", frame.display()));
    }
    Ok(frames)
}

/// Processes every video of a folder through the worker pool.
pub fn extract_folder(
    video_dir: &Path,
    output_dir: &Path,
    opts: &FrameOptions,
    runner: &SubprocessRunner,
    max_workers: usize,
    sink: &dyn LogSink,
) -> BatchResult<BatchReport<PathBuf, Vec<PathBuf>>> {
    let videos = find_videos(video_dir)?;
    sink.info(
        STEP,
        &format!("{} videos in {}", videos.len(), video_dir.display()),
    );

    // Tagging inside a video job runs single-threaded; the pool is already
    // spread across videos.
    let report = process_all(
        videos,
        |video| {
            extract_and_tag(video, output_dir, opts, runner, 1, sink).map_err(Into::into)
        },
        max_workers,
    )?;
    for (video, err) in report.failures() {
        sink.error(STEP, &format!("{}: {err}", video.display()));
    }
    Ok(report)
}
