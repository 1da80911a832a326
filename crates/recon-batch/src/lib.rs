//! Recon Batch: bounded-concurrency processing of independent files
//!
//! The front end of a reconstruction: frames are extracted from videos,
//! tagged with camera metadata and optionally filtered, one worker per
//! file. Failures stay with their item and never cancel siblings.

pub mod error;
pub mod executor;
pub mod filter;
pub mod frames;
pub mod tagging;

pub use error::{BatchError, BatchResult};
pub use executor::{process_all, BatchConfig, BatchReport, ItemOutcome};
pub use filter::{filter_images, list_images, ImageFilter};
pub use frames::{
    extract_and_tag, extract_folder, extract_frames, ffmpeg_argv, find_videos, list_frames,
    FrameOptions,
};
pub use tagging::{normalize_model, probe_camera_model, tag_frames, CameraTag, FocalLength};
