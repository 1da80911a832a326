//! External per-image filtering (masking, denoising, resizing).
//!
//! The converter is any program taking an input and an output path; the
//! `{input}` and `{output}` tokens in its argument list are replaced as
//! whole arguments, never spliced into a larger string.

use crate::error::BatchResult;
use crate::executor::{process_all, BatchReport};
use recon_core::{LogSink, ReconError, ReconResult, StageStatus, SubprocessRunner};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const STEP: &str = "filter-images";
const INPUT_TOKEN: &str = "{input}";
const OUTPUT_TOKEN: &str = "{output}";
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFilter {
    pub program: String,
    pub args: Vec<String>,
    /// Output extension; defaults to the input's.
    #[serde(default)]
    pub extension: Option<String>,
}

impl ImageFilter {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            extension: None,
        }
    }

    pub fn argv(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend(self.args.iter().map(|arg| match arg.as_str() {
            INPUT_TOKEN => input.display().to_string(),
            OUTPUT_TOKEN => output.display().to_string(),
            other => other.to_string(),
        }));
        argv
    }

    pub fn output_for(&self, input: &Path, output_dir: &Path) -> PathBuf {
        let name = input.file_name().map(PathBuf::from).unwrap_or_default();
        let target = output_dir.join(name);
        match &self.extension {
            Some(ext) => target.with_extension(ext),
            None => target,
        }
    }
}

pub fn list_images(dir: &Path) -> ReconResult<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| ReconError::io(dir.display().to_string(), e))?;
    let mut images: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    images.sort();
    Ok(images)
}

/// Runs the filter over every image; returns the produced output paths.
pub fn filter_images(
    filter: &ImageFilter,
    inputs: Vec<PathBuf>,
    output_dir: &Path,
    runner: &SubprocessRunner,
    max_workers: usize,
    sink: &dyn LogSink,
) -> BatchResult<BatchReport<PathBuf, PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .map_err(|e| ReconError::io(output_dir.display().to_string(), e))?;

    let report = process_all(
        inputs,
        |input| {
            let output = filter.output_for(input, output_dir);
            let result = runner.run_argv(STEP, &filter.argv(input, &output), sink)?;
            match result.status {
                StageStatus::Succeeded if output.exists() => Ok(output),
                StageStatus::Succeeded => Err(ReconError::malformed(
                    output,
                    "filter exited 0 but wrote no output",
                )
                .into()),
                StageStatus::Failed(code) => Err(ReconError::StageExecution {
                    step: STEP.to_string(),
                    code: Some(code),
                    reason: format!("{} failed on {}", filter.program, input.display()),
                }
                .into()),
            }
        },
        max_workers,
    )?;

    for (input, err) in report.failures() {
        sink.warn(STEP, &format!("{}: {err}", input.display()));
    }
    sink.info(
        STEP,
        &format!(
            "{} of {} images filtered",
            report.success_count(),
            report.len()
        ),
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::MemorySink;

    #[test]
    fn test_tokens_replace_whole_arguments() {
        let filter = ImageFilter::new(
            "magick",
            ["{input}", "-resize", "50%", "{output}", "x{input}"],
        );
        let argv = filter.argv(Path::new("/in/a b.jpg"), Path::new("/out/a b.jpg"));
        assert_eq!(
            argv,
            vec!["magick", "/in/a b.jpg", "-resize", "50%", "/out/a b.jpg", "x{input}"]
        );
    }

    #[test]
    fn test_output_extension_override() {
        let mut filter = ImageFilter::new("conv", ["{input}", "{output}"]);
        assert_eq!(
            filter.output_for(Path::new("/in/f.jpg"), Path::new("/out")),
            PathBuf::from("/out/f.jpg")
        );
        filter.extension = Some("png".into());
        assert_eq!(
            filter.output_for(Path::new("/in/f.jpg"), Path::new("/out")),
            PathBuf::from("/out/f.png")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_partial_success_across_batch() {
        let dir = tempfile::tempdir().unwrap();
        let input_dir = dir.path().join("in");
        std::fs::create_dir(&input_dir).unwrap();
        for name in ["a.jpg", "b.jpg", "bad.jpg", "notes.txt"] {
            std::fs::write(input_dir.join(name), name).unwrap();
        }

        // Copies the file unless its name contains "bad".
        let filter = ImageFilter::new(
            "sh",
            [
                "-c",
                "case \"$1\" in *bad*) exit 4;; *) cp \"$1\" \"$2\";; esac",
                "filter",
                "{input}",
                "{output}",
            ],
        );
        let inputs = list_images(&input_dir).unwrap();
        assert_eq!(inputs.len(), 3);

        let sink = MemorySink::new();
        let out = dir.path().join("out");
        let report =
            filter_images(&filter, inputs, &out, &SubprocessRunner::local(), 2, &sink).unwrap();

        assert_eq!(report.success_count(), 2);
        let (failed, err) = report.failures().next().unwrap();
        assert!(failed.ends_with("bad.jpg"));
        assert!(err.to_string().contains("BATCH/ITEM"));
        assert!(out.join("a.jpg").exists());
        assert!(!out.join("bad.jpg").exists());
    }
}
