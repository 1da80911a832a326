//! Recon Report: Quarto pages for a directory of reconstruction projects
//!
//! Walks a data directory, writes an `index.qmd` linking every project and
//! one `<project>.qmd` per project whose name carries the configured prefix.
//! Project pages list folders and files and tabulate any model statistics
//! persisted by the analyzer gate.
//!
//! # Example
//!
//! ```ignore
//! use recon_report::{write_report, ReportOptions, TemplatesFile};
//!
//! let written = write_report(
//!     "projects".as_ref(),
//!     "site".as_ref(),
//!     TemplatesFile::builtin(),
//!     &ReportOptions::default(),
//! )?;
//! ```

pub mod renderer;
pub mod templates;
pub mod tree;

use recon_core::ReconError;
use recon_quality::ModelStats;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub use renderer::TemplateRenderer;
pub use templates::{TemplatesFile, INDEX_TEMPLATE, PROJECT_TEMPLATE};
pub use tree::{build_tree, FolderTree};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("REPORT/TEMPLATE: {0}")]
    Template(String),
    #[error("REPORT/RENDER: {0}")]
    Render(String),
    #[error(transparent)]
    Recon(#[from] ReconError),
}

impl From<ReportError> for ReconError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::Recon(inner) => inner,
            other => ReconError::Config(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    /// Only projects whose name starts with this get their own page.
    pub project_prefix: String,
    /// Where persisted model statistics live, relative to a project.
    pub stats_dir: PathBuf,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            project_prefix: "DJI".to_string(),
            stats_dir: PathBuf::from("colmap/stats"),
        }
    }
}

/// Renders the report for `data_dir` into `dest`, returning the files
/// written (index first).
pub fn write_report(
    data_dir: &Path,
    dest: &Path,
    templates: TemplatesFile,
    options: &ReportOptions,
) -> Result<Vec<PathBuf>, ReportError> {
    let tree = build_tree(data_dir)?;
    let renderer = TemplateRenderer::new(templates)?;
    std::fs::create_dir_all(dest).map_err(|e| ReconError::io(dest.display().to_string(), e))?;

    let mut written = Vec::new();
    let index = renderer.render(INDEX_TEMPLATE, &index_data(&tree))?;
    written.push(write_page(&dest.join("index.qmd"), &index)?);

    for (project, contents) in &tree {
        if !project.starts_with(&options.project_prefix) {
            continue;
        }
        let stats = project_stats(&data_dir.join(project).join(&options.stats_dir));
        let page = renderer.render(PROJECT_TEMPLATE, &project_data(project, contents, &stats))?;
        written.push(write_page(&dest.join(format!("{project}.qmd")), &page)?);
    }
    Ok(written)
}

fn write_page(path: &Path, contents: &str) -> Result<PathBuf, ReportError> {
    std::fs::write(path, contents).map_err(|e| ReconError::io(path.display().to_string(), e))?;
    info!(page = %path.display(), "wrote report page");
    Ok(path.to_path_buf())
}

pub fn index_data(tree: &BTreeMap<String, FolderTree>) -> Value {
    json!({ "projects": tree.keys().collect::<Vec<_>>() })
}

pub fn project_data(project: &str, contents: &FolderTree, stats: &[ModelStats]) -> Value {
    let folders: Vec<Value> = contents
        .dirs
        .iter()
        .map(|(name, sub)| {
            json!({
                "name": name,
                "subfolders": sub.subfolders(),
                "files": sub.files,
            })
        })
        .collect();
    let stats: Vec<Value> = stats
        .iter()
        .map(|s| {
            json!({
                "scenario": s.scenario,
                "timestamp": s.timestamp,
                "cameras": s.cameras.to_string(),
                "images": s.images.to_string(),
                "registered_images": s.registered_images.to_string(),
                "points3d": s.points3d.to_string(),
                "observations": s.observations.to_string(),
                "mean_track_length": s.mean_track_length.to_string(),
                "mean_observations_per_image": s.mean_observations_per_image.to_string(),
                "mean_reprojection_error": s.mean_reprojection_error.to_string(),
            })
        })
        .collect();

    json!({
        "project": project,
        "folders": folders,
        "root_files": contents.files,
        "stats": stats,
    })
}

/// Every readable `*.json` stats record in `dir`, in file-name order.
/// Unreadable records are skipped with a warning.
pub fn project_stats(dir: &Path) -> Vec<ModelStats> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    paths
        .iter()
        .filter_map(|path| match ModelStats::load(path) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping stats record");
                None
            }
        })
        .collect()
}
