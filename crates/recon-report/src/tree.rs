//! Folder tree of a data directory.
//!
//! Serializes to the nested-map form used by the templates: one key per
//! subdirectory, plus `__files__` when the directory holds files.

use recon_core::{ReconError, ReconResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FolderTree {
    #[serde(flatten)]
    pub dirs: BTreeMap<String, FolderTree>,
    #[serde(rename = "__files__", skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl FolderTree {
    /// Recursively walks `dir`. Entries that are neither files nor
    /// directories (sockets, dangling links) are skipped.
    pub fn walk(dir: &Path) -> ReconResult<Self> {
        let mut tree = FolderTree::default();
        let entries =
            std::fs::read_dir(dir).map_err(|e| ReconError::io(dir.display().to_string(), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ReconError::io(dir.display().to_string(), e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.is_dir() {
                tree.dirs.insert(name, Self::walk(&path)?);
            } else if path.is_file() {
                tree.files.push(name);
            }
        }
        tree.files.sort();
        Ok(tree)
    }

    pub fn subfolders(&self) -> Vec<&str> {
        self.dirs.keys().map(String::as_str).collect()
    }
}

/// One entry per top-level directory of `root`; files directly under the
/// root are not projects and are left out.
pub fn build_tree(root: &Path) -> ReconResult<BTreeMap<String, FolderTree>> {
    if !root.is_dir() {
        return Err(ReconError::Config(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    let mut projects = BTreeMap::new();
    let entries =
        std::fs::read_dir(root).map_err(|e| ReconError::io(root.display().to_string(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ReconError::io(root.display().to_string(), e))?;
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            projects.insert(name, FolderTree::walk(&path)?);
        }
    }
    Ok(projects)
}
