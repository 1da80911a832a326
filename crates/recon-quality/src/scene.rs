//! Inspection of an OpenMVG `sfm_data.json` scene.
use recon_core::{ReconError, ReconResult};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneSummary {
    pub root_path: Option<String>,
    pub view_count: usize,
    /// Views with a reconstructed camera pose.
    pub pose_count: usize,
    /// Image path recorded for every view, `local_path` joined with `filename`.
    pub image_refs: Vec<String>,
}

impl SceneSummary {
    pub fn from_sfm_data_json(path: &Path) -> ReconResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReconError::io(path.display().to_string(), e))?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| ReconError::malformed(path, e.to_string()))?;
        Self::from_value(&value).map_err(|reason| ReconError::malformed(path, reason))
    }

    pub fn from_value(value: &Value) -> Result<Self, String> {
        let views = value
            .get("views")
            .and_then(Value::as_array)
            .ok_or("missing 'views' array")?;
        let pose_count = value
            .get("extrinsics")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);

        let image_refs = views
            .iter()
            .filter_map(|view| {
                let entry = view.get("value").unwrap_or(view);
                let data = entry
                    .get("ptr_wrapper")
                    .and_then(|w| w.get("data"))
                    .unwrap_or(entry);
                let filename = data.get("filename")?.as_str()?;
                let local = data.get("local_path").and_then(Value::as_str).unwrap_or("");
                Some(join_reference(local, filename))
            })
            .collect();

        Ok(Self {
            root_path: value
                .get("root_path")
                .and_then(Value::as_str)
                .map(str::to_string),
            view_count: views.len(),
            pose_count,
            image_refs,
        })
    }

    pub fn absolute_refs(&self) -> Vec<&str> {
        self.image_refs
            .iter()
            .map(String::as_str)
            .filter(|r| is_absolute_reference(r))
            .collect()
    }
}

fn join_reference(local: &str, filename: &str) -> String {
    if local.is_empty() || is_absolute_reference(filename) {
        filename.to_string()
    } else {
        format!("{}/{}", local.trim_end_matches('/'), filename)
    }
}

/// POSIX absolute or Windows drive-qualified.
pub fn is_absolute_reference(reference: &str) -> bool {
    let bytes = reference.as_bytes();
    reference.starts_with('/')
        || reference.starts_with('\\')
        || (bytes.len() >= 3
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && (bytes[2] == b'/' || bytes[2] == b'\\'))
}
