//! Execution Context: project root on the host and its mirror inside the
//! isolated tool environment.
//!
//! Every path handed to an external tool goes through [`ExecutionContext::to_container`].
//! Paths that do not resolve under `host_root` are rejected with
//! [`ReconError::OutOfRoot`]; nothing outside the mounted project is ever
//! translated.
use crate::error::{ReconError, ReconResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A POSIX path as seen inside the container namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerPath(String);

impl ContainerPath {
    /// Builds a container path, collapsing `.`/`..` segments and duplicate
    /// separators. Fails if `..` climbs above `/`.
    pub fn new(raw: &str) -> ReconResult<Self> {
        let absolute = raw.starts_with('/');
        let mut parts: Vec<&str> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() && absolute {
                        return Err(ReconError::InvalidPath(format!(
                            "container path {raw} escapes /"
                        )));
                    }
                }
                other => parts.push(other),
            }
        }
        let joined = parts.join("/");
        Ok(Self(if absolute { format!("/{joined}") } else { joined }))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends a relative suffix, one segment at a time.
    pub fn join(&self, suffix: &str) -> ReconResult<Self> {
        if suffix.starts_with('/') {
            return Err(ReconError::InvalidPath(format!(
                "cannot join absolute suffix {suffix} onto {self}"
            )));
        }
        Self::new(&format!("{}/{}", self.0, suffix))
    }

    /// Relative suffix of `self` below `root`, `None` when `self` is not
    /// `root` or one of its descendants.
    pub fn strip_root(&self, root: &ContainerPath) -> Option<&str> {
        if self.0 == root.0 {
            return Some("");
        }
        let prefix = if root.0.ends_with('/') {
            root.0.clone()
        } else {
            format!("{}/", root.0)
        };
        self.0.strip_prefix(prefix.as_str())
    }
}

impl fmt::Display for ContainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionContext {
    pub run_id: String,
    host_root: PathBuf,
    container_root: ContainerPath,
}

impl ExecutionContext {
    pub fn new(host_root: impl AsRef<Path>, container_root: &str) -> ReconResult<Self> {
        let host_root = resolve(host_root.as_ref())?;
        let container_root = ContainerPath::new(container_root)?;
        if !container_root.as_str().starts_with('/') {
            return Err(ReconError::Config(format!(
                "container root must be absolute, got {container_root}"
            )));
        }
        Ok(Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            host_root,
            container_root,
        })
    }

    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    pub fn container_root(&self) -> &ContainerPath {
        &self.container_root
    }

    /// Absolute, symlink-resolved form of `path` (see [`resolve`]).
    pub fn normalize(&self, path: &Path) -> ReconResult<PathBuf> {
        resolve(path)
    }

    pub fn contains(&self, host_path: &Path) -> bool {
        resolve(host_path)
            .map(|p| p.starts_with(&self.host_root))
            .unwrap_or(false)
    }

    /// Maps a host path into the container namespace by substituting the
    /// root prefix on the relative suffix.
    pub fn to_container(&self, host_path: impl AsRef<Path>) -> ReconResult<ContainerPath> {
        let host_path = host_path.as_ref();
        let resolved = resolve(host_path)?;
        let suffix = resolved
            .strip_prefix(&self.host_root)
            .map_err(|_| ReconError::OutOfRoot {
                path: host_path.to_path_buf(),
                root: self.host_root.clone(),
            })?;

        let mut segments = Vec::new();
        for component in suffix.components() {
            let segment = component.as_os_str().to_str().ok_or_else(|| {
                ReconError::InvalidPath(format!("{} is not valid UTF-8", resolved.display()))
            })?;
            segments.push(segment);
        }
        if segments.is_empty() {
            return Ok(self.container_root.clone());
        }
        self.container_root.join(&segments.join("/"))
    }

    /// Inverse of [`to_container`](Self::to_container).
    pub fn to_host(&self, container_path: &str) -> ReconResult<PathBuf> {
        let normalized = ContainerPath::new(container_path)?;
        let suffix = normalized
            .strip_root(&self.container_root)
            .ok_or_else(|| ReconError::OutOfRoot {
                path: PathBuf::from(container_path),
                root: PathBuf::from(self.container_root.as_str()),
            })?;

        let mut host = self.host_root.clone();
        for segment in suffix.split('/').filter(|s| !s.is_empty()) {
            host.push(segment);
        }
        Ok(host)
    }

    /// Owner of the project root, used to run containers as that user.
    #[cfg(unix)]
    pub fn owner_ids(&self) -> Option<(u32, u32)> {
        use std::os::unix::fs::MetadataExt;
        std::fs::metadata(&self.host_root)
            .ok()
            .map(|meta| (meta.uid(), meta.gid()))
    }

    #[cfg(not(unix))]
    pub fn owner_ids(&self) -> Option<(u32, u32)> {
        None
    }
}

/// Absolute, symlink-resolved form of a host path.
///
/// Existing paths are canonicalized. For paths that do not exist yet (output
/// folders a tool is about to create) the longest existing ancestor is
/// canonicalized and the remaining lexically-normalized components appended.
pub fn resolve(path: &Path) -> ReconResult<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| ReconError::io("current directory", e))?
            .join(path)
    };

    if let Ok(canonical) = absolute.canonicalize() {
        return Ok(canonical);
    }

    let lexical = normalize_lexically(&absolute);
    let mut existing = lexical.as_path();
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            for name in tail.iter().rev() {
                out.push(name);
            }
            return Ok(out);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(lexical),
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}
