//! Pipeline configuration
//!
//! One YAML document drives a run. Every section and field is defaulted,
//! so an empty file is a valid configuration.

use recon_batch::{BatchConfig, FrameOptions, ImageFilter};
use recon_core::{ExecutionContext, Launcher, ReconError, ReconResult};
use recon_quality::GateProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Host directory mounted into the tool containers
    pub project_root: PathBuf,
    /// Where `project_root` appears inside the containers
    pub container_root: String,
    pub launcher: LauncherConfig,
    pub colmap: ColmapConfig,
    pub openmvg: OpenMvgConfig,
    /// Gaussian-splat training after COLMAP; disabled when absent
    pub gsplat: Option<GsplatConfig>,
    pub gates: GateProfile,
    pub batch: BatchConfig,
    pub frames: FrameOptions,
    pub filter: Option<ImageFilter>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("projects"),
            container_root: "/projects".to_string(),
            launcher: LauncherConfig::default(),
            colmap: ColmapConfig::default(),
            openmvg: OpenMvgConfig::default(),
            gsplat: None,
            gates: GateProfile::default(),
            batch: BatchConfig::default(),
            frames: FrameOptions::default(),
            filter: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> ReconResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ReconError::Config(format!("pipeline config: {e}")))?;
        config.gates.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ReconResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReconError::io(path.display().to_string(), e))?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> ReconResult<String> {
        serde_yaml::to_string(self).map_err(|e| ReconError::Config(e.to_string()))
    }

    /// Fresh context for one run. The project root must exist.
    pub fn context(&self) -> ReconResult<ExecutionContext> {
        if !self.project_root.is_dir() {
            return Err(ReconError::Config(format!(
                "project root {} is not a directory",
                self.project_root.display()
            )));
        }
        ExecutionContext::new(&self.project_root, &self.container_root)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    #[default]
    Container,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub mode: LaunchMode,
    pub program: String,
    pub args: Vec<String>,
    /// Pass `--user uid:gid` of the project root owner
    pub run_as_owner: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            mode: LaunchMode::Container,
            program: "docker".to_string(),
            args: vec!["compose".into(), "run".into(), "--rm".into()],
            run_as_owner: true,
        }
    }
}

impl LauncherConfig {
    pub fn launcher(&self, ctx: &ExecutionContext) -> Launcher {
        match self.mode {
            LaunchMode::Local => Launcher::Local,
            LaunchMode::Container => {
                let launcher = Launcher::Container {
                    program: self.program.clone(),
                    args: self.args.clone(),
                    user: None,
                };
                if self.run_as_owner {
                    launcher.as_owner_of(ctx)
                } else {
                    launcher
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
    #[default]
    Sequential,
    Exhaustive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColmapConfig {
    pub service: String,
    pub matcher: Matcher,
    /// Neighbours matched forward and backward by the sequential matcher
    pub overlap: u32,
    pub threads: u32,
    pub max_image_size: u32,
    pub single_camera: bool,
    pub camera_model: Option<String>,
    pub use_gpu: bool,
    pub point_filtering: Option<PointFiltering>,
}

impl Default for ColmapConfig {
    fn default() -> Self {
        Self {
            service: "colmap".to_string(),
            matcher: Matcher::Sequential,
            overlap: 5,
            threads: 8,
            max_image_size: 3200,
            single_camera: true,
            camera_model: Some("PINHOLE".to_string()),
            use_gpu: false,
            point_filtering: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointFiltering {
    pub min_track_len: u32,
    pub max_reproj_error: f64,
    pub min_tri_angle: f64,
}

impl Default for PointFiltering {
    fn default() -> Self {
        Self {
            min_track_len: 2,
            max_reproj_error: 4.0,
            min_tri_angle: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenMvgConfig {
    pub service: String,
    pub mvs_service: String,
    pub sensor_database: String,
    pub describer_preset: String,
    /// One geometric filter run per model; the best match file wins
    pub geometric_models: Vec<String>,
    pub texturing: bool,
}

impl Default for OpenMvgConfig {
    fn default() -> Self {
        Self {
            service: "openmvg".to_string(),
            mvs_service: "openmvs".to_string(),
            sensor_database: "/usr/local/share/openMVG/sensor_width_camera_database.txt"
                .to_string(),
            describer_preset: "NORMAL".to_string(),
            geometric_models: vec!["f".to_string(), "e".to_string()],
            texturing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GsplatConfig {
    pub service: String,
    pub resolution: u32,
    pub sh_degree: u32,
    pub data_device: String,
    pub iterations: Option<u32>,
}

impl Default for GsplatConfig {
    fn default() -> Self {
        Self {
            service: "gsplat2".to_string(),
            resolution: 8,
            sh_degree: 1,
            data_device: "cpu".to_string(),
            iterations: None,
        }
    }
}
