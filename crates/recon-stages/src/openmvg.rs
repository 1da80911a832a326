//! OpenMVG sparse reconstruction followed by OpenMVS densification,
//! meshing and optional texturing.
use crate::config::{OpenMvgConfig, PipelineConfig};
use crate::gates::{Checkpoint, MATCHES_SLOT};
use crate::pipeline::{PipelinePlan, PlannedStep};
use recon_core::{ExecutionContext, ReconResult, StageSpec};
use std::path::PathBuf;

/// Host-side layout of a project's OpenMVG/OpenMVS folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenMvgLayout {
    pub images: PathBuf,
    pub openmvg: PathBuf,
    pub matches: PathBuf,
    pub reconstruction: PathBuf,
    pub openmvs: PathBuf,
    pub visuals: PathBuf,
}

impl OpenMvgLayout {
    pub fn new(images: impl Into<PathBuf>, project: impl Into<PathBuf>) -> Self {
        let project = project.into();
        let openmvg = project.join("openmvg");
        Self {
            images: images.into(),
            matches: openmvg.join("matches"),
            reconstruction: openmvg.join("reconstruction_sequential"),
            openmvg,
            openmvs: project.join("openmvs"),
            visuals: project.join("visuals"),
        }
    }

    pub fn sfm_data(&self) -> PathBuf {
        self.openmvg.join("sfm_data.json")
    }

    pub fn candidate(&self, model: &str) -> PathBuf {
        self.matches.join(format!("matches.{model}.txt"))
    }

    pub fn scene_bin(&self) -> PathBuf {
        self.reconstruction.join("sfm_data.bin")
    }

    /// Reconstructed scene converted to JSON for inspection.
    pub fn scene_json(&self) -> PathBuf {
        self.reconstruction.join("sfm_data_scene.json")
    }

    pub fn mvs(&self, name: &str) -> PathBuf {
        self.openmvs.join(name)
    }

    pub fn summary(&self) -> PathBuf {
        self.openmvs.join("run-summary.json")
    }
}

fn openmvg(cfg: &OpenMvgConfig, name: &str, tool: &str) -> StageSpec {
    StageSpec::new(name, format!("openMVG_main_{tool}")).service(&cfg.service)
}

fn openmvs(cfg: &OpenMvgConfig, name: &str, tool: &str) -> StageSpec {
    StageSpec::new(name, tool).service(&cfg.mvs_service)
}

/// Image listing → features → putative matches → one geometric filter per
/// configured model (best file selected) → incremental SfM → scene JSON →
/// sparse PLY → OpenMVS densify → mesh → optional texture.
///
/// The scene is converted to JSON before the sparse export so the export
/// gates can read it.
pub fn openmvg_plan(
    config: &PipelineConfig,
    ctx: &ExecutionContext,
    layout: &OpenMvgLayout,
) -> ReconResult<PipelinePlan> {
    let cfg = &config.openmvg;
    let sfm_data = layout.sfm_data();
    let putative = layout.matches.join("matches.putative.bin");

    let mut plan = PipelinePlan::new("openmvg")
        .ensure_dir(&layout.openmvg)
        .ensure_dir(&layout.matches)
        .ensure_dir(&layout.reconstruction)
        .ensure_dir(&layout.openmvs)
        .ensure_dir(&layout.visuals)
        .summary_at(layout.summary())
        .step(
            openmvg(cfg, "image_listing", "SfMInit_ImageListing")
                .host_path(ctx, "-i", &layout.images)?
                .host_path(ctx, "-o", &layout.openmvg)?
                .opt("-d", &cfg.sensor_database)
                .output(&sfm_data),
        )
        .step(
            openmvg(cfg, "compute_features", "ComputeFeatures")
                .host_path(ctx, "-i", &sfm_data)?
                .host_path(ctx, "-o", &layout.matches)?
                .opt("-p", &cfg.describer_preset),
        )
        .step(
            openmvg(cfg, "compute_matches", "ComputeMatches")
                .host_path(ctx, "-i", &sfm_data)?
                .host_path(ctx, "-o", &putative)?
                .output(&putative),
        );

    let candidates: Vec<PathBuf> = cfg
        .geometric_models
        .iter()
        .map(|model| layout.candidate(model))
        .collect();
    for (i, model) in cfg.geometric_models.iter().enumerate() {
        let spec = openmvg(cfg, &format!("geometric_filter_{model}"), "GeometricFilter")
            .host_path(ctx, "-i", &sfm_data)?
            .host_path(ctx, "-m", &putative)?
            .opt("-g", model)
            .host_path(ctx, "-o", &candidates[i])?
            .output(&candidates[i]);
        let mut step = PlannedStep::new(spec);
        if i + 1 == cfg.geometric_models.len() {
            step = step.gate(Checkpoint::MatchSelection {
                candidates: candidates.clone(),
                slot: MATCHES_SLOT.to_string(),
            });
        }
        plan = plan.step(step);
    }

    let scene_bin = layout.scene_bin();
    let scene_json = layout.scene_json();
    let sparse_ply = layout.visuals.join("sparse.ply");
    let scene_mvs = layout.mvs("scene.mvs");
    let dense_mvs = layout.mvs("scene_dense.mvs");
    let dense_ply = layout.mvs("scene_dense.ply");
    let mesh_ply = layout.mvs("scene_dense_mesh.ply");

    plan = plan
        .step(
            PlannedStep::new(
                openmvg(cfg, "sfm", "SfM")
                    .opt("--sfm_engine", "INCREMENTAL")
                    .host_path(ctx, "-i", &sfm_data)?
                    .host_path(ctx, "-m", &layout.matches)?
                    .bound("-M", MATCHES_SLOT)
                    .host_path(ctx, "-o", &layout.reconstruction)?
                    .output(&scene_bin),
            )
            .gate(Checkpoint::ModelPresent {
                path: scene_bin.clone(),
            }),
        )
        .step(
            openmvg(cfg, "convert_scene", "ConvertSfM_DataFormat")
                .host_path(ctx, "-i", &scene_bin)?
                .host_path(ctx, "-o", &scene_json)?
                .flag("-V")
                .flag("-I")
                .flag("-E")
                .output(&scene_json),
        )
        .step(
            PlannedStep::new(
                openmvg(cfg, "export_sparse", "ConvertSfM_DataFormat")
                    .host_path(ctx, "-i", &scene_bin)?
                    .host_path(ctx, "-o", &sparse_ply)?
                    .output(&sparse_ply),
            )
            .gate(Checkpoint::SparsePoses {
                sfm_data_json: scene_json.clone(),
            })
            .gate(Checkpoint::PathHygiene {
                sfm_data_json: scene_json,
            }),
        )
        .step(
            openmvg(cfg, "export_mvs", "openMVG2openMVS")
                .host_path(ctx, "-i", &scene_bin)?
                .host_path(ctx, "-o", &scene_mvs)?
                .host_path(ctx, "-d", layout.mvs("undistorted"))?
                .output(&scene_mvs),
        )
        .step(
            PlannedStep::new(
                openmvs(cfg, "densify", "DensifyPointCloud")
                    .host_path(ctx, "-i", &scene_mvs)?
                    .host_path(ctx, "-o", &dense_mvs)?
                    .host_path(ctx, "-w", &layout.openmvs)?
                    .output(&dense_ply),
            )
            .gate(Checkpoint::DensePoints { ply: dense_ply }),
        )
        .step(
            PlannedStep::new(
                openmvs(cfg, "reconstruct_mesh", "ReconstructMesh")
                    .host_path(ctx, "-i", &dense_mvs)?
                    .host_path(ctx, "-o", &mesh_ply)?
                    .host_path(ctx, "-w", &layout.openmvs)?
                    .output(&mesh_ply),
            )
            .gate(Checkpoint::ModelPresent {
                path: mesh_ply.clone(),
            }),
        );

    if cfg.texturing {
        let textured = layout.mvs("scene_dense_mesh_texture.mvs");
        plan = plan.step(
            openmvs(cfg, "texture_mesh", "TextureMesh")
                .host_path(ctx, "-i", &dense_mvs)?
                .host_path(ctx, "--mesh-file", &mesh_ply)?
                .host_path(ctx, "-o", &textured)?
                .host_path(ctx, "-w", &layout.openmvs)?
                .output(textured),
        );
    }
    Ok(plan)
}
