//! COLMAP sparse reconstruction plan.
use crate::config::{ColmapConfig, Matcher, PipelineConfig};
use crate::gates::Checkpoint;
use crate::gsplat::gsplat_stage;
use crate::pipeline::{PipelinePlan, PlannedStep};
use recon_core::{ExecutionContext, ReconResult, StageSpec};
use recon_quality::scenario_name;
use std::path::{Path, PathBuf};

/// Host-side layout of one COLMAP output folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColmapLayout {
    pub images: PathBuf,
    pub output: PathBuf,
    pub database: PathBuf,
    pub sparse: PathBuf,
    pub stats: PathBuf,
}

impl ColmapLayout {
    pub fn new(images: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        let output = output.into();
        Self {
            images: images.into(),
            database: output.join("db.db"),
            sparse: output.join("sparse"),
            stats: output.join("stats"),
            output,
        }
    }

    pub fn model(&self, name: &str) -> PathBuf {
        self.sparse.join(name)
    }

    pub fn model_ply(&self, name: &str) -> PathBuf {
        self.sparse.join(format!("{name}.ply"))
    }

    pub fn stats_json(&self, name: &str) -> PathBuf {
        self.stats.join(format!("model_analyzer-sparse-{name}.json"))
    }

    pub fn summary(&self) -> PathBuf {
        self.output.join("run-summary.json")
    }
}

fn colmap(cfg: &ColmapConfig, name: &str, command: &str) -> StageSpec {
    StageSpec::new(name, "colmap")
        .service(&cfg.service)
        .value(command)
}

fn flag(on: bool) -> u8 {
    u8::from(on)
}

pub fn feature_extractor(
    cfg: &ColmapConfig,
    ctx: &ExecutionContext,
    layout: &ColmapLayout,
) -> ReconResult<StageSpec> {
    let mut spec = colmap(cfg, "feature_extractor", "feature_extractor")
        .host_path(ctx, "--database_path", &layout.database)?
        .host_path(ctx, "--image_path", &layout.images)?
        .opt("--ImageReader.single_camera", flag(cfg.single_camera));
    if let Some(model) = &cfg.camera_model {
        spec = spec.opt("--ImageReader.camera_model", model);
    }
    Ok(spec
        .opt("--SiftExtraction.use_gpu", flag(cfg.use_gpu))
        .opt("--SiftExtraction.num_threads", cfg.threads)
        .opt("--SiftExtraction.estimate_affine_shape", 0)
        .opt("--SiftExtraction.domain_size_pooling", 0)
        .opt("--SiftExtraction.max_image_size", cfg.max_image_size)
        .output(&layout.database))
}

pub fn matcher(
    cfg: &ColmapConfig,
    ctx: &ExecutionContext,
    layout: &ColmapLayout,
) -> ReconResult<StageSpec> {
    let command = match cfg.matcher {
        Matcher::Sequential => "sequential_matcher",
        Matcher::Exhaustive => "exhaustive_matcher",
    };
    let spec = colmap(cfg, command, command)
        .host_path(ctx, "--database_path", &layout.database)?
        .opt("--SiftMatching.use_gpu", flag(cfg.use_gpu))
        .opt("--SiftMatching.num_threads", cfg.threads);
    Ok(match cfg.matcher {
        Matcher::Sequential => spec.opt("--SequentialMatching.overlap", cfg.overlap),
        Matcher::Exhaustive => spec,
    })
}

pub fn mapper(
    cfg: &ColmapConfig,
    ctx: &ExecutionContext,
    layout: &ColmapLayout,
) -> ReconResult<StageSpec> {
    Ok(colmap(cfg, "mapper", "mapper")
        .host_path(ctx, "--database_path", &layout.database)?
        .host_path(ctx, "--image_path", &layout.images)?
        .host_path(ctx, "--output_path", &layout.sparse)?
        .opt("--Mapper.num_threads", cfg.threads)
        .output(layout.model("0").join("points3D.bin")))
}

pub fn model_converter(
    cfg: &ColmapConfig,
    ctx: &ExecutionContext,
    name: &str,
    model: &Path,
    ply: &Path,
) -> ReconResult<StageSpec> {
    Ok(colmap(cfg, name, "model_converter")
        .host_path(ctx, "--input_path", model)?
        .host_path(ctx, "--output_path", ply)?
        .opt("--output_type", "PLY")
        .output(ply))
}

pub fn model_analyzer(
    cfg: &ColmapConfig,
    ctx: &ExecutionContext,
    name: &str,
    model: &Path,
) -> ReconResult<StageSpec> {
    colmap(cfg, name, "model_analyzer").host_path(ctx, "--path", model)
}

/// Converts and analyzes one sparse model; the analyzer step is gated.
fn export_and_analyze(
    cfg: &ColmapConfig,
    ctx: &ExecutionContext,
    layout: &ColmapLayout,
    model_name: &str,
    suffix: &str,
) -> ReconResult<[PlannedStep; 2]> {
    let model = layout.model(model_name);
    let converter = model_converter(
        cfg,
        ctx,
        &format!("model_converter{suffix}"),
        &model,
        &layout.model_ply(model_name),
    )?;
    let analyzer = model_analyzer(cfg, ctx, &format!("model_analyzer{suffix}"), &model)?;
    Ok([
        PlannedStep::new(converter),
        PlannedStep::new(analyzer).gate(Checkpoint::AnalyzerMetrics {
            stats_json: layout.stats_json(model_name),
            scenario: scenario_name(&model),
        }),
    ])
}

/// feature extraction → matching → mapping → PLY export → analysis, then
/// optional point filtering and Gaussian-splat training.
pub fn colmap_plan(
    config: &PipelineConfig,
    ctx: &ExecutionContext,
    layout: &ColmapLayout,
) -> ReconResult<PipelinePlan> {
    let cfg = &config.colmap;
    let points = layout.model("0").join("points3D.bin");

    let mut plan = PipelinePlan::new("colmap")
        .ensure_dir(&layout.output)
        .ensure_dir(&layout.sparse)
        .ensure_dir(&layout.stats)
        .summary_at(layout.summary())
        .step(feature_extractor(cfg, ctx, layout)?)
        .step(matcher(cfg, ctx, layout)?)
        .step(
            PlannedStep::new(mapper(cfg, ctx, layout)?)
                .gate(Checkpoint::ModelPresent { path: points }),
        );

    for step in export_and_analyze(cfg, ctx, layout, "0", "")? {
        plan = plan.step(step);
    }

    if let Some(filtering) = &cfg.point_filtering {
        let filtered = layout.model("filtered");
        let spec = colmap(cfg, "point_filtering", "point_filtering")
            .host_path(ctx, "--input_path", layout.model("0"))?
            .host_path(ctx, "--output_path", &filtered)?
            .opt("--min_track_len", filtering.min_track_len)
            .opt("--max_reproj_error", filtering.max_reproj_error)
            .opt("--min_tri_angle", filtering.min_tri_angle)
            .output(filtered.join("points3D.bin"));
        plan = plan.ensure_dir(&filtered).step(spec);
        for step in export_and_analyze(cfg, ctx, layout, "filtered", "_filtered")? {
            plan = plan.step(step);
        }
    }

    if let Some(gsplat) = &config.gsplat {
        let model_path = layout.output.join("gsplat");
        plan = plan
            .ensure_dir(&model_path)
            .step(gsplat_stage(gsplat, ctx, &layout.images, &layout.output, &model_path)?);
    }
    Ok(plan)
}
