//! Gaussian-splat training on top of a COLMAP model.
use crate::config::GsplatConfig;
use crate::pipeline::PipelinePlan;
use recon_core::{ExecutionContext, ReconError, ReconResult, StageSpec};
use std::path::Path;

/// `source` is the COLMAP output folder (the one holding `sparse/0`).
pub fn gsplat_stage(
    cfg: &GsplatConfig,
    ctx: &ExecutionContext,
    images: &Path,
    source: &Path,
    model_path: &Path,
) -> ReconResult<StageSpec> {
    let mut spec = StageSpec::new("gsplat_train", "python")
        .service(&cfg.service)
        .value("train.py")
        .value(format!("--data_device={}", cfg.data_device))
        .value(format!("--resolution={}", cfg.resolution))
        .value(format!("--sh_degree={}", cfg.sh_degree))
        .value("--test_iterations=-1");
    if let Some(iterations) = cfg.iterations {
        spec = spec.value(format!("--iterations={iterations}"));
    }
    Ok(spec
        .host_path(ctx, "--source_path", source)?
        .host_path(ctx, "--model_path", model_path)?
        .host_path(ctx, "--images", images)?
        .output(model_path))
}

/// Training as a plan of its own, for a model reconstructed earlier.
pub fn gsplat_plan(
    cfg: &GsplatConfig,
    ctx: &ExecutionContext,
    images: &Path,
    source: &Path,
    model_path: &Path,
) -> ReconResult<PipelinePlan> {
    let points = source.join("sparse").join("0").join("points3D.bin");
    if !points.exists() {
        return Err(ReconError::Config(format!(
            "no sparse model to train from: {} missing",
            points.display()
        )));
    }
    Ok(PipelinePlan::new("gsplat")
        .ensure_dir(model_path)
        .summary_at(model_path.join("run-summary.json"))
        .step(gsplat_stage(cfg, ctx, images, source, model_path)?))
}
