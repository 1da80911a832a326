//! Recon CLI
//!
//! Drives photogrammetry reconstructions: frame extraction, COLMAP and
//! OpenMVG/OpenMVS pipelines, quality checks and project reports.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recon_batch::{extract_and_tag, extract_folder, filter_images};
use recon_core::{ExecutionContext, LogSink, ReconError, SubprocessRunner, TracingSink};
use recon_quality::{
    count_ply_vertices, parse_model_analyzer, persist_model_stats, scenario_name, select_best,
    GateProfile, ModelStats,
};
use recon_report::{write_report, ReportOptions, TemplatesFile};
use recon_stages::{
    colmap_plan, gsplat_plan, openmvg_plan, ColmapLayout, OpenMvgLayout, PipelineConfig,
    PipelineDriver, PipelinePlan,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "recon")]
#[command(about = "Photogrammetry pipeline orchestration with quality gates", long_about = None)]
struct Cli {
    /// Pipeline configuration (YAML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Gate profile preset, overriding the configuration's
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract frames from a video, or from every video in a folder
    Extract {
        input: PathBuf,
        output: PathBuf,
        /// Skip EXIF camera tagging
        #[arg(long)]
        no_tag: bool,
        /// Run the configured image filter over the frames into this folder
        #[arg(long)]
        filtered: Option<PathBuf>,
    },

    /// COLMAP sparse reconstruction (plus optional filtering and splatting)
    Colmap { images: PathBuf, output: PathBuf },

    /// OpenMVG SfM followed by OpenMVS densification and meshing
    Openmvg { images: PathBuf, project: PathBuf },

    /// Gaussian-splat training on an existing COLMAP model
    Gsplat {
        images: PathBuf,
        /// COLMAP output folder holding sparse/0
        source: PathBuf,
        model_path: PathBuf,
    },

    /// Pick the best of several match files
    SelectMatches {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        min_score: Option<i64>,
        #[arg(long)]
        min_per_pair: Option<usize>,
    },

    /// Parse a saved model-analyzer log
    AnalyzeLog {
        log: PathBuf,
        /// Persist the statistics (and raw text) here
        #[arg(long)]
        stats_json: Option<PathBuf>,
        /// Scenario label; derived from the path when omitted
        #[arg(long)]
        scenario: Option<String>,
    },

    /// Vertex count from a PLY header
    PlyCount { ply: PathBuf },

    /// Quarto pages for a folder of projects
    Report {
        data: PathBuf,
        output: PathBuf,
        /// Projects with their own page must start with this
        #[arg(long)]
        prefix: Option<String>,
        /// Templates YAML laid over the built-in ones
        #[arg(long)]
        templates: Option<PathBuf>,
    },

    /// Write a configuration file with every default filled in
    GenerateConfig {
        #[arg(short, long, default_value = "recon.yaml")]
        output: PathBuf,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            e.downcast_ref::<ReconError>()
                .map(ReconError::exit_code)
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(mode) = &cli.profile {
        config.gates = GateProfile::for_mode(mode);
    }
    let sink = TracingSink;

    match cli.command {
        Commands::Extract {
            input,
            output,
            no_tag,
            filtered,
        } => extract_command(&config, &input, &output, no_tag, filtered.as_deref(), &sink),
        Commands::Colmap { images, output } => {
            let ctx = config.context()?;
            let plan = colmap_plan(&config, &ctx, &ColmapLayout::new(images, output))?;
            drive(&config, plan, ctx, &sink)
        }
        Commands::Openmvg { images, project } => {
            let ctx = config.context()?;
            let plan = openmvg_plan(&config, &ctx, &OpenMvgLayout::new(images, project))?;
            drive(&config, plan, ctx, &sink)
        }
        Commands::Gsplat {
            images,
            source,
            model_path,
        } => {
            let ctx = config.context()?;
            let settings = config.gsplat.clone().unwrap_or_default();
            let plan = gsplat_plan(&settings, &ctx, &images, &source, &model_path)?;
            drive(&config, plan, ctx, &sink)
        }
        Commands::SelectMatches {
            files,
            min_score,
            min_per_pair,
        } => {
            let best = select_best(
                &files,
                min_score.unwrap_or(config.gates.min_valid_matches),
                min_per_pair.unwrap_or(config.gates.min_matches_per_pair),
                &sink,
            )?;
            println!("{}", best.path.display());
            Ok(0)
        }
        Commands::AnalyzeLog {
            log,
            stats_json,
            scenario,
        } => {
            let text = std::fs::read_to_string(&log)
                .with_context(|| format!("reading {}", log.display()))?;
            let record = parse_model_analyzer(&log.display().to_string(), &text);
            let scenario = scenario.unwrap_or_else(|| scenario_name(&log));
            let stats = ModelStats::from_record(scenario, &record);
            if let Some(json_path) = stats_json {
                persist_model_stats(&json_path, &stats, &text)?;
            }
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(0)
        }
        Commands::PlyCount { ply } => {
            println!("{}", count_ply_vertices(&ply, &sink));
            Ok(0)
        }
        Commands::Report {
            data,
            output,
            prefix,
            templates,
        } => {
            let templates = match templates {
                Some(path) => TemplatesFile::builtin_with_overrides(&path)?,
                None => TemplatesFile::builtin(),
            };
            let mut options = ReportOptions::default();
            if let Some(prefix) = prefix {
                options.project_prefix = prefix;
            }
            let written = write_report(&data, &output, templates, &options)?;
            sink.info(
                "report",
                &format!("{} pages written to {}", written.len(), output.display()),
            );
            Ok(0)
        }
        Commands::GenerateConfig { output } => {
            std::fs::write(&output, PipelineConfig::default().to_yaml()?)
                .with_context(|| format!("writing {}", output.display()))?;
            sink.info("generate-config", &format!("wrote {}", output.display()));
            Ok(0)
        }
    }
}

/// Runs a plan to its terminal state and returns the run's exit code.
fn drive(
    config: &PipelineConfig,
    plan: PipelinePlan,
    ctx: ExecutionContext,
    sink: &dyn LogSink,
) -> Result<i32> {
    let runner = SubprocessRunner::new(config.launcher.launcher(&ctx));
    let driver = PipelineDriver::new(runner, config.gates.clone());
    let run = driver.run(&plan, ctx, sink);
    Ok(run.exit_code())
}

fn extract_command(
    config: &PipelineConfig,
    input: &Path,
    output: &Path,
    no_tag: bool,
    filtered: Option<&Path>,
    sink: &dyn LogSink,
) -> Result<i32> {
    let runner = SubprocessRunner::local();
    let mut opts = config.frames.clone();
    if no_tag {
        opts.tag_camera = false;
    }
    let workers = config.batch.max_workers;

    let frames = if input.is_dir() {
        let report = extract_folder(input, output, &opts, &runner, workers, sink)?;
        for (video, err) in report.failures() {
            sink.error("extract", &format!("{}: {err}", video.display()));
        }
        let failed = report.failure_count();
        let frames: Vec<PathBuf> = report.into_values().into_iter().flatten().collect();
        if failed > 0 && frames.is_empty() {
            return Ok(1);
        }
        frames
    } else {
        extract_and_tag(input, output, &opts, &runner, workers, sink)?
    };
    sink.info("extract", &format!("{} frames in {}", frames.len(), output.display()));

    if let Some(dest) = filtered {
        let Some(filter) = &config.filter else {
            anyhow::bail!("--filtered needs a `filter` section in the configuration");
        };
        let report = filter_images(filter, frames, dest, &runner, workers, sink)?;
        for (image, err) in report.failures() {
            sink.warn("filter", &format!("{}: {err}", image.display()));
        }
        sink.info(
            "filter",
            &format!("{}/{} images filtered", report.success_count(), report.len()),
        );
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "recon",
            "select-matches",
            "a.txt",
            "b.txt",
            "--profile",
            "survey",
            "--min-score",
            "12",
        ])
        .unwrap();
        assert_eq!(cli.profile.as_deref(), Some("survey"));
        match cli.command {
            Commands::SelectMatches {
                files, min_score, ..
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(min_score, Some(12));
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_select_matches_needs_files() {
        assert!(Cli::try_parse_from(["recon", "select-matches"]).is_err());
    }
}
