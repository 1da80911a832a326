//! Recon Stages: pipeline plans for the supported tool families and the
//! driver that runs them.
//!
//! # Pipeline Flow
//!
//! ```text
//! images → features → matches ─┬─ gate ─▶ SfM ─ gate ─▶ dense ─ gate ─▶ mesh
//!                              │
//!                    best candidate bound into SfM
//! ```
//!
//! Plans are built from a [`PipelineConfig`]; every host path goes through
//! the run's [`recon_core::ExecutionContext`] while the plan is built, so a
//! path outside the project root fails before any tool starts.

pub mod colmap;
pub mod config;
pub mod gates;
pub mod gsplat;
pub mod openmvg;
pub mod pipeline;

pub use colmap::{colmap_plan, ColmapLayout};
pub use config::{
    ColmapConfig, GsplatConfig, LaunchMode, LauncherConfig, Matcher, OpenMvgConfig,
    PipelineConfig, PointFiltering,
};
pub use gates::{Checkpoint, Gate, GateEnv, GateReport, MATCHES_SLOT};
pub use gsplat::{gsplat_plan, gsplat_stage};
pub use openmvg::{openmvg_plan, OpenMvgLayout};
pub use pipeline::{PipelineDriver, PipelinePlan, PlannedStep};
