//! Recon Core: execution context, stage model and the external-tool runner
//!
//! Generic core shared by every reconstruction pipeline: host/container path
//! translation, typed stage descriptions, a streaming subprocess runner and
//! the run aggregate the pipeline driver fills in.

pub mod context;
pub mod data_model;
pub mod error;
pub mod runner;
pub mod sink;
pub mod stage;

pub use context::{ContainerPath, ExecutionContext};
pub use data_model::{
    AbortReason, GateDecision, GateRecord, MetricValue, MetricsRecord, PipelineRun, RunStatus,
    RunSummary, StageSummary,
};
pub use error::{ReconError, ReconResult};
pub use runner::{ProcessRunner, SubprocessRunner};
pub use sink::{LogLevel, LogRecord, LogSink, MemorySink, TracingSink};
pub use stage::{Arg, Bindings, Launcher, StageResult, StageSpec, StageStatus};

/// Orchestrator version recorded in run summaries.
pub const RECON_VERSION: &str = env!("CARGO_PKG_VERSION");
