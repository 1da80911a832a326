//! Pipeline plans and the stage-gate driver.
//!
//! A [`PipelinePlan`] is a fixed list of stages, each followed by zero or
//! more gates. [`PipelineDriver::run`] walks it as an explicit state
//! machine; every way a run can end is one of the transitions below.
//!
//! ```text
//! Prepare ──ok──▶ Running(0) ──▶ … ──▶ Running(n) ──▶ Completed
//!    │                 │
//!    └──────────────▶ Aborted(stage, reason)
//! ```

use crate::gates::{Gate, GateEnv};
use recon_core::{
    AbortReason, Bindings, ExecutionContext, GateDecision, GateRecord, LogSink, MetricsRecord,
    PipelineRun, ProcessRunner, ReconError, ReconResult, RunStatus, StageSpec, StageStatus,
};
use recon_quality::GateProfile;
use std::path::PathBuf;

const PREPARE_STEP: &str = "prepare";

pub struct PlannedStep {
    pub spec: StageSpec,
    pub gates: Vec<Box<dyn Gate>>,
}

impl PlannedStep {
    pub fn new(spec: StageSpec) -> Self {
        Self {
            spec,
            gates: Vec::new(),
        }
    }

    pub fn gate(mut self, gate: impl Gate + 'static) -> Self {
        self.gates.push(Box::new(gate));
        self
    }
}

impl From<StageSpec> for PlannedStep {
    fn from(spec: StageSpec) -> Self {
        Self::new(spec)
    }
}

#[derive(Default)]
pub struct PipelinePlan {
    pub name: String,
    /// Host directories created before the first stage.
    pub ensure_dirs: Vec<PathBuf>,
    pub steps: Vec<PlannedStep>,
    /// Where the run summary JSON is written once the run ends.
    pub summary_path: Option<PathBuf>,
}

impl PipelinePlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn ensure_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ensure_dirs.push(dir.into());
        self
    }

    pub fn step(mut self, step: impl Into<PlannedStep>) -> Self {
        self.steps.push(step.into());
        self
    }

    pub fn summary_at(mut self, path: impl Into<PathBuf>) -> Self {
        self.summary_path = Some(path.into());
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.spec.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DriverState {
    Prepare,
    Running(usize),
    Completed,
    Aborted {
        /// 1-based; 0 is the prepare step.
        index: usize,
        stage: String,
        reason: AbortReason,
    },
}

pub struct PipelineDriver<R> {
    runner: R,
    profile: GateProfile,
}

impl<R: ProcessRunner> PipelineDriver<R> {
    pub fn new(runner: R, profile: GateProfile) -> Self {
        Self { runner, profile }
    }

    pub fn profile(&self) -> &GateProfile {
        &self.profile
    }

    /// Runs the plan to a terminal state. Stages run strictly one after
    /// another on the calling thread.
    pub fn run(
        &self,
        plan: &PipelinePlan,
        ctx: ExecutionContext,
        sink: &dyn LogSink,
    ) -> PipelineRun {
        let mut run = PipelineRun::new(&plan.name, ctx);
        let mut bindings = Bindings::new();
        let mut state = DriverState::Prepare;

        sink.info(
            &plan.name,
            &format!(
                "run {} started: {} stages under {}",
                run.context.run_id,
                plan.len(),
                run.context.host_root().display()
            ),
        );

        loop {
            state = match state {
                DriverState::Prepare => match prepare(plan, &run.context) {
                    Ok(()) => DriverState::Running(0),
                    Err(e) => {
                        sink.error(PREPARE_STEP, &e.to_string());
                        DriverState::Aborted {
                            index: 0,
                            stage: PREPARE_STEP.to_string(),
                            reason: AbortReason::Internal(e.to_string()),
                        }
                    }
                },
                DriverState::Running(i) if i >= plan.len() => DriverState::Completed,
                DriverState::Running(i) => {
                    self.advance(i, plan, &mut run, &mut bindings, sink)
                }
                DriverState::Completed => {
                    run.complete();
                    break;
                }
                DriverState::Aborted {
                    index,
                    stage,
                    reason,
                } => {
                    run.abort(index, stage, reason);
                    break;
                }
            };
        }

        match run.status() {
            RunStatus::Completed => sink.info(&plan.name, "run completed"),
            RunStatus::AbortedAtStage {
                index,
                stage,
                reason,
            } => sink.error(
                &plan.name,
                &format!("run aborted at stage {index} ({stage}): {reason}"),
            ),
            RunStatus::Running => {}
        }

        if let Some(path) = &plan.summary_path {
            match run.write_summary(path) {
                Ok(()) => sink.info(&plan.name, &format!("summary written to {}", path.display())),
                Err(e) => sink.warn(&plan.name, &format!("could not write summary: {e}")),
            }
        }
        run
    }

    /// Runs stage `i` and its gates, returning the next state.
    fn advance(
        &self,
        i: usize,
        plan: &PipelinePlan,
        run: &mut PipelineRun,
        bindings: &mut Bindings,
        sink: &dyn LogSink,
    ) -> DriverState {
        let step = &plan.steps[i];
        let position = i + 1;
        let name = step.spec.name.as_str();
        let aborted = |reason: AbortReason| DriverState::Aborted {
            index: position,
            stage: name.to_string(),
            reason,
        };

        if let Some(slot) = step.spec.bound_slots().find(|s| !bindings.contains_key(*s)) {
            let reason = format!("no value bound for slot '{slot}'");
            sink.error(name, &reason);
            return aborted(AbortReason::Internal(reason));
        }

        sink.info(name, &format!("stage {position}/{}", plan.len()));
        let mut result = match self.runner.run(&step.spec, bindings, sink) {
            Ok(result) => result,
            Err(e) => {
                sink.error(name, &format!("could not run {}: {e}", step.spec.tool));
                return aborted(AbortReason::LaunchFailed(e.to_string()));
            }
        };

        if let StageStatus::Failed(code) = result.status {
            sink.error(name, &format!("{} exited with code {code}", step.spec.tool));
            run.push_result(result);
            return aborted(AbortReason::ToolFailed(code));
        }

        let env = GateEnv {
            profile: &self.profile,
            sink,
        };
        let mut decision = GateDecision::Proceed;
        let mut metrics: Option<MetricsRecord> = None;

        for gate in &step.gates {
            let report = match gate.check(&result, &env) {
                Ok(report) => report,
                Err(e) => {
                    let reason = format!("gate {}: {e}", gate.name());
                    sink.error(name, &reason);
                    run.push_result(result);
                    return aborted(AbortReason::Internal(reason));
                }
            };

            for (slot, host) in report.bindings {
                match run.context.to_container(&host) {
                    Ok(path) => {
                        sink.info(name, &format!("{slot} = {path}"));
                        bindings.insert(slot, path);
                    }
                    Err(e) => {
                        sink.error(name, &e.to_string());
                        run.push_result(result);
                        return aborted(AbortReason::Internal(e.to_string()));
                    }
                }
            }

            metrics = match (metrics, report.metrics) {
                (Some(a), Some(b)) => Some(a.merge(b)),
                (a, b) => a.or(b),
            };

            match &report.decision {
                GateDecision::Proceed => {}
                GateDecision::ProceedWithWarning(reason) => {
                    sink.warn(name, &format!("gate {}: {reason}", gate.name()))
                }
                GateDecision::Abort(reason) => {
                    sink.error(name, &format!("gate {} failed: {reason}", gate.name()))
                }
            }
            run.push_gate(GateRecord {
                stage_index: position,
                gate: gate.name().to_string(),
                decision: report.decision.clone(),
            });
            decision = decision.combine(report.decision);
            if decision.is_abort() {
                break;
            }
        }

        result.metrics = metrics;
        run.push_result(result);
        match decision {
            GateDecision::Abort(reason) => aborted(AbortReason::QualityGate(reason)),
            _ => DriverState::Running(i + 1),
        }
    }
}

/// Creates the plan's host directories; each must lie under the root.
fn prepare(plan: &PipelinePlan, ctx: &ExecutionContext) -> ReconResult<()> {
    for dir in &plan.ensure_dirs {
        ctx.to_container(dir)?;
        std::fs::create_dir_all(dir).map_err(|e| ReconError::io(dir.display().to_string(), e))?;
        tracing::debug!(dir = %dir.display(), "ensured");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_builder() {
        let plan = PipelinePlan::new("demo")
            .ensure_dir("/tmp/out")
            .step(StageSpec::new("a", "tool-a"))
            .step(PlannedStep::new(StageSpec::new("b", "tool-b")))
            .summary_at("/tmp/out/run-summary.json");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.stage_names(), vec!["a", "b"]);
        assert!(plan.summary_path.is_some());
    }
}
