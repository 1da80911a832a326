//! Driver behaviour against a scripted runner: no external tools involved.

use recon_core::{
    AbortReason, Bindings, ExecutionContext, GateDecision, LogLevel, LogSink, MemorySink,
    ProcessRunner, ReconError, ReconResult, RunStatus, StageResult, StageSpec, StageStatus,
};
use recon_quality::GateProfile;
use recon_stages::{
    Checkpoint, Gate, GateEnv, GateReport, PipelineDriver, PipelinePlan, PlannedStep,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone)]
enum Script {
    Exit(i32, Vec<&'static str>),
    LaunchError,
    /// Writes a file before exiting 0.
    Write(PathBuf, String),
}

#[derive(Default)]
struct ScriptedRunner {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    fn on(mut self, stage: &str, script: Script) -> Self {
        self.scripts.insert(stage.to_string(), script);
        self
    }

    fn called(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    fn argv_of(&self, stage: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n == stage)
            .map(|(_, argv)| argv.clone())
            .unwrap()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(
        &self,
        spec: &StageSpec,
        bindings: &Bindings,
        sink: &dyn LogSink,
    ) -> ReconResult<StageResult> {
        let argv = spec.command_line(bindings)?;
        self.calls.lock().unwrap().push((spec.name.clone(), argv));

        let (code, lines) = match self.scripts.get(&spec.name).cloned() {
            None => (0, vec![]),
            Some(Script::Exit(code, lines)) => (code, lines),
            Some(Script::LaunchError) => {
                return Err(ReconError::StageExecution {
                    step: spec.name.clone(),
                    code: None,
                    reason: "No such file or directory".into(),
                })
            }
            Some(Script::Write(path, contents)) => {
                std::fs::write(path, contents).unwrap();
                (0, vec![])
            }
        };
        for line in &lines {
            sink.info(&spec.name, line);
        }
        Ok(StageResult {
            name: spec.name.clone(),
            status: StageStatus::from_code(code),
            lines: lines.into_iter().map(String::from).collect(),
            duration: Duration::from_millis(1),
            digest: "blake3:test".into(),
            metrics: None,
        })
    }
}

struct Fixed(GateDecision);

impl Gate for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    fn check(&self, _result: &StageResult, _env: &GateEnv<'_>) -> ReconResult<GateReport> {
        Ok(GateReport::new(self.0.clone()))
    }
}

fn standard(runner: &ScriptedRunner) -> PipelineDriver<&ScriptedRunner> {
    PipelineDriver::new(runner, GateProfile::standard())
}

fn context() -> (tempfile::TempDir, ExecutionContext) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ExecutionContext::new(dir.path(), "/projects").unwrap();
    (dir, ctx)
}

fn linear_plan(n: usize) -> PipelinePlan {
    (1..=n).fold(PipelinePlan::new("linear"), |plan, i| {
        plan.step(StageSpec::new(format!("s{i}"), "tool").value(i))
    })
}

#[test]
fn failing_stage_k_stops_the_run_at_k() {
    for k in 1..=5 {
        let (_dir, ctx) = context();
        let runner = ScriptedRunner::default().on(&format!("s{k}"), Script::Exit(7, vec!["boom"]));
        let driver = standard(&runner);
        let sink = MemorySink::new();

        let run = driver.run(&linear_plan(5), ctx, &sink);

        let expected: Vec<String> = (1..=k).map(|i| format!("s{i}")).collect();
        assert_eq!(runner.called(), expected);
        assert_eq!(run.executed_stages(), expected);
        assert_eq!(
            run.status(),
            &RunStatus::AbortedAtStage {
                index: k,
                stage: format!("s{k}"),
                reason: AbortReason::ToolFailed(7),
            }
        );
        assert_eq!(run.exit_code(), 7);
    }
}

#[test]
fn all_stages_succeed() {
    let (_dir, ctx) = context();
    let runner = ScriptedRunner::default();
    let run = standard(&runner).run(
        &linear_plan(3),
        ctx,
        &MemorySink::new(),
    );
    assert_eq!(run.status(), &RunStatus::Completed);
    assert_eq!(run.exit_code(), 0);
    assert_eq!(run.results().len(), 3);
}

#[test]
fn launch_error_aborts_like_a_failure() {
    let (_dir, ctx) = context();
    let runner = ScriptedRunner::default().on("s2", Script::LaunchError);
    let sink = MemorySink::new();
    let run = standard(&runner).run(&linear_plan(4), ctx, &sink);

    assert_eq!(runner.called(), vec!["s1", "s2"]);
    assert!(matches!(
        run.status(),
        RunStatus::AbortedAtStage { index: 2, reason: AbortReason::LaunchFailed(_), .. }
    ));
    assert_eq!(run.exit_code(), 1);
    assert!(sink
        .messages_for("s2")
        .iter()
        .any(|m| m.contains("No such file or directory")));
}

#[test]
fn gate_abort_stops_before_next_stage() {
    let (_dir, ctx) = context();
    let runner = ScriptedRunner::default();
    let plan = PipelinePlan::new("gated")
        .step(StageSpec::new("a", "tool"))
        .step(PlannedStep::new(StageSpec::new("b", "tool")).gate(Fixed(GateDecision::Abort(
            "registered_images = 2 below minimum 3".into(),
        ))))
        .step(StageSpec::new("c", "tool"));
    let sink = MemorySink::new();

    let run = standard(&runner).run(&plan, ctx, &sink);

    assert_eq!(runner.called(), vec!["a", "b"]);
    assert_eq!(run.exit_code(), 1);
    match run.status() {
        RunStatus::AbortedAtStage {
            index,
            stage,
            reason: AbortReason::QualityGate(reason),
        } => {
            assert_eq!(*index, 2);
            assert_eq!(stage, "b");
            assert!(reason.contains("registered_images = 2"));
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert!(sink.count_at(LogLevel::Error) >= 1);
}

#[test]
fn warnings_do_not_stop_the_run() {
    let (_dir, ctx) = context();
    let runner = ScriptedRunner::default();
    let plan = PipelinePlan::new("warned")
        .step(PlannedStep::new(StageSpec::new("a", "tool")).gate(Fixed(
            GateDecision::ProceedWithWarning("mean_reprojection_error = 3 above 2".into()),
        )))
        .step(StageSpec::new("b", "tool"));
    let sink = MemorySink::new();

    let run = standard(&runner).run(&plan, ctx, &sink);
    assert_eq!(run.status(), &RunStatus::Completed);
    assert_eq!(sink.count_at(LogLevel::Warn), 1);
    assert_eq!(run.gates().len(), 1);
}

/// `pairs` image pairs with 12 correspondences each.
fn match_text(pairs: usize) -> String {
    let mut text = String::new();
    for i in 0..pairs {
        text.push_str(&format!("{i} {}\n", i + 1));
        text.push_str(&vec!["3 4"; 12].join(" "));
        text.push('\n');
    }
    text
}

#[test]
fn selected_candidate_is_bound_into_later_stage() {
    let (dir, ctx) = context();
    let root = ctx.host_root().to_path_buf();
    let f = root.join("matches.f.txt");
    let e = root.join("matches.e.txt");

    let runner = ScriptedRunner::default()
        .on("filter_f", Script::Write(f.clone(), match_text(11)))
        .on("filter_e", Script::Write(e.clone(), match_text(25)));
    let plan = PipelinePlan::new("bind")
        .step(StageSpec::new("filter_f", "GeometricFilter"))
        .step(
            PlannedStep::new(StageSpec::new("filter_e", "GeometricFilter")).gate(
                Checkpoint::MatchSelection {
                    candidates: vec![f, e],
                    slot: "matches".into(),
                },
            ),
        )
        .step(StageSpec::new("sfm", "SfM").bound("-M", "matches"))
        .summary_at(root.join("run-summary.json"));

    let run = standard(&runner).run(&plan, ctx, &MemorySink::new());

    assert_eq!(run.status(), &RunStatus::Completed);
    assert_eq!(runner.argv_of("sfm"), vec!["SfM", "-M", "/projects/matches.e.txt"]);

    let summary: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("run-summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["exit_code"], 0);
    assert_eq!(summary["stages"].as_array().unwrap().len(), 3);
    assert_eq!(summary["stages"][1]["metrics"]["values"]["valid_match_pairs"], 25);
}

#[test]
fn insufficient_matches_abort_before_sfm() {
    let (_dir, ctx) = context();
    let root = ctx.host_root().to_path_buf();
    let f = root.join("matches.f.txt");

    let runner = ScriptedRunner::default().on("filter_f", Script::Write(f.clone(), match_text(9)));
    let plan = PipelinePlan::new("floor")
        .step(PlannedStep::new(StageSpec::new("filter_f", "GeometricFilter")).gate(
            Checkpoint::MatchSelection {
                candidates: vec![f],
                slot: "matches".into(),
            },
        ))
        .step(StageSpec::new("sfm", "SfM").bound("-M", "matches"));

    let run = standard(&runner).run(&plan, ctx, &MemorySink::new());

    assert_eq!(runner.called(), vec!["filter_f"]);
    assert!(matches!(
        run.status(),
        RunStatus::AbortedAtStage { index: 1, reason: AbortReason::QualityGate(_), .. }
    ));
}

#[test]
fn unbound_slot_aborts_without_running() {
    let (_dir, ctx) = context();
    let runner = ScriptedRunner::default();
    let plan =
        PipelinePlan::new("unbound").step(StageSpec::new("sfm", "SfM").bound("-M", "matches"));
    let run = standard(&runner).run(&plan, ctx, &MemorySink::new());
    assert!(runner.called().is_empty());
    assert!(matches!(
        run.status(),
        RunStatus::AbortedAtStage { index: 1, reason: AbortReason::Internal(_), .. }
    ));
}

#[cfg(unix)]
#[test]
fn directory_creation_failure_aborts_at_prepare() {
    let (dir, ctx) = context();
    let blocker = dir.path().join("output");
    std::fs::write(&blocker, b"a file where a directory should be").unwrap();

    let runner = ScriptedRunner::default();
    let plan = linear_plan(2).ensure_dir(blocker.join("sparse"));
    let run = standard(&runner).run(&plan, ctx, &MemorySink::new());

    assert!(runner.called().is_empty());
    assert_eq!(run.exit_code(), 1);
    assert!(matches!(
        run.status(),
        RunStatus::AbortedAtStage { index: 0, stage, .. } if stage == "prepare"
    ));
}

#[test]
fn directories_outside_root_are_refused() {
    let (_dir, ctx) = context();
    let outside = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::default();
    let plan = linear_plan(1).ensure_dir(outside.path().join("out"));
    let run = standard(&runner).run(&plan, ctx, &MemorySink::new());
    assert!(runner.called().is_empty());
    assert!(!outside.path().join("out").exists());
}
