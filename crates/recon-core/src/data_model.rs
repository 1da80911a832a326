//! Data Model: MetricsRecord, GateDecision, PipelineRun and its persisted summary
use crate::context::ExecutionContext;
use crate::error::{ReconError, ReconResult};
use crate::stage::{StageResult, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;

/// Numeric metric, or the `"?"` sentinel when the tool did not report it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Unavailable,
}

impl MetricValue {
    /// Text with a decimal point parses as float, anything else as integer.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.contains('.') {
            raw.parse().map(Self::Float).unwrap_or(Self::Unavailable)
        } else {
            raw.parse().map(Self::Int).unwrap_or(Self::Unavailable)
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Unavailable => f.write_str("?"),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Unavailable => serializer.serialize_str("?"),
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(v) => Ok(Self::Int(v)),
            Raw::Float(v) => Ok(Self::Float(v)),
            Raw::Text(t) if t == "?" => Ok(Self::Unavailable),
            Raw::Text(t) => Err(serde::de::Error::custom(format!(
                "expected a number or \"?\", got {t:?}"
            ))),
        }
    }
}

/// Named metrics extracted from one artifact. Built once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// What the metrics were parsed from (step name or file path).
    pub source: String,
    values: BTreeMap<String, MetricValue>,
}

impl MetricsRecord {
    pub fn new(
        source: impl Into<String>,
        values: impl IntoIterator<Item = (String, MetricValue)>,
    ) -> Self {
        Self {
            source: source.into(),
            values: values.into_iter().collect(),
        }
    }

    /// Missing names read as [`MetricValue::Unavailable`].
    pub fn get(&self, name: &str) -> MetricValue {
        self.values
            .get(name)
            .copied()
            .unwrap_or(MetricValue::Unavailable)
    }

    pub fn require(&self, name: &str) -> ReconResult<f64> {
        self.get(name).as_f64().ok_or_else(|| {
            ReconError::MetricUnavailable(format!("{name} not reported by {}", self.source))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn unavailable(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, v)| !v.is_available())
            .map(|(k, _)| k)
            .collect()
    }

    /// Union of two records; `other` wins on shared names.
    pub fn merge(self, other: MetricsRecord) -> MetricsRecord {
        let source = if self.source == other.source {
            self.source
        } else {
            format!("{}+{}", self.source, other.source)
        };
        let mut values = self.values;
        values.extend(other.values);
        MetricsRecord { source, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outcome of a gate check between two stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum GateDecision {
    Proceed,
    ProceedWithWarning(String),
    Abort(String),
}

impl GateDecision {
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Proceed => None,
            Self::ProceedWithWarning(r) | Self::Abort(r) => Some(r),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Proceed => 0,
            Self::ProceedWithWarning(_) => 1,
            Self::Abort(_) => 2,
        }
    }

    /// Keeps the more severe decision; messages of equal severity are joined.
    pub fn combine(self, other: GateDecision) -> GateDecision {
        match (self, other) {
            (Self::Abort(a), Self::Abort(b)) => Self::Abort(format!("{a}; {b}")),
            (Self::ProceedWithWarning(a), Self::ProceedWithWarning(b)) => {
                Self::ProceedWithWarning(format!("{a}; {b}"))
            }
            (a, b) => {
                if b.rank() > a.rank() {
                    b
                } else {
                    a
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AbortReason {
    /// The external tool exited non-zero.
    ToolFailed(i32),
    /// The tool could not be started or its output could not be read.
    LaunchFailed(String),
    /// The tool succeeded but its result is unusable.
    QualityGate(String),
    /// Orchestrator-side failure (directory creation, path translation).
    Internal(String),
}

impl AbortReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ToolFailed(code) => *code,
            _ => 1,
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolFailed(code) => write!(f, "tool exited with code {code}"),
            Self::LaunchFailed(msg) => write!(f, "launch failed: {msg}"),
            Self::QualityGate(msg) => write!(f, "quality gate: {msg}"),
            Self::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    AbortedAtStage {
        /// 1-based position of the stage in the plan.
        index: usize,
        stage: String,
        reason: AbortReason,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRecord {
    pub stage_index: usize,
    pub gate: String,
    pub decision: GateDecision,
}

/// Top-level aggregate of one pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub plan: String,
    pub context: ExecutionContext,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    results: Vec<StageResult>,
    gates: Vec<GateRecord>,
    status: RunStatus,
}

impl PipelineRun {
    pub fn new(plan: impl Into<String>, context: ExecutionContext) -> Self {
        Self {
            plan: plan.into(),
            context,
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
            gates: Vec::new(),
            status: RunStatus::Running,
        }
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    pub fn gates(&self) -> &[GateRecord] {
        &self.gates
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, RunStatus::Running)
    }

    /// No-op once the run is frozen.
    pub fn push_result(&mut self, result: StageResult) {
        if !self.is_terminal() {
            self.results.push(result);
        }
    }

    /// No-op once the run is frozen.
    pub fn push_gate(&mut self, record: GateRecord) {
        if !self.is_terminal() {
            self.gates.push(record);
        }
    }

    /// Attaches metrics to the most recent stage result.
    pub fn attach_metrics(&mut self, metrics: MetricsRecord) {
        if self.is_terminal() {
            return;
        }
        if let Some(last) = self.results.last_mut() {
            last.metrics = Some(metrics);
        }
    }

    pub fn complete(&mut self) {
        if !self.is_terminal() {
            self.status = RunStatus::Completed;
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn abort(&mut self, index: usize, stage: impl Into<String>, reason: AbortReason) {
        if !self.is_terminal() {
            self.status = RunStatus::AbortedAtStage {
                index,
                stage: stage.into(),
                reason,
            };
            self.finished_at = Some(Utc::now());
        }
    }

    /// 0 when completed, the tool's code for tool failures, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match &self.status {
            RunStatus::Completed => 0,
            RunStatus::Running => 1,
            RunStatus::AbortedAtStage { reason, .. } => reason.exit_code(),
        }
    }

    pub fn executed_stages(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn summary(&self) -> RunSummary {
        let stages = self
            .results
            .iter()
            .enumerate()
            .map(|(i, result)| StageSummary {
                name: result.name.clone(),
                digest: result.digest.clone(),
                status: result.status,
                duration_ms: result.duration.as_millis() as u64,
                line_count: result.lines.len(),
                metrics: result.metrics.clone(),
                gate: self
                    .gates
                    .iter()
                    .filter(|g| g.stage_index == i + 1)
                    .map(|g| g.decision.clone())
                    .reduce(GateDecision::combine),
            })
            .collect();

        RunSummary {
            engine: format!("recon@{}", crate::RECON_VERSION),
            run_id: self.context.run_id.clone(),
            plan: self.plan.clone(),
            host_root: self.context.host_root().display().to_string(),
            container_root: self.context.container_root().to_string(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            status: self.status.clone(),
            exit_code: self.exit_code(),
            stages,
        }
    }

    pub fn write_summary(&self, path: &Path) -> ReconResult<()> {
        let json = serde_json::to_string_pretty(&self.summary())
            .map_err(|e| ReconError::Config(format!("summary serialization: {e}")))?;
        std::fs::write(path, json).map_err(|e| ReconError::io(path.display().to_string(), e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub name: String,
    pub digest: String,
    pub status: StageStatus,
    pub duration_ms: u64,
    pub line_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateDecision>,
}

/// Persisted form of a [`PipelineRun`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub engine: String,
    pub run_id: String,
    pub plan: String,
    pub host_root: String,
    pub container_root: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub exit_code: i32,
    pub stages: Vec<StageSummary>,
}
