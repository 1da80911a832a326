//! Gate decisions over extracted metrics
//!
//! Individual checks report Ok, Warn or Fail; [`decide`] folds them into a
//! [`GateDecision`] the same way every checkpoint does: any failure aborts,
//! otherwise any warning proceeds with a warning.

use recon_core::{GateDecision, MetricValue, MetricsRecord};
use serde::{Deserialize, Serialize};

/// Lower bound on a metric, with an optional warning band above it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub abort_below: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn_below: Option<f64>,
}

impl Threshold {
    pub fn at_least(min: impl Into<f64>) -> Self {
        Self {
            abort_below: min.into(),
            warn_below: None,
        }
    }

    pub fn warn_below(mut self, value: Option<f64>) -> Self {
        self.warn_below = value;
        self
    }

    pub fn status_of(&self, value: f64) -> CheckStatus {
        if value < self.abort_below {
            CheckStatus::Fail
        } else if self.warn_below.map_or(false, |w| value < w) {
            CheckStatus::Warn
        } else {
            CheckStatus::Ok
        }
    }
}

/// What to do when a gated metric was not reported by the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingMetricPolicy {
    #[default]
    Abort,
    Warn,
}

/// Single check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl Check {
    fn new(name: &str, status: CheckStatus, message: String) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
        }
    }
}

fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn floor_check(
    name: &str,
    value: &MetricValue,
    threshold: Threshold,
    policy: MissingMetricPolicy,
) -> Check {
    let Some(v) = value.as_f64() else {
        let status = match policy {
            MissingMetricPolicy::Abort => CheckStatus::Fail,
            MissingMetricPolicy::Warn => CheckStatus::Warn,
        };
        return Check::new(name, status, format!("{name} unavailable in tool output"));
    };

    let status = threshold.status_of(v);
    let message = match status {
        CheckStatus::Fail => format!(
            "{name} = {} below minimum {}",
            fmt_num(v),
            fmt_num(threshold.abort_below)
        ),
        CheckStatus::Warn => format!(
            "{name} = {} below recommended {}",
            fmt_num(v),
            fmt_num(threshold.warn_below.unwrap_or(threshold.abort_below))
        ),
        CheckStatus::Ok => format!("{name} = {}", fmt_num(v)),
    };
    Check::new(name, status, message)
}

/// Upper-bound check that can only warn.
pub fn ceiling_check(name: &str, value: &MetricValue, ceiling: Option<f64>) -> Check {
    match (value.as_f64(), ceiling) {
        (Some(v), Some(max)) if v > max => Check::new(
            name,
            CheckStatus::Warn,
            format!("{name} = {} above {}", fmt_num(v), fmt_num(max)),
        ),
        (Some(v), _) => Check::new(name, CheckStatus::Ok, format!("{name} = {}", fmt_num(v))),
        (None, _) => Check::new(name, CheckStatus::Ok, format!("{name} not reported")),
    }
}

/// Fails when any reference is absolute; the message lists the first five.
pub fn relative_paths_check<'a>(name: &str, absolute: impl IntoIterator<Item = &'a str>) -> Check {
    let absolute: Vec<&str> = absolute.into_iter().collect();
    if absolute.is_empty() {
        return Check::new(name, CheckStatus::Ok, "all image references are relative".into());
    }
    let shown: Vec<&str> = absolute.iter().take(5).copied().collect();
    let more = if absolute.len() > shown.len() {
        format!(" (+{} more)", absolute.len() - shown.len())
    } else {
        String::new()
    };
    Check::new(
        name,
        CheckStatus::Fail,
        format!(
            "{} absolute image paths: {}{more}",
            absolute.len(),
            shown.join(", ")
        ),
    )
}

pub fn decide(checks: &[Check]) -> GateDecision {
    let messages = |status: CheckStatus| -> Vec<&str> {
        checks
            .iter()
            .filter(|c| c.status == status)
            .map(|c| c.message.as_str())
            .collect()
    };

    let fails = messages(CheckStatus::Fail);
    if !fails.is_empty() {
        return GateDecision::Abort(fails.join("; "));
    }
    let warns = messages(CheckStatus::Warn);
    if !warns.is_empty() {
        return GateDecision::ProceedWithWarning(warns.join("; "));
    }
    GateDecision::Proceed
}

/// Applies one floor per metric to a record.
pub fn evaluate_floors(
    record: &MetricsRecord,
    floors: &[(&str, Threshold)],
    policy: MissingMetricPolicy,
) -> Vec<Check> {
    floors
        .iter()
        .map(|(metric, threshold)| floor_check(metric, &record.get(metric), *threshold, policy))
        .collect()
}
