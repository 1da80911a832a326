//! Unified Error Model
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("PATH/OUT_OF_ROOT: {path} is outside of {root}")]
    OutOfRoot { path: PathBuf, root: PathBuf },

    #[error("PATH/INVALID: {0}")]
    InvalidPath(String),

    #[error("STAGE/EXEC: {step}: {reason}")]
    StageExecution {
        step: String,
        code: Option<i32>,
        reason: String,
    },

    #[error("METRIC/UNAVAILABLE: {0}")]
    MetricUnavailable(String),

    #[error("QLT/{metric}: {detail}")]
    InsufficientQuality { metric: String, detail: String },

    #[error("ARTIFACT/MALFORMED: {path}: {reason}")]
    MalformedArtifact { path: PathBuf, reason: String },

    #[error("CONFIG/{0}")]
    Config(String),

    #[error("IO/{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ReconError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn insufficient(metric: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InsufficientQuality {
            metric: metric.into(),
            detail: detail.into(),
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error: the tool's own code when a tool
    /// exited non-zero, 1 for every internal abort.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StageExecution {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

pub type ReconResult<T> = Result<T, ReconError>;
