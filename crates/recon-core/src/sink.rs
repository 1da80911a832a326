//! Log sinks injected into the execution engine and the gates.
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Destination for step-tagged log lines.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, step: &str, message: &str);

    fn info(&self, step: &str, message: &str) {
        self.log(LogLevel::Info, step, message);
    }

    fn warn(&self, step: &str, message: &str) {
        self.log(LogLevel::Warn, step, message);
    }

    fn error(&self, step: &str, message: &str) {
        self.log(LogLevel::Error, step, message);
    }
}

/// Forwards every record to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, step: &str, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(step, "{}", message),
            LogLevel::Info => tracing::info!(step, "{}", message),
            LogLevel::Warn => tracing::warn!(step, "{}", message),
            LogLevel::Error => tracing::error!(step, "{}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub step: String,
    pub message: String,
}

/// Keeps records in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn messages_for(&self, step: &str) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.step == step)
            .map(|r| r.message)
            .collect()
    }

    pub fn count_at(&self, level: LogLevel) -> usize {
        self.records().iter().filter(|r| r.level == level).count()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, step: &str, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push(LogRecord {
                level,
                step: step.to_string(),
                message: message.to_string(),
            });
        }
    }
}

impl<S: LogSink + ?Sized> LogSink for &S {
    fn log(&self, level: LogLevel, step: &str, message: &str) {
        (**self).log(level, step, message);
    }
}
