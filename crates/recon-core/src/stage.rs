//! Stage description: one external tool invocation with typed arguments.
use crate::context::{ContainerPath, ExecutionContext};
use crate::data_model::MetricsRecord;
use crate::error::{ReconError, ReconResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Values published by gates for later stages (e.g. the selected match file).
pub type Bindings = BTreeMap<String, ContainerPath>;

/// One argv token. Arguments are never joined into a shell string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Arg {
    Flag(String),
    Value(String),
    Path(ContainerPath),
    /// Filled at run time from [`Bindings`].
    Bound(String),
}

impl Arg {
    fn render(&self, bindings: &Bindings) -> ReconResult<String> {
        match self {
            Self::Flag(flag) => Ok(flag.clone()),
            Self::Value(value) => Ok(value.clone()),
            Self::Path(path) => Ok(path.as_str().to_string()),
            Self::Bound(slot) => bindings
                .get(slot)
                .map(|p| p.as_str().to_string())
                .ok_or_else(|| ReconError::Config(format!("no value bound for slot '{slot}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Human readable step name used to tag log lines.
    pub name: String,
    /// Container service the tool lives in; defaults to the tool name.
    pub service: Option<String>,
    pub tool: String,
    pub args: Vec<Arg>,
    /// Host paths the tool is expected to produce.
    pub outputs: Vec<PathBuf>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: None,
            tool: tool.into(),
            args: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.args.push(Arg::Flag(flag.into()));
        self
    }

    pub fn value(mut self, value: impl ToString) -> Self {
        self.args.push(Arg::Value(value.to_string()));
        self
    }

    /// `flag value` pair.
    pub fn opt(self, flag: impl Into<String>, value: impl ToString) -> Self {
        self.flag(flag).value(value)
    }

    pub fn path(mut self, path: ContainerPath) -> Self {
        self.args.push(Arg::Path(path));
        self
    }

    /// `flag <container path>` pair, translating a host path through `ctx`.
    pub fn host_path(
        self,
        ctx: &ExecutionContext,
        flag: impl Into<String>,
        host: impl AsRef<Path>,
    ) -> ReconResult<Self> {
        let container = ctx.to_container(host)?;
        Ok(self.flag(flag).path(container))
    }

    pub fn bound(mut self, flag: impl Into<String>, slot: impl Into<String>) -> Self {
        self.args.push(Arg::Flag(flag.into()));
        self.args.push(Arg::Bound(slot.into()));
        self
    }

    pub fn output(mut self, host: impl Into<PathBuf>) -> Self {
        self.outputs.push(host.into());
        self
    }

    /// Tool name followed by rendered arguments.
    pub fn command_line(&self, bindings: &Bindings) -> ReconResult<Vec<String>> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.tool.clone());
        for arg in &self.args {
            argv.push(arg.render(bindings)?);
        }
        Ok(argv)
    }

    pub fn bound_slots(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(|a| match a {
            Arg::Bound(slot) => Some(slot.as_str()),
            _ => None,
        })
    }
}

/// How the tool process is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Launcher {
    /// Run the tool directly on the host.
    Local,
    /// `<program> <args..> [--user u:g] <service> <tool> <tool args..>`
    Container {
        program: String,
        args: Vec<String>,
        #[serde(default)]
        user: Option<String>,
    },
}

impl Launcher {
    pub fn compose() -> Self {
        Self::Container {
            program: "docker".to_string(),
            args: vec!["compose".to_string(), "run".to_string(), "--rm".to_string()],
            user: None,
        }
    }

    /// Run containers as the owner of the project root so outputs stay
    /// writable on the host.
    pub fn as_owner_of(self, ctx: &ExecutionContext) -> Self {
        match (self, ctx.owner_ids()) {
            (Self::Container { program, args, .. }, Some((uid, gid))) => Self::Container {
                program,
                args,
                user: Some(format!("{uid}:{gid}")),
            },
            (other, _) => other,
        }
    }

    pub fn argv(&self, spec: &StageSpec, bindings: &Bindings) -> ReconResult<Vec<String>> {
        let command = spec.command_line(bindings)?;
        match self {
            Self::Local => Ok(command),
            Self::Container {
                program,
                args,
                user,
            } => {
                let mut argv = vec![program.clone()];
                argv.extend(args.iter().cloned());
                if let Some(user) = user {
                    argv.push("--user".to_string());
                    argv.push(user.clone());
                }
                argv.push(spec.service.clone().unwrap_or_else(|| spec.tool.clone()));
                argv.extend(command);
                Ok(argv)
            }
        }
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::compose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "code", rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed(i32),
}

impl StageStatus {
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            Self::Succeeded
        } else {
            Self::Failed(code)
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub name: String,
    pub status: StageStatus,
    /// Combined stdout/stderr, one entry per line in arrival order.
    pub lines: Vec<String>,
    pub duration: Duration,
    /// blake3 over the launched argv.
    pub digest: String,
    pub metrics: Option<MetricsRecord>,
}

impl StageResult {
    pub fn output_text(&self) -> String {
        self.lines.join("\n")
    }
}

/// `blake3:<hex>` over argv elements separated by NUL.
pub fn digest_argv(argv: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    for arg in argv {
        hasher.update(arg.as_bytes());
        hasher.update(&[0]);
    }
    format!("blake3:{}", hasher.finalize())
}
