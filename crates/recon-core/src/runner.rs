//! Execution Engine: runs one external tool, streaming merged output into a sink.
use crate::error::{ReconError, ReconResult};
use crate::sink::LogSink;
use crate::stage::{digest_argv, Bindings, Launcher, StageResult, StageSpec, StageStatus};
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Instant;

/// Seam between the pipeline driver and process launching.
pub trait ProcessRunner {
    /// Runs `spec` to completion. `Err` means the tool could not be started
    /// or its output could not be read; a non-zero exit is reported through
    /// [`StageStatus::Failed`].
    fn run(
        &self,
        spec: &StageSpec,
        bindings: &Bindings,
        sink: &dyn LogSink,
    ) -> ReconResult<StageResult>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn run(
        &self,
        spec: &StageSpec,
        bindings: &Bindings,
        sink: &dyn LogSink,
    ) -> ReconResult<StageResult> {
        (**self).run(spec, bindings, sink)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner {
    launcher: Launcher,
    working_dir: Option<PathBuf>,
}

impl SubprocessRunner {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            working_dir: None,
        }
    }

    pub fn local() -> Self {
        Self::new(Launcher::Local)
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    /// Runs a fully rendered argv. Blocks until the process exits.
    pub fn run_argv(
        &self,
        step: &str,
        argv: &[String],
        sink: &dyn LogSink,
    ) -> ReconResult<StageResult> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ReconError::Config(format!("{step}: empty command line")))?;

        sink.info(step, &format!("running: {}", argv.join(" ")));
        let start = Instant::now();

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            let reason = format!("failed to start {program}: {e}");
            sink.error(step, &reason);
            ReconError::StageExecution {
                step: step.to_string(),
                code: None,
                reason,
            }
        })?;

        let pipes: Vec<Box<dyn Read + Send>> = [
            child.stdout.take().map(|p| Box::new(p) as Box<dyn Read + Send>),
            child.stderr.take().map(|p| Box::new(p) as Box<dyn Read + Send>),
        ]
        .into_iter()
        .flatten()
        .collect();

        let (tx, rx) = mpsc::channel();
        let (lines, read_error) = thread::scope(|scope| {
            for pipe in pipes {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(pipe, tx));
            }
            drop(tx);

            let mut lines = Vec::new();
            let mut read_error: Option<io::Error> = None;
            for item in rx {
                match item {
                    Ok(line) => {
                        sink.info(step, &line);
                        lines.push(line);
                    }
                    Err(e) => {
                        read_error.get_or_insert(e);
                    }
                }
            }
            (lines, read_error)
        });

        let status = child.wait().map_err(|e| {
            let reason = format!("failed waiting for {program}: {e}");
            sink.error(step, &reason);
            ReconError::StageExecution {
                step: step.to_string(),
                code: None,
                reason,
            }
        })?;

        if let Some(e) = read_error {
            let reason = format!("failed reading output of {program}: {e}");
            sink.error(step, &reason);
            return Err(ReconError::StageExecution {
                step: step.to_string(),
                code: None,
                reason,
            });
        }

        let duration = start.elapsed();
        let status = StageStatus::from_code(exit_code(status));
        match status {
            StageStatus::Succeeded => {
                sink.info(step, &format!("finished in {:.1}s", duration.as_secs_f64()));
            }
            StageStatus::Failed(code) => {
                sink.error(
                    step,
                    &format!(
                        "{program} exited with code {code} after {:.1}s",
                        duration.as_secs_f64()
                    ),
                );
            }
        }

        Ok(StageResult {
            name: step.to_string(),
            status,
            lines,
            duration,
            digest: digest_argv(argv),
            metrics: None,
        })
    }
}

impl ProcessRunner for SubprocessRunner {
    fn run(
        &self,
        spec: &StageSpec,
        bindings: &Bindings,
        sink: &dyn LogSink,
    ) -> ReconResult<StageResult> {
        let argv = self.launcher.argv(spec, bindings)?;
        self.run_argv(&spec.name, &argv, sink)
    }
}

/// Sends each line as soon as its `\n` or `\r` terminator is read, so
/// carriage-return progress output streams without waiting for a newline.
fn forward_lines<R: Read>(pipe: R, tx: Sender<io::Result<String>>) {
    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();
    loop {
        let chunk = match reader.fill_buf() {
            Ok(chunk) => chunk,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };
        if chunk.is_empty() {
            send_line(&mut line, &tx);
            return;
        }
        let len = chunk.len();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if !send_line(&mut line, &tx) {
                    return;
                }
            } else {
                line.push(byte);
            }
        }
        reader.consume(len);
    }
}

/// Empty lines are dropped. Returns false once the receiver is gone.
fn send_line(line: &mut Vec<u8>, tx: &Sender<io::Result<String>>) -> bool {
    if line.is_empty() {
        return true;
    }
    let text = String::from_utf8_lossy(line).into_owned();
    line.clear();
    tx.send(Ok(text)).is_ok()
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sink::{LogLevel, MemorySink};

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_captures_merged_output() {
        let sink = MemorySink::new();
        let result = SubprocessRunner::local()
            .run_argv("echo", &sh("echo out; echo err 1>&2; echo done"), &sink)
            .unwrap();

        assert_eq!(result.status, StageStatus::Succeeded);
        assert_eq!(result.lines.len(), 3);
        assert!(result.lines.contains(&"err".to_string()));
        let out_pos = result.lines.iter().position(|l| l == "out").unwrap();
        let done_pos = result.lines.iter().position(|l| l == "done").unwrap();
        assert!(out_pos < done_pos);

        let logged = sink.messages_for("echo");
        assert!(logged.contains(&"out".to_string()));
        assert!(logged.contains(&"err".to_string()));
    }

    #[test]
    fn test_non_zero_exit_is_failed() {
        let sink = MemorySink::new();
        let result = SubprocessRunner::local()
            .run_argv("fail", &sh("echo partial; exit 3"), &sink)
            .unwrap();

        assert_eq!(result.status, StageStatus::Failed(3));
        assert_eq!(result.lines, vec!["partial"]);
        assert!(sink.count_at(LogLevel::Error) >= 1);
    }

    #[test]
    fn test_missing_tool_is_launch_error() {
        let sink = MemorySink::new();
        let err = SubprocessRunner::local()
            .run_argv(
                "missing",
                &["definitely-not-a-real-tool-xyz".to_string()],
                &sink,
            )
            .unwrap_err();

        assert!(matches!(err, ReconError::StageExecution { code: None, .. }));
        assert_eq!(sink.count_at(LogLevel::Error), 1);
    }

    #[test]
    fn test_carriage_return_progress_is_split() {
        let sink = MemorySink::new();
        let result = SubprocessRunner::local()
            .run_argv("progress", &sh("printf '10%%\\r50%%\\r100%%\\n'"), &sink)
            .unwrap();
        assert_eq!(result.lines, vec!["10%", "50%", "100%"]);
    }

    /// Yields one chunk, then records what had been forwarded before the
    /// next read.
    struct OneChunk {
        chunk: Option<&'static [u8]>,
        rx: mpsc::Receiver<io::Result<String>>,
        before_next_read: Vec<String>,
    }

    impl Read for OneChunk {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunk.take() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                None => {
                    while let Ok(Ok(line)) = self.rx.try_recv() {
                        self.before_next_read.push(line);
                    }
                    Ok(0)
                }
            }
        }
    }

    #[test]
    fn test_carriage_return_line_sent_before_next_read() {
        let (tx, rx) = mpsc::channel();
        let mut pipe = OneChunk {
            chunk: Some(b"10%\r50%"),
            rx,
            before_next_read: Vec::new(),
        };
        forward_lines(&mut pipe, tx);
        assert_eq!(pipe.before_next_read, vec!["10%"]);
        // The unterminated tail is flushed at end of stream.
        assert_eq!(pipe.rx.try_recv().unwrap().unwrap(), "50%");
    }

    #[test]
    fn test_crlf_and_multibyte_text() {
        let (tx, rx) = mpsc::channel();
        forward_lines(io::Cursor::new("caf\u{e9}\r\nna\u{ef}ve".as_bytes().to_vec()), tx);
        let lines: Vec<String> = rx.into_iter().map(Result::unwrap).collect();
        assert_eq!(lines, vec!["caf\u{e9}", "na\u{ef}ve"]);
    }

    #[test]
    fn test_spec_runs_through_launcher() {
        let sink = MemorySink::new();
        let spec = StageSpec::new("hello", "sh").flag("-c").value("echo hello");
        let result = SubprocessRunner::local()
            .run(&spec, &Bindings::new(), &sink)
            .unwrap();
        assert_eq!(result.name, "hello");
        assert_eq!(result.lines, vec!["hello"]);
        assert!(result.digest.starts_with("blake3:"));
    }
}
