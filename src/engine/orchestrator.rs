// Process Orchestrator - Runs one Engine command as a child process
//
// Spawns the Engine with the merged environment, streams stdout through the
// progress decoder while stderr is collected in parallel, then hands the full
// output to the result extractor. No timeout is applied: a hung Engine holds
// its operation slot until it exits.

use super::command::{EngineCommand, EngineInvocation};
use super::hub::{ProgressChannel, ProgressHub, ProgressNotice};
use crate::error::{FailureKind, OperationFailure, OperationOutcome};
use crate::protocol::{extract_outcome, ProgressDecoder, ProgressEvent};
use crate::settings::EngineSettings;
use serde_json::Value;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Raw result of a finished Engine process.
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
    pub events: usize,
}

#[derive(Debug, Clone)]
pub struct ProcessOrchestrator {
    settings: EngineSettings,
    diagnostics_dir: Option<PathBuf>,
    hub: ProgressHub,
}

impl ProcessOrchestrator {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            diagnostics_dir: None,
            hub: ProgressHub::new(),
        }
    }

    pub fn with_diagnostics_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.diagnostics_dir = dir;
        self
    }

    pub fn with_hub(mut self, hub: ProgressHub) -> Self {
        self.hub = hub;
        self
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run a command, publishing its progress on the hub.
    pub async fn run(&self, command: &EngineCommand) -> OperationOutcome<Value> {
        let invocation = EngineInvocation::build(&self.settings, command);
        let channel = if command.is_destructive() {
            ProgressChannel::Wipe
        } else {
            ProgressChannel::Scan
        };
        let hub = self.hub.clone();
        let source = invocation.label;

        let outcome = self
            .execute(&invocation, |event| {
                hub.publish(ProgressNotice {
                    channel,
                    source,
                    event,
                })
            })
            .await;

        match outcome {
            Ok(run) => {
                if command.keeps_diagnostics() {
                    self.write_diagnostics(invocation.label, &run).await;
                }
                let code = exit_code(&run.status);
                let outcome = match code {
                    Some(code) => extract_outcome(&run.stdout, &run.stderr, code),
                    None => OperationOutcome::Failure(
                        OperationFailure::new(FailureKind::NonZeroExit, terminated_message(&run))
                            .with_raw_output(run.stdout.clone()),
                    ),
                };
                if let Some(failure) = outcome.failure_ref() {
                    warn!(
                        command = invocation.label,
                        kind = %failure.kind,
                        exit_code = ?failure.exit_code,
                        "Engine command failed"
                    );
                }
                outcome
            }
            Err(failure) => {
                warn!(command = invocation.label, kind = %failure.kind, error = %failure.message, "Engine did not start");
                OperationOutcome::Failure(failure)
            }
        }
    }

    /// Spawn the invocation and stream its output.
    ///
    /// Returns `Err` only for failures before the process ran; a process that
    /// ran and failed is still `Ok` with its status and output.
    pub async fn execute<F>(
        &self,
        invocation: &EngineInvocation,
        mut on_progress: F,
    ) -> Result<EngineRun, OperationFailure>
    where
        F: FnMut(ProgressEvent),
    {
        if let Some(script) = &invocation.script {
            if !script.exists() {
                return Err(OperationFailure::new(
                    FailureKind::NotFound,
                    format!("Engine script not found at: {}", script.display()),
                ));
            }
        }
        if let Some(dir) = &invocation.working_dir {
            if !dir.is_dir() {
                return Err(OperationFailure::new(
                    FailureKind::NotFound,
                    format!("Engine working directory not found: {}", dir.display()),
                ));
            }
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(invocation.argv())
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group: terminal SIGINT goes to the host only, and the
        // host refuses to interrupt destructive work
        #[cfg(unix)]
        if invocation.detached {
            cmd.process_group(0);
        }

        debug!(
            command = invocation.label,
            program = %invocation.program,
            args = ?invocation.args,
            "Spawning engine"
        );
        let started = Instant::now();

        let mut child = cmd.spawn().map_err(|e| {
            OperationFailure::new(
                FailureKind::SpawnError,
                format!("Failed to start {}: {}", invocation.program, e),
            )
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                if let Err(e) = stderr.read_to_end(&mut buf).await {
                    debug!(error = %e, "Engine stderr read failed");
                }
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let (stdout_bytes, events) = match stdout {
            Some(stdout) => stream_stdout(stdout, &mut on_progress).await,
            None => (Vec::new(), 0),
        };

        let status = child.wait().await.map_err(|e| {
            OperationFailure::new(FailureKind::SpawnError, format!("Failed to wait for engine: {}", e))
        })?;
        let stderr = match stderr_task.await {
            Ok(text) => text,
            Err(e) => {
                warn!(command = invocation.label, error = %e, "Engine stderr reader did not finish");
                String::new()
            }
        };

        info!(
            command = invocation.label,
            status = %status,
            progress_events = events,
            elapsed = %humantime::format_duration(std::time::Duration::from_millis(
                started.elapsed().as_millis() as u64
            )),
            "Engine finished"
        );

        Ok(EngineRun {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr,
            status,
            events,
        })
    }

    async fn write_diagnostics(&self, label: &str, run: &EngineRun) {
        let Some(dir) = &self.diagnostics_dir else {
            return;
        };
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "Could not create diagnostics directory");
            return;
        }
        let stdout_path = dir.join(format!("{}_stdout.log", label));
        let stderr_path = dir.join(format!("{}_stderr.log", label));
        let stderr_text = format!("code={}\n{}", status_label(&run.status), run.stderr);

        for (path, contents) in [(&stdout_path, run.stdout.as_str()), (&stderr_path, stderr_text.as_str())] {
            if let Err(e) = tokio::fs::write(path, contents).await {
                warn!(path = %path.display(), error = %e, "Could not write engine diagnostics");
            }
        }
    }
}

/// Read stdout to the end, decoding progress markers as chunks arrive.
async fn stream_stdout<R, F>(mut reader: R, on_progress: &mut F) -> (Vec<u8>, usize)
where
    R: AsyncRead + Unpin,
    F: FnMut(ProgressEvent),
{
    let mut decoder = ProgressDecoder::new();
    let mut collected = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut events = 0;

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                collected.extend_from_slice(&chunk[..n]);
                for event in decoder.push(&chunk[..n]) {
                    events += 1;
                    on_progress(event);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "Engine stdout read failed; discarding the rest");
                // Keep the pipe drained so the child never blocks on a full buffer
                if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                    debug!(error = %e, "Engine stdout drain stopped");
                }
                break;
            }
        }
    }

    if let Some(event) = decoder.finish() {
        events += 1;
        on_progress(event);
    }

    (collected, events)
}

fn exit_code(status: &ExitStatus) -> Option<i32> {
    status.code()
}

fn status_label(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

#[cfg(unix)]
fn terminated_message(run: &EngineRun) -> String {
    use std::os::unix::process::ExitStatusExt;
    let base = match run.status.signal() {
        Some(sig) => format!("Engine terminated by signal {}", sig),
        None => "Engine terminated abnormally".to_string(),
    };
    if run.stderr.trim().is_empty() {
        base
    } else {
        format!("{}: {}", base, run.stderr.trim())
    }
}

#[cfg(not(unix))]
fn terminated_message(run: &EngineRun) -> String {
    if run.stderr.trim().is_empty() {
        "Engine terminated abnormally".to_string()
    } else {
        run.stderr.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Fails one read, then serves the remaining output.
    struct FlakyPipe {
        failed: bool,
        rest: &'static [u8],
    }

    impl AsyncRead for FlakyPipe {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if !self.failed {
                self.failed = true;
                return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "pipe hiccup")));
            }
            let n = self.rest.len().min(buf.remaining());
            buf.put_slice(&self.rest[..n]);
            self.rest = &self.rest[n..];
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_stdout_drained_after_read_error() {
        let mut pipe = FlakyPipe {
            failed: false,
            rest: b"::progress::50::half\n{\"success\": true}\n",
        };
        let mut seen = Vec::new();

        let (collected, events) = stream_stdout(&mut pipe, &mut |e| seen.push(e)).await;

        assert!(collected.is_empty());
        assert_eq!(events, 0);
        assert!(seen.is_empty());
        assert!(pipe.rest.is_empty(), "remaining output must still be consumed");
    }
}
