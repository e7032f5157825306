//! Process runner: spawn one request as a child, bound its runtime, reap it.
//!
//! Output goes straight to capture files rather than pipes, so a child that
//! floods its output can never block on a full pipe and a killed child leaves
//! whatever it wrote behind for the reply.

use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::outcome::{
    ExitReport, STATUS_CANNOT_EXECUTE, STATUS_NOT_FOUND, Stream, Termination,
};
use crate::core::tokenize::Request;
use crate::io::capture::Captures;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("empty request")]
    Empty,

    #[error("failed to create capture file in {}", .dir.display())]
    Capture {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to execute '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for '{program}'")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    /// Synthetic status reported to the peer in place of a real exit code.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Empty => STATUS_NOT_FOUND,
            Self::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                STATUS_NOT_FOUND
            }
            _ => STATUS_CANNOT_EXECUTE,
        }
    }

    /// One-line description sent to the peer as the reply body.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Empty => format!("netexec: {self}\n"),
            Self::Capture { source, .. } | Self::Spawn { source, .. } | Self::Wait { source, .. } => {
                format!("netexec: {self}: {source}\n")
            }
        }
    }
}

/// A finished child: how it ended plus both of its capture files.
///
/// Dropping the outcome deletes the capture files.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub report: ExitReport,
    captures: Captures,
}

impl ExecutionOutcome {
    pub fn new(report: ExitReport, captures: Captures) -> Self {
        Self { report, captures }
    }

    pub fn selected_stream(&self) -> Stream {
        self.report.selected_stream()
    }

    /// The capture target that is relayed back to the peer.
    pub fn selected(&self) -> &std::fs::File {
        self.captures.file(self.selected_stream())
    }

    pub fn captures(&self) -> &Captures {
        &self.captures
    }
}

/// Abstraction over request execution so connection handling can be tested
/// without spawning processes.
pub trait ProcessRunner {
    fn run(&self, request: &Request<'_>) -> Result<ExecutionOutcome, RunError>;
}

/// Runs requests as real child processes with a wall-clock deadline.
#[derive(Debug, Clone)]
pub struct ChildRunner {
    pub timeout: Duration,
    pub capture_dir: PathBuf,
}

impl ChildRunner {
    pub fn new(timeout: Duration, capture_dir: PathBuf) -> Self {
        Self {
            timeout,
            capture_dir,
        }
    }

    fn capture_error(&self, source: io::Error) -> RunError {
        RunError::Capture {
            dir: self.capture_dir.clone(),
            source,
        }
    }
}

impl ProcessRunner for ChildRunner {
    #[instrument(skip_all, fields(timeout_ms = self.timeout.as_millis(), argc = request.len()))]
    fn run(&self, request: &Request<'_>) -> Result<ExecutionOutcome, RunError> {
        let program = request.program().ok_or(RunError::Empty)?;
        let program_name = String::from_utf8_lossy(program).into_owned();

        let captures = Captures::create(&self.capture_dir).map_err(|e| self.capture_error(e))?;
        let (stdout, stderr) = captures.stdio().map_err(|e| self.capture_error(e))?;

        // argv is the full token sequence: argv[0] is the program token itself.
        let mut cmd = Command::new(OsStr::from_bytes(program));
        cmd.args(request.args().iter().map(|arg| OsStr::from_bytes(arg)))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);

        debug!(program = %program_name, "spawning child process");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                warn!(program = %program_name, err = %source, "failed to spawn command");
                return Err(RunError::Spawn {
                    program: program_name,
                    source,
                });
            }
        };
        // Release the parent's copies of the child's output handles.
        drop(cmd);

        let (status, timed_out) = match wait_with_deadline(&mut child, self.timeout) {
            Ok(result) => result,
            Err(source) => {
                reap_after_failure(&mut child);
                return Err(RunError::Wait {
                    program: program_name,
                    source,
                });
            }
        };

        let report = ExitReport {
            termination: termination(status),
            timed_out,
        };
        debug!(
            program = %program_name,
            status = report.status_code(),
            timed_out,
            "command finished"
        );
        Ok(ExecutionOutcome::new(report, captures))
    }
}

/// Block until the child exits or `timeout` elapses, then SIGKILL and reap.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout)? {
        return Ok((status, false));
    }
    warn!(
        pid = child.id(),
        timeout_ms = timeout.as_millis(),
        "command timed out, killing"
    );
    child.kill()?;
    let status = child.wait()?;
    Ok((status, true))
}

fn reap_after_failure(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(pid = child.id(), err = %e, "failed to kill child");
    }
    if let Err(e) = child.wait() {
        warn!(pid = child.id(), err = %e, "failed to reap child");
    }
}

fn termination(status: ExitStatus) -> Termination {
    match (status.code(), status.signal()) {
        (Some(code), _) => Termination::Exited(code),
        (None, Some(signal)) => Termination::Signaled(signal),
        (None, None) => Termination::Exited(status.into_raw()),
    }
}
