use std::process::Stdio;

use bytes::Bytes;
use tokio::{io::AsyncRead, process::Command};

use crate::error::{CaptureError, Result};

pub type ProcessPipe = Box<dyn AsyncRead + Send + Unpin>;

/// A spawned capture process as seen by the bus.
pub struct ProcessHandle {
    pub stdout: Option<ProcessPipe>,
    pub stderr: Option<ProcessPipe>,
    pub control: Box<dyn ProcessControl>,
}

/// Termination side of a running process.
pub trait ProcessControl: Send {
    /// Sends the termination signal without waiting for the process to exit.
    fn terminate(&mut self) -> std::io::Result<()>;

    fn id(&self) -> Option<u32> {
        None
    }
}

/// Starts external programs for a capture session.
pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, program: &str, args: &[String]) -> Result<ProcessHandle>;
}

/// Runs programs through `tokio::process`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn spawn(&self, program: &str, args: &[String]) -> Result<ProcessHandle> {
        log::debug!("spawn: {} {}", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Launch {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().map(|p| Box::new(p) as ProcessPipe);
        let stderr = child.stderr.take().map(|p| Box::new(p) as ProcessPipe);
        log::info!("spawned {} (pid {:?})", program, child.id());

        Ok(ProcessHandle {
            stdout,
            stderr,
            control: Box::new(child),
        })
    }
}

impl ProcessControl for tokio::process::Child {
    fn terminate(&mut self) -> std::io::Result<()> {
        self.start_kill()
    }

    fn id(&self) -> Option<u32> {
        tokio::process::Child::id(self)
    }
}

/// Runs `program` to completion and returns everything it wrote to stdout.
pub async fn run_to_completion(program: &str, args: &[String]) -> Result<Bytes> {
    log::debug!("run: {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| CaptureError::Launch {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(CaptureError::ProcessFailed {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    if output.stdout.is_empty() {
        return Err(CaptureError::ExitedBeforeOutput {
            program: program.to_string(),
        });
    }

    Ok(Bytes::from(output.stdout))
}

#[cfg(test)]
#[path = "process_test.rs"]
mod process_test;
